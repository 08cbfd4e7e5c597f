//! 봉인/검증 처리량 벤치마크

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use logpost_core::event::{LogBatch, LogEvent};
use logpost_seal::{
    AeadKey, Algorithm, ClientKeyMaterial, PublicKeyLookup, SecretKey, VerificationKey, seal,
    unseal,
};

struct Single(VerificationKey);

impl PublicKeyLookup for Single {
    fn lookup(&self, _client_id: &str, algorithm: Algorithm) -> Option<VerificationKey> {
        (self.0.algorithm() == algorithm).then(|| self.0.clone())
    }
}

fn make_batch(size: usize) -> LogBatch {
    let events: Vec<LogEvent> = (0..size)
        .map(|i| {
            LogEvent::new("bench", format!("GET /api/v1/items/{i} 200 12ms"))
                .with_level("info")
                .with_attribute("http.method", "GET")
                .with_attribute("request_id", format!("req-{i:08}"))
        })
        .collect();
    LogBatch::from_events(&events)
}

fn keys_for(algorithm: Algorithm) -> ClientKeyMaterial {
    let secret = match algorithm {
        Algorithm::Ed25519 => SecretKey::Signing(ed25519_dalek::SigningKey::from_bytes(&[5; 32])),
        Algorithm::XChaCha20Poly1305 => SecretKey::Aead(AeadKey::from_bytes([5; 32])),
    };
    ClientKeyMaterial::new("bench", secret)
}

fn bench_seal(c: &mut Criterion) {
    let mut group = c.benchmark_group("seal");
    for algorithm in [Algorithm::Ed25519, Algorithm::XChaCha20Poly1305] {
        let keys = keys_for(algorithm);
        for size in [10, 100, 1000] {
            let batch = make_batch(size);
            group.throughput(Throughput::Elements(size as u64));
            group.bench_with_input(
                BenchmarkId::new(algorithm.as_str(), size),
                &batch,
                |b, batch| b.iter(|| seal(black_box(batch), &keys, true)),
            );
        }
    }
    group.finish();
}

fn bench_unseal(c: &mut Criterion) {
    let mut group = c.benchmark_group("unseal");
    for algorithm in [Algorithm::Ed25519, Algorithm::XChaCha20Poly1305] {
        let keys = keys_for(algorithm);
        let lookup = Single(keys.verification_key());
        let envelope = seal(&make_batch(100), &keys, true).expect("seal");
        group.throughput(Throughput::Elements(100));
        group.bench_function(algorithm.as_str(), |b| {
            b.iter(|| unseal(black_box(&envelope), &lookup))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_seal, bench_unseal);
criterion_main!(benches);
