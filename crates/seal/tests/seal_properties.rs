//! 봉인 엔진 속성 테스트
//!
//! - 두 모드 모두 `unseal(seal(B)) == B`
//! - 페이로드의 임의 1비트 변조는 항상 `VerificationFailed`

use std::collections::BTreeMap;

use proptest::prelude::*;

use logpost_core::event::{LogBatch, LogRecord};
use logpost_seal::{
    AeadKey, Algorithm, ClientKeyMaterial, PublicKeyLookup, SealError, SecretKey,
    VerificationKey, seal, unseal,
};

struct Single(VerificationKey);

impl PublicKeyLookup for Single {
    fn lookup(&self, client_id: &str, algorithm: Algorithm) -> Option<VerificationKey> {
        (client_id == "edge-01" && self.0.algorithm() == algorithm).then(|| self.0.clone())
    }
}

fn keys_for(algorithm: Algorithm, seed: u8) -> ClientKeyMaterial {
    let secret = match algorithm {
        Algorithm::Ed25519 => {
            SecretKey::Signing(ed25519_dalek::SigningKey::from_bytes(&[seed; 32]))
        }
        Algorithm::XChaCha20Poly1305 => SecretKey::Aead(AeadKey::from_bytes([seed; 32])),
    };
    ClientKeyMaterial::new("edge-01", secret)
}

fn record_strategy() -> impl Strategy<Value = LogRecord> {
    (
        0i64..4_102_444_800_000,
        prop::sample::select(vec!["", "debug", "info", "WARN", "error"]),
        ".{0,64}",
        prop::collection::btree_map("[a-z.]{1,12}", ".{0,16}", 0..4),
        prop::option::of("[0-9a-f]{32}"),
    )
        .prop_map(|(timestamp, severity, body, attributes, trace_id)| LogRecord {
            timestamp,
            severity: severity.to_owned(),
            severity_num: logpost_core::event::severity_number(severity),
            body,
            attributes,
            resource: BTreeMap::from([("source.name".to_owned(), "prop".to_owned())]),
            trace_id,
            span_id: None,
        })
}

fn batch_strategy() -> impl Strategy<Value = LogBatch> {
    prop::collection::vec(record_strategy(), 0..16).prop_map(|records| LogBatch { records })
}

fn algorithm_strategy() -> impl Strategy<Value = Algorithm> {
    prop_oneof![
        Just(Algorithm::Ed25519),
        Just(Algorithm::XChaCha20Poly1305)
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn unseal_inverts_seal(
        batch in batch_strategy(),
        algorithm in algorithm_strategy(),
        compress in any::<bool>(),
        seed in any::<u8>(),
    ) {
        let keys = keys_for(algorithm, seed);
        let lookup = Single(keys.verification_key());

        let envelope = seal(&batch, &keys, compress).unwrap();
        prop_assert_eq!(unseal(&envelope, &lookup).unwrap(), batch);
    }

    #[test]
    fn any_payload_bit_flip_fails_verification(
        batch in batch_strategy(),
        algorithm in algorithm_strategy(),
        compress in any::<bool>(),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let keys = keys_for(algorithm, 42);
        let lookup = Single(keys.verification_key());
        let mut envelope = seal(&batch, &keys, compress).unwrap();

        let idx = position.index(envelope.payload.len());
        envelope.payload[idx] ^= 1 << bit;

        prop_assert!(matches!(
            unseal(&envelope, &lookup),
            Err(SealError::VerificationFailed)
        ));
    }

    #[test]
    fn wrong_key_fails_verification(
        batch in batch_strategy(),
        algorithm in algorithm_strategy(),
    ) {
        let envelope = seal(&batch, &keys_for(algorithm, 1), false).unwrap();
        let other = Single(keys_for(algorithm, 2).verification_key());
        prop_assert!(matches!(
            unseal(&envelope, &other),
            Err(SealError::VerificationFailed)
        ));
    }
}

#[test]
fn envelope_survives_json_transport() {
    // Given: 봉인 후 JSON 와이어 형식으로 직렬화
    let keys = keys_for(Algorithm::XChaCha20Poly1305, 9);
    let batch = LogBatch { records: Vec::new() };
    let wire = seal(&batch, &keys, true).unwrap().to_json().unwrap();

    // When: 수신 측에서 역직렬화
    let received = logpost_core::envelope::Envelope::from_json(&wire).unwrap();

    // Then
    let lookup = Single(keys.verification_key());
    assert_eq!(unseal(&received, &lookup).unwrap(), batch);
}
