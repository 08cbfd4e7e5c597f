#![no_main]

use libfuzzer_sys::fuzz_target;
use logpost_core::envelope::Envelope;
use logpost_seal::{AeadKey, Algorithm, PublicKeyLookup, VerificationKey, unseal};

/// 모든 클라이언트에 같은 고정 AEAD 키를 돌려주는 조회
struct FixedKey(VerificationKey);

impl PublicKeyLookup for FixedKey {
    fn lookup(&self, _client_id: &str, algorithm: Algorithm) -> Option<VerificationKey> {
        (self.0.algorithm() == algorithm).then(|| self.0.clone())
    }
}

fuzz_target!(|data: &[u8]| {
    // 인테이크가 받는 임의 본문: 디코딩 후 검증까지 패닉 없이 거부되어야 한다
    let Ok(envelope) = Envelope::from_json(data) else {
        return;
    };
    let _ = envelope.content_hash();
    let keys = FixedKey(VerificationKey::Aead(AeadKey::from_bytes([0x42; 32])));
    let _ = unseal(&envelope, &keys);
});
