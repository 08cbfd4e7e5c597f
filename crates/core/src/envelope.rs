//! 봉인 봉투(Envelope) 와이어 형식
//!
//! ```json
//! {"client_id":"edge-01","timestamp":1700000000,"version":1,
//!  "algorithm":"xchacha20poly1305","nonce":"<base64>","data":"<base64>","compressed":true}
//! ```
//!
//! `algorithm`은 문자열로 유지합니다. 알 수 없는 알고리즘도 역직렬화는 성공하고,
//! 거부는 봉인 엔진의 `unseal`이 담당합니다.

use serde::{Deserialize, Serialize};

/// 현재 봉투 형식 버전
pub const FORMAT_VERSION: u32 = 1;

/// 봉인된 배치의 Content-Type
pub const CONTENT_TYPE_SEALED: &str = "application/json+encrypted";
/// 디버그용 평문 배치의 Content-Type
pub const CONTENT_TYPE_PLAIN: &str = "application/json";

/// 저장/전송 단위
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// 클라이언트 식별자
    pub client_id: String,
    /// 생성 시각 (unix 초)
    #[serde(rename = "timestamp")]
    pub created_at: i64,
    /// 형식 버전
    #[serde(rename = "version")]
    pub format_version: u32,
    /// 알고리즘 식별자
    pub algorithm: String,
    /// AEAD nonce (서명 전용 알고리즘이면 비어 있음)
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    /// 봉인된 페이로드
    #[serde(rename = "data", with = "b64")]
    pub payload: Vec<u8>,
    /// 봉인 전 압축 여부
    pub compressed: bool,
}

impl Envelope {
    /// JSON 바이트로 직렬화합니다.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// JSON 바이트에서 역직렬화합니다.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// 멱등성 키로 쓰는 결정적 내용 해시 (blake3, hex).
    ///
    /// 모든 필드를 길이 접두어와 함께 고정 순서로 해싱하므로,
    /// 같은 봉투를 재전송하면 항상 같은 해시가 나옵니다.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.client_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(&self.created_at.to_be_bytes());
        hasher.update(&self.format_version.to_be_bytes());
        hasher.update(self.algorithm.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(self.nonce.len() as u64).to_be_bytes());
        hasher.update(&self.nonce);
        hasher.update(&(self.payload.len() as u64).to_be_bytes());
        hasher.update(&self.payload);
        hasher.update(&[u8::from(self.compressed)]);
        hasher.finalize().to_hex().to_string()
    }
}

mod b64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text.is_empty() {
            return Ok(Vec::new());
        }
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            client_id: "edge-01".to_owned(),
            created_at: 1_700_000_000,
            format_version: FORMAT_VERSION,
            algorithm: "xchacha20poly1305".to_owned(),
            nonce: vec![7; 24],
            payload: b"opaque".to_vec(),
            compressed: true,
        }
    }

    #[test]
    fn wire_field_names_match_protocol() {
        let json: serde_json::Value = serde_json::from_slice(&sample().to_json().unwrap()).unwrap();
        assert_eq!(json["timestamp"], 1_700_000_000);
        assert_eq!(json["version"], 1);
        assert_eq!(json["data"], "b3BhcXVl");
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn empty_nonce_serializes_as_empty_string() {
        let mut env = sample();
        env.nonce.clear();
        env.algorithm = "ed25519".to_owned();
        let json: serde_json::Value = serde_json::from_slice(&env.to_json().unwrap()).unwrap();
        assert_eq!(json["nonce"], "");
        let back = Envelope::from_json(&env.to_json().unwrap()).unwrap();
        assert!(back.nonce.is_empty());
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let raw = br#"{"client_id":"a","timestamp":1,"version":1,"algorithm":"x","nonce":"","data":"***","compressed":false}"#;
        assert!(Envelope::from_json(raw).is_err());
    }

    #[test]
    fn content_hash_is_deterministic_and_sensitive() {
        let a = sample();
        assert_eq!(a.content_hash(), sample().content_hash());
        let mut b = sample();
        b.payload[0] ^= 1;
        assert_ne!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }
}
