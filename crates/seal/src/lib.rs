//! Logpost 봉인 엔진
//!
//! 배치를 인증된 봉투([`Envelope`](logpost_core::envelope::Envelope))로 변환하고,
//! 수신 측에서 검증하여 배치를 복원합니다.
//!
//! - [`seal`]: `LogBatch` + [`ClientKeyMaterial`] → `Envelope`
//! - [`unseal`]: `Envelope` + [`PublicKeyLookup`] → `LogBatch`
//! - [`keys`]: 키 파일 로드/생성
//!
//! 평문 배치는 봉인 직후 메모리에서 지워지며, 봉인 실패 시 평문으로 대체 전송하는
//! 경로는 없습니다.

pub mod engine;
pub mod error;
pub mod keys;

pub use engine::{canonical_bytes, seal, unseal};
pub use error::SealError;
pub use keys::{
    AeadKey, Algorithm, ClientKeyMaterial, PublicKeyLookup, SecretKey, VerificationKey,
};
