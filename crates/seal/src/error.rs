//! 봉인 엔진 에러 타입
//!
//! 검증 실패는 원인(변조, 손상, 알 수 없는 알고리즘)을 구분하지 않는
//! 단일 범주 [`SealError::VerificationFailed`]로만 노출합니다.

use logpost_core::error::LogpostError;

/// 봉인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum SealError {
    /// 봉인 실패 (해당 배치는 폐기)
    #[error("sealing failure: {0}")]
    SealingFailure(String),

    /// 검증 실패
    #[error("verification failed")]
    VerificationFailed,

    /// 키 파일 로드/생성 실패
    #[error("key error: {path}: {reason}")]
    Key {
        /// 키 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 지원하지 않는 알고리즘 (설정 단계)
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

impl SealError {
    pub(crate) fn key(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Self::Key {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }
}

impl From<SealError> for LogpostError {
    fn from(err: SealError) -> Self {
        LogpostError::Seal(err.to_string())
    }
}
