//! 전송 클라이언트 에러 타입
//!
//! 전송 실패는 재시도 가능 여부로 나뉩니다.
//! - [`TransportError::Transient`]: 네트워크 에러, 타임아웃, 5xx, 429 (백오프 후 재시도)
//! - [`TransportError::Permanent`]: 그 밖의 4xx (즉시 만료)

use std::time::Duration;

use logpost_core::error::LogpostError;

/// 전송 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// 재시도로 해결될 수 있는 실패
    #[error("transient delivery failure: {reason}")]
    Transient {
        /// 실패 사유 (메트릭 레이블로도 사용)
        reason: String,
        /// 서버가 `Retry-After`로 요청한 최소 대기 시간
        retry_after: Option<Duration>,
    },

    /// 재시도해도 소용없는 실패
    #[error("permanent delivery failure: {reason}")]
    Permanent {
        /// 실패 사유
        reason: String,
    },

    /// 클라이언트 구성 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 내구성 버퍼 에러
    #[error("buffer error: {0}")]
    Buffer(#[from] logpost_spool::SpoolError),
}

impl TransportError {
    /// 백오프 후 재시도 대상인지 여부
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<TransportError> for LogpostError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Buffer(e) => e.into(),
            other => LogpostError::Transport(other.to_string()),
        }
    }
}
