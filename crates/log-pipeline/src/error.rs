//! 수집 파이프라인 에러 타입
//!
//! [`CollectorError`]는 소스, 큐, 프로세서에서 발생하는 에러를 표현합니다.
//! 소스 에러와 이벤트 단위 에러는 파이프라인을 중단시키지 않으므로,
//! `LogpostError`로 올라가는 것은 빌드/시작 단계의 에러뿐입니다.

use logpost_core::error::{LogpostError, PipelineError};

/// 수집 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// 소스가 원천을 열거나 읽지 못함 (고정 간격으로 재시도)
    #[error("source unavailable: {source_name}: {reason}")]
    SourceUnavailable {
        /// 소스 이름
        source_name: String,
        /// 실패 사유
        reason: String,
    },

    /// 단일 이벤트 처리 실패 (해당 이벤트만 드롭)
    #[error("processor error: {processor}: {reason}")]
    Processor {
        /// 프로세서 유형
        processor: &'static str,
        /// 실패 사유
        reason: String,
    },

    /// 원천 레코드 파싱 실패 (소스는 원문 그대로 방출)
    #[error("parse error: {format}: {reason}")]
    Parse {
        /// 형식 (syslog, journal 등)
        format: &'static str,
        /// 실패 사유
        reason: String,
    },

    /// `block` 정책에서 대기 시간 안에 큐 자리가 나지 않음
    #[error("source queue full: {0}")]
    QueueFull(String),

    /// 큐가 닫힘 (종료 중)
    #[error("source queue closed: {0}")]
    QueueClosed(String),

    /// 파이프라인 구성 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 오프셋/커서 저장소 I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// 봉인 키 로드 실패
    #[error("seal error: {0}")]
    Seal(#[from] logpost_seal::SealError),

    /// 내구성 버퍼 에러
    #[error("buffer error: {0}")]
    Buffer(#[from] logpost_spool::SpoolError),
}

impl CollectorError {
    pub(crate) fn unavailable(source_name: &str, reason: impl std::fmt::Display) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.to_owned(),
            reason: reason.to_string(),
        }
    }
}

impl From<CollectorError> for LogpostError {
    fn from(err: CollectorError) -> Self {
        match err {
            CollectorError::Seal(e) => e.into(),
            CollectorError::Buffer(e) => e.into(),
            other => LogpostError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_unavailable_display() {
        let err = CollectorError::unavailable("auth-log", "permission denied");
        let msg = err.to_string();
        assert!(msg.contains("auth-log"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn converts_to_logpost_error() {
        let err = CollectorError::QueueClosed("http".to_owned());
        let converted: LogpostError = err.into();
        assert!(matches!(converted, LogpostError::Pipeline(_)));
    }
}
