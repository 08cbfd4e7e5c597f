//! 에러 타입 -- 도메인별 에러 정의
//!
//! 각 크레이트는 자신의 도메인 에러(`SealError`, `SpoolError`, `CollectorError`,
//! `TransportError`, `IntakeError`)를 정의하고 `From` 구현으로
//! [`LogpostError`]에 합류합니다.

/// Logpost 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LogpostError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 플러그인 생명주기 에러
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// 봉인/검증 에러
    #[error("seal error: {0}")]
    Seal(String),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 전송 에러
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 채널 수신 실패
    #[error("channel receive failed: {0}")]
    ChannelRecv(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline is not running")]
    NotRunning,
}

/// 플러그인 레지스트리 에러
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// 같은 이름의 플러그인이 이미 등록됨
    #[error("plugin already registered: {name}")]
    AlreadyRegistered { name: String },

    /// 플러그인을 찾을 수 없음
    #[error("plugin not found: {name}")]
    NotFound { name: String },

    /// 하나 이상의 플러그인 정지 실패
    #[error("failed to stop plugins: {0}")]
    StopFailed(String),
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 연결(열기) 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display_names_field() {
        let err = ConfigError::InvalidValue {
            field: "transport.endpoint".to_owned(),
            reason: "must not be empty".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("transport.endpoint"));
        assert!(msg.contains("must not be empty"));
    }

    #[test]
    fn domain_errors_convert_into_top_level() {
        let err: LogpostError = PipelineError::AlreadyRunning.into();
        assert!(matches!(err, LogpostError::Pipeline(PipelineError::AlreadyRunning)));

        let err: LogpostError = PluginError::NotFound {
            name: "collector".to_owned(),
        }
        .into();
        assert!(err.to_string().contains("collector"));
    }
}
