//! Logpost 공통 크레이트
//!
//! 모든 Logpost 크레이트가 공유하는 타입과 trait을 정의합니다.
//!
//! - [`event`]: 로그 이벤트, 레코드, 배치 스키마
//! - [`envelope`]: 봉인 봉투 와이어 형식
//! - [`config`]: TOML 설정과 환경변수 오버라이드
//! - [`error`]: 도메인 에러 계층
//! - [`pipeline`] / [`plugin`]: 컴포넌트 생명주기와 레지스트리
//! - [`metrics`]: Prometheus 메트릭 이름 상수

pub mod config;
pub mod envelope;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod plugin;

// 에러
pub use error::{ConfigError, LogpostError, PipelineError, PluginError, StorageError};

// 설정
pub use config::LogpostConfig;

// 이벤트
pub use envelope::Envelope;
pub use event::{LogBatch, LogEvent, LogRecord};

// 생명주기
pub use pipeline::{BoxFuture, HealthStatus, Pipeline};
pub use plugin::{DynPlugin, Plugin, PluginInfo, PluginRegistry, PluginState, PluginType};
