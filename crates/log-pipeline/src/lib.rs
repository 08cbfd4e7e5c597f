//! Logpost 로그 수집 파이프라인
//!
//! 로컬 소스에서 로그를 수집하고, 프로세서 체인으로 변환/필터링한 뒤,
//! 배치 단위로 봉인하여 내구성 버퍼에 적재합니다.
//!
//! # 모듈 구성
//!
//! - [`collector`]: 소스 (파일, syslog UDP/TCP, journald, Docker, HTTP ingest)
//! - [`buffer`]: 소스별 백프레셔 큐 (`drop_oldest` / `block`)
//! - [`parser`]: syslog RFC 3164/5424, journald JSON 파서
//! - [`processor`]: enrich, filter, transform, batch
//! - [`pipeline`]: 전체 오케스트레이션 (Pipeline trait 구현)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! Sources -> SourceQueue -> mpsc -> ProcessorChain -> Batcher -> seal -> DurableBuffer
//!    |            |                      |                         |
//! file/syslog  backpressure     enrich/filter/transform     logpost-seal / logpost-spool
//! ```

pub mod buffer;
pub mod error;
pub mod pipeline;

pub mod collector;
pub mod parser;
pub mod processor;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{CollectorPipeline, CollectorPipelineBuilder, KeyReloader};

// 에러
pub use error::CollectorError;

// 파서
pub use parser::SyslogParser;

// 수집기
pub use collector::{CollectorStatus, SourceHandle};

// 프로세서
pub use processor::{Batcher, Processor, ProcessorChain};

// 버퍼
pub use buffer::SourceQueue;
