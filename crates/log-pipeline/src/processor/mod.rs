//! 프로세서 체인 -- 이벤트 단위 변환과 배치 누적
//!
//! 설정 순서대로 [`Processor`]를 적용하고 마지막에 [`Batcher`]가 이벤트를 배치로 모읍니다.
//!
//! ```text
//! LogEvent -> enrich -> filter -> transform -> ... -> Batcher -> Vec<LogEvent>
//! ```
//!
//! - 각 단계는 이벤트를 드롭할 수 있지만 순서를 바꾸지 않습니다.
//! - 한 이벤트에서 실패한 프로세서는 그 이벤트만 드롭하고 스트림은 계속됩니다.
//! - `batch` 프로세서가 설정되지 않으면 기본 배치 설정이 적용됩니다.

pub mod batch;
pub mod enrich;
pub mod filter;
pub mod transform;

pub use batch::Batcher;
pub use enrich::EnrichProcessor;
pub use filter::FilterProcessor;
pub use transform::TransformProcessor;

use tracing::warn;

use logpost_core::config::{BatchConfig, ProcessorConfig};
use logpost_core::event::LogEvent;
use logpost_core::metrics as m;

use crate::error::CollectorError;

/// 이벤트 단위 프로세서
pub trait Processor: Send + Sync {
    /// 프로세서 유형 이름
    fn name(&self) -> &'static str;

    /// 이벤트를 변환합니다. `Ok(None)`은 의도된 드롭입니다.
    fn apply(&self, event: LogEvent) -> Result<Option<LogEvent>, CollectorError>;
}

/// 설정된 프로세서 목록과 배치 누적기
pub struct ProcessorChain {
    stages: Vec<Box<dyn Processor>>,
    batcher: Batcher,
}

impl ProcessorChain {
    /// 설정에서 체인을 생성합니다. 정규식은 여기서 한 번만 컴파일합니다.
    pub fn from_config(configs: &[ProcessorConfig]) -> Result<Self, CollectorError> {
        let mut stages: Vec<Box<dyn Processor>> = Vec::with_capacity(configs.len());
        let mut batch = None;

        for (idx, config) in configs.iter().enumerate() {
            match config {
                ProcessorConfig::Enrich(c) => stages.push(Box::new(EnrichProcessor::new(c))),
                ProcessorConfig::Filter(c) => stages.push(Box::new(FilterProcessor::new(c)?)),
                ProcessorConfig::Transform(c) => {
                    stages.push(Box::new(TransformProcessor::new(c)?))
                }
                ProcessorConfig::Batch(c) => {
                    if idx + 1 != configs.len() {
                        return Err(CollectorError::Config {
                            field: format!("collector.processors[{idx}]"),
                            reason: "batch must be the last processor".to_owned(),
                        });
                    }
                    batch = Some(c.clone());
                }
            }
        }

        Ok(Self {
            stages,
            batcher: Batcher::new(&batch.unwrap_or_default()),
        })
    }

    /// 이벤트 프로세서 없이 배치만 수행하는 체인
    pub fn batch_only(config: &BatchConfig) -> Self {
        Self {
            stages: Vec::new(),
            batcher: Batcher::new(config),
        }
    }

    /// 이벤트 프로세서 이름 목록 (설정 순서)
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// 모든 이벤트 프로세서를 순서대로 적용합니다.
    ///
    /// 드롭되거나 처리에 실패한 이벤트는 `None`이 됩니다.
    pub fn apply(&self, mut event: LogEvent) -> Option<LogEvent> {
        for stage in &self.stages {
            event = match stage.apply(event) {
                Ok(Some(next)) => next,
                Ok(None) => return None,
                Err(e) => {
                    warn!(processor = stage.name(), error = %e, "processor failed, event dropped");
                    metrics::counter!(
                        m::COLLECTOR_EVENTS_DROPPED_TOTAL,
                        m::LABEL_REASON => "processor"
                    )
                    .increment(1);
                    return None;
                }
            };
        }
        Some(event)
    }

    /// 처리 후 배치에 넣습니다. 크기 조건을 채우면 완성된 배치를 반환합니다.
    pub fn push(&mut self, event: LogEvent) -> Option<Vec<LogEvent>> {
        let event = self.apply(event)?;
        metrics::counter!(
            m::COLLECTOR_EVENTS_PROCESSED_TOTAL,
            m::LABEL_SOURCE => event.source_name.clone()
        )
        .increment(1);
        self.batcher.push(event)
    }

    /// 배치 누적기
    pub fn batcher(&self) -> &Batcher {
        &self.batcher
    }

    /// 시간 조건 도달 또는 종료 시 부분 배치를 꺼냅니다.
    pub fn flush(&mut self) -> Option<Vec<LogEvent>> {
        self.batcher.flush()
    }
}
