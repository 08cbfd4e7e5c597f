//! 로그 수집 모듈 -- 설정된 소스에서 [`LogEvent`]를 수집합니다.
//!
//! # 수집 소스
//! - [`FileCollector`]: 파일 tail (로테이션 감지, 오프셋 저장)
//! - [`SyslogUdpCollector`]: UDP syslog 수신
//! - [`SyslogTcpCollector`]: TCP syslog 수신 (newline framing)
//! - [`JournaldCollector`]: `journalctl --follow` (커서 저장)
//! - [`DockerCollector`]: Docker Engine API 로그 스트림 (`since` 저장)
//! - [`HttpCollector`]: `POST /ingest` 엔드포인트
//!
//! # 아키텍처
//! 각 소스는 자체 tokio 태스크에서 실행되며 이벤트를 소스별 [`SourceQueue`]에 넣습니다.
//! 포워더 태스크가 큐에서 꺼내 프로세서 체인의 공유 `mpsc` 채널로 전달합니다.
//!
//! ```text
//! Source task -> SourceQueue (drop_oldest | block) -> forwarder -> mpsc -> ProcessorChain
//! ```
//!
//! 원천을 열지 못한 소스는 `SourceUnavailable`을 기록하고 고정 간격으로 재시도합니다.
//! 한 소스의 실패가 수집기 전체를 멈추지 않습니다.

pub mod checkpoint;
pub mod docker;
pub mod file;
pub mod http;
pub mod journald;
pub mod syslog_tcp;
pub mod syslog_udp;

pub use docker::DockerCollector;
pub use file::FileCollector;
pub use http::HttpCollector;
pub use journald::JournaldCollector;
pub use syslog_tcp::SyslogTcpCollector;
pub use syslog_udp::SyslogUdpCollector;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logpost_core::config::{SourceConfig, SourceKind};
use logpost_core::event::LogEvent;
use logpost_core::metrics as m;

use crate::buffer::SourceQueue;
use crate::error::CollectorError;

/// 수집기 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorStatus {
    /// 실행 대기 중
    Idle,
    /// 실행 중
    Running,
    /// 원천을 열지 못해 재시도 대기 중
    Error(String),
    /// 정상 종료됨
    Stopped,
}

/// 이벤트를 큐에 넣습니다. 큐가 닫혔으면 `false`를 반환합니다.
///
/// 백프레셔로 드롭된 이벤트는 큐가 이미 집계했으므로 여기서는 무시합니다.
pub(crate) async fn emit(queue: &SourceQueue, event: LogEvent) -> bool {
    match queue.push(event).await {
        Ok(()) | Err(CollectorError::QueueFull(_)) => true,
        Err(_) => false,
    }
}

/// 설정된 소스 유형별 수집기 (닫힌 집합)
enum Collector {
    File(FileCollector),
    SyslogUdp(SyslogUdpCollector),
    SyslogTcp(SyslogTcpCollector),
    Journald(JournaldCollector),
    Docker(DockerCollector),
    Http(HttpCollector),
}

impl Collector {
    fn from_config(
        config: &SourceConfig,
        data_dir: &Path,
        queue: SourceQueue,
        cancel: CancellationToken,
    ) -> Result<Self, CollectorError> {
        let name = config.name.as_str();
        Ok(match &config.kind {
            SourceKind::File(c) => {
                Self::File(FileCollector::new(name, c.clone(), data_dir, queue, cancel)?)
            }
            SourceKind::SyslogUdp(c) => {
                Self::SyslogUdp(SyslogUdpCollector::new(name, c.clone(), queue, cancel))
            }
            SourceKind::SyslogTcp(c) => {
                Self::SyslogTcp(SyslogTcpCollector::new(name, c.clone(), queue, cancel))
            }
            SourceKind::Journald(c) => {
                Self::Journald(JournaldCollector::new(name, c.clone(), data_dir, queue, cancel))
            }
            SourceKind::Docker(c) => {
                Self::Docker(DockerCollector::new(name, c.clone(), data_dir, queue, cancel))
            }
            SourceKind::Http(c) => Self::Http(HttpCollector::new(name, c.clone(), queue, cancel)),
        })
    }

    async fn run(&mut self) -> Result<(), CollectorError> {
        match self {
            Self::File(c) => c.run().await,
            Self::SyslogUdp(c) => c.run().await,
            Self::SyslogTcp(c) => c.run().await,
            Self::Journald(c) => c.run().await,
            Self::Docker(c) => c.run().await,
            Self::Http(c) => c.run().await,
        }
    }
}

/// 실행 중인 소스의 핸들 (태스크와 취소 토큰을 소유)
pub struct SourceHandle {
    name: String,
    type_name: &'static str,
    cancel: CancellationToken,
    queue: SourceQueue,
    status: Arc<Mutex<CollectorStatus>>,
    source_task: JoinHandle<()>,
    forward_task: JoinHandle<()>,
}

impl SourceHandle {
    /// 소스를 시작합니다.
    ///
    /// - 소스 태스크: 원천을 읽어 큐에 적재, 실패 시 `retry_interval`마다 재시도
    /// - 포워더 태스크: 큐의 이벤트를 순서대로 `tx`로 전달
    pub fn spawn(
        config: &SourceConfig,
        data_dir: &Path,
        retry_interval: Duration,
        tx: mpsc::Sender<LogEvent>,
        parent: &CancellationToken,
    ) -> Result<Self, CollectorError> {
        let name = config.name.clone();
        let type_name = config.kind.type_name();
        let queue = SourceQueue::new(&name, &config.backpressure);
        let cancel = parent.child_token();
        let status = Arc::new(Mutex::new(CollectorStatus::Idle));

        let mut collector = Collector::from_config(config, data_dir, queue.clone(), cancel.clone())?;

        let source_task = {
            let name = name.clone();
            let queue = queue.clone();
            let cancel = cancel.clone();
            let status = Arc::clone(&status);
            tokio::spawn(async move {
                loop {
                    set_status(&status, CollectorStatus::Running);
                    match collector.run().await {
                        Ok(()) => break,
                        Err(e) => {
                            warn!(
                                source = %name,
                                source_type = type_name,
                                error = %e,
                                retry_secs = retry_interval.as_secs_f64(),
                                "source unavailable, retrying"
                            );
                            metrics::counter!(
                                m::COLLECTOR_SOURCE_ERRORS_TOTAL,
                                m::LABEL_SOURCE => name.clone()
                            )
                            .increment(1);
                            set_status(&status, CollectorStatus::Error(e.to_string()));
                        }
                    }

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(retry_interval) => {}
                    }
                }
                queue.close();
                set_status(&status, CollectorStatus::Stopped);
                debug!(source = %name, "source task finished");
            })
        };

        let forward_task = {
            let name = name.clone();
            let queue = queue.clone();
            tokio::spawn(async move {
                while let Some(event) = queue.pop().await {
                    metrics::counter!(
                        m::COLLECTOR_EVENTS_COLLECTED_TOTAL,
                        m::LABEL_SOURCE => name.clone()
                    )
                    .increment(1);
                    if tx.send(event).await.is_err() {
                        debug!(source = %name, "processor chain closed, forwarder exiting");
                        break;
                    }
                }
            })
        };

        info!(source = %name, source_type = type_name, "source started");
        Ok(Self {
            name,
            type_name,
            cancel,
            queue,
            status,
            source_task,
            forward_task,
        })
    }

    /// 소스 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 소스 유형 이름
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 현재 상태
    pub fn status(&self) -> CollectorStatus {
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|p| p.into_inner().clone())
    }

    /// 백프레셔로 드롭된 이벤트 수
    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped_count()
    }

    /// 소스를 멈추고 큐에 남은 이벤트를 체인으로 넘깁니다.
    ///
    /// 각 단계는 `timeout` 안에 끝나지 않으면 태스크를 중단합니다.
    pub async fn stop(self, timeout: Duration) {
        self.cancel.cancel();

        let source_abort = self.source_task.abort_handle();
        if tokio::time::timeout(timeout, self.source_task).await.is_err() {
            warn!(source = %self.name, "source task did not stop in time, aborting");
            source_abort.abort();
        }
        self.queue.close();

        let forward_abort = self.forward_task.abort_handle();
        if tokio::time::timeout(timeout, self.forward_task).await.is_err() {
            warn!(
                source = %self.name,
                remaining = self.queue.len(),
                "forwarder did not drain in time, aborting"
            );
            forward_abort.abort();
        }
        info!(source = %self.name, "source stopped");
    }
}

fn set_status(status: &Mutex<CollectorStatus>, value: CollectorStatus) {
    match status.lock() {
        Ok(mut guard) => *guard = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}
