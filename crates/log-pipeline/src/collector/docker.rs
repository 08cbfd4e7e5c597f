//! Docker 컨테이너 로그 수집기
//!
//! Docker Engine API의 `/containers/{id}/logs?follow=1&timestamps=1`을 컨테이너별로 구독하고
//! 모든 스트림을 하나로 합쳐 읽습니다.
//!
//! 컨테이너별 마지막 로그 시각(유닉스 초)을 체크포인트로 저장하고 재시작 시 `since`로
//! 전달합니다. `since`는 초 단위이므로 마지막 1초 구간의 라인은 다시 전달될 수 있습니다.
//!
//! [`ContainerLogApi`] trait으로 Docker API를 추상화하여 테스트에서는 목 구현을 사용합니다.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logpost_core::config::DockerSourceConfig;
use logpost_core::event::LogEvent;

use super::checkpoint::CheckpointStore;
use super::emit;
use crate::buffer::SourceQueue;
use crate::error::CollectorError;

/// 컨테이너 이름 속성 키
pub const ATTR_CONTAINER_NAME: &str = "container.name";
/// 출력 스트림 속성 키 (`stdout` / `stderr`)
pub const ATTR_LOG_STREAM: &str = "log.iostream";

/// 체크포인트 저장 주기
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(1);

/// 컨테이너 로그 한 줄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLogLine {
    /// 출력 스트림 이름
    pub stream: &'static str,
    /// `timestamps=1`이 붙인 RFC 3339 접두사를 포함한 원문
    pub raw: String,
}

/// Docker 로그 API 추상화
pub trait ContainerLogApi: Send + Sync + 'static {
    /// `since`(유닉스 초) 이후의 로그를 따라가는 스트림을 엽니다.
    fn follow(
        &self,
        container: &str,
        since: i64,
    ) -> BoxStream<'static, Result<ContainerLogLine, CollectorError>>;
}

/// `bollard` 기반 프로덕션 구현
pub struct BollardLogApi {
    docker: bollard::Docker,
}

impl BollardLogApi {
    /// 소켓 경로가 없으면 플랫폼 기본값으로 연결합니다.
    pub fn connect(socket: Option<&str>) -> Result<Self, CollectorError> {
        let docker = match socket {
            Some(path) => {
                bollard::Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION)
            }
            None => bollard::Docker::connect_with_local_defaults(),
        }
        .map_err(|e| CollectorError::SourceUnavailable {
            source_name: "docker".to_owned(),
            reason: format!("failed to connect to docker: {e}"),
        })?;
        Ok(Self { docker })
    }
}

impl ContainerLogApi for BollardLogApi {
    fn follow(
        &self,
        container: &str,
        since: i64,
    ) -> BoxStream<'static, Result<ContainerLogLine, CollectorError>> {
        use bollard::container::{LogOutput, LogsOptions};

        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            timestamps: true,
            since,
            ..Default::default()
        };
        let label = container.to_owned();
        self.docker
            .logs(container, Some(options))
            .map(move |item| {
                let output = item.map_err(|e| CollectorError::SourceUnavailable {
                    source_name: label.clone(),
                    reason: format!("docker log stream error: {e}"),
                })?;
                let (stream, message) = match output {
                    LogOutput::StdOut { message } => ("stdout", message),
                    LogOutput::StdErr { message } => ("stderr", message),
                    LogOutput::Console { message } => ("stdout", message),
                    LogOutput::StdIn { message } => ("stdin", message),
                };
                Ok(ContainerLogLine {
                    stream,
                    raw: String::from_utf8_lossy(&message).into_owned(),
                })
            })
            .boxed()
    }
}

/// Docker 컨테이너 로그 수집기
pub struct DockerCollector {
    name: String,
    config: DockerSourceConfig,
    queue: SourceQueue,
    cancel: CancellationToken,
    checkpoints: CheckpointStore,
    api: Option<Arc<dyn ContainerLogApi>>,
}

impl DockerCollector {
    /// 새 Docker 수집기를 생성합니다. 데몬 연결은 `run()`에서 수행합니다.
    pub fn new(
        name: &str,
        config: DockerSourceConfig,
        data_dir: &Path,
        queue: SourceQueue,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: name.to_owned(),
            config,
            queue,
            cancel,
            checkpoints: CheckpointStore::new(data_dir, "docker", name, "json"),
            api: None,
        }
    }

    /// 지정한 API 구현을 사용합니다.
    pub fn with_api(mut self, api: Arc<dyn ContainerLogApi>) -> Self {
        self.api = Some(api);
        self
    }

    fn api(&mut self) -> Result<Arc<dyn ContainerLogApi>, CollectorError> {
        if let Some(api) = &self.api {
            return Ok(Arc::clone(api));
        }
        let api: Arc<dyn ContainerLogApi> = Arc::new(
            BollardLogApi::connect(self.config.socket.as_deref())
                .map_err(|e| CollectorError::unavailable(&self.name, e))?,
        );
        self.api = Some(Arc::clone(&api));
        Ok(api)
    }

    /// 모든 컨테이너 스트림을 읽습니다. 모든 스트림이 끝나면 재시도를 위해 에러를 반환합니다.
    pub async fn run(&mut self) -> Result<(), CollectorError> {
        if self.config.containers.is_empty() {
            return Err(CollectorError::unavailable(&self.name, "no containers configured"));
        }
        let api = self.api()?;
        let mut since: BTreeMap<String, i64> = self.checkpoints.load().await;

        let streams = self.config.containers.iter().map(|container| {
            let start = since.get(container).copied().unwrap_or(0);
            let name = container.clone();
            api.follow(container, start)
                .map(move |item| (name.clone(), item))
                .boxed()
        });
        let mut merged = stream::select_all(streams);
        info!(source = %self.name, containers = ?self.config.containers, "docker collector started");

        let mut dirty = false;
        let mut tick = tokio::time::interval(CHECKPOINT_INTERVAL);
        let outcome = loop {
            tokio::select! {
                next = merged.next() => match next {
                    Some((container, Ok(line))) => {
                        let event = line_event(&self.name, &container, &line);
                        since.insert(container, event.timestamp.timestamp());
                        dirty = true;
                        if !emit(&self.queue, event).await {
                            break Ok(());
                        }
                    }
                    Some((container, Err(e))) => {
                        break Err(CollectorError::unavailable(
                            &self.name,
                            format!("container {container}: {e}"),
                        ));
                    }
                    None => {
                        break Err(CollectorError::unavailable(&self.name, "all container log streams ended"));
                    }
                },
                _ = tick.tick(), if dirty => {
                    dirty = !self.save(&since).await;
                }
                _ = self.cancel.cancelled() => break Ok(()),
            }
        };

        if dirty {
            self.save(&since).await;
        }
        debug!(source = %self.name, "docker collector finished");
        outcome
    }

    async fn save(&self, since: &BTreeMap<String, i64>) -> bool {
        match self.checkpoints.save(since).await {
            Ok(()) => true,
            Err(e) => {
                warn!(source = %self.name, error = %e, "failed to persist docker checkpoint");
                false
            }
        }
    }
}

/// `<RFC3339 timestamp> <message>` 형식 라인을 이벤트로 변환합니다.
fn line_event(source_name: &str, container: &str, line: &ContainerLogLine) -> LogEvent {
    let raw = line.raw.trim_end_matches(['\n', '\r']);
    let (timestamp, body) = match raw.split_once(' ') {
        Some((ts, rest)) => match DateTime::parse_from_rfc3339(ts) {
            Ok(ts) => (Some(ts.with_timezone(&Utc)), rest),
            Err(_) => (None, raw),
        },
        None => (None, raw),
    };
    let mut event = LogEvent::new(source_name, body)
        .with_attribute(ATTR_CONTAINER_NAME, container)
        .with_attribute(ATTR_LOG_STREAM, line.stream);
    if let Some(ts) = timestamp {
        event = event.with_timestamp(ts);
    }
    event
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use logpost_core::config::BackpressureConfig;

    use super::*;

    /// 미리 정한 라인을 돌려주고 요청된 `since`를 기록하는 목
    struct MockLogApi {
        lines: BTreeMap<String, Vec<ContainerLogLine>>,
        requested: Mutex<Vec<(String, i64)>>,
        hold_open: bool,
    }

    impl ContainerLogApi for MockLogApi {
        fn follow(
            &self,
            container: &str,
            since: i64,
        ) -> BoxStream<'static, Result<ContainerLogLine, CollectorError>> {
            self.requested
                .lock()
                .unwrap()
                .push((container.to_owned(), since));
            let lines = self.lines.get(container).cloned().unwrap_or_default();
            let items = stream::iter(lines.into_iter().map(Ok));
            if self.hold_open {
                items.chain(stream::pending()).boxed()
            } else {
                items.boxed()
            }
        }
    }

    fn line(stream: &'static str, raw: &str) -> ContainerLogLine {
        ContainerLogLine {
            stream,
            raw: raw.to_owned(),
        }
    }

    #[test]
    fn timestamp_prefix_is_parsed() {
        let event = line_event(
            "docker",
            "web",
            &line("stderr", "2024-01-15T12:00:00.123456789Z GET /health 500\n"),
        );
        assert_eq!(event.body, "GET /health 500");
        assert_eq!(event.timestamp.timestamp(), 1_705_320_000);
        assert_eq!(event.attributes[ATTR_CONTAINER_NAME], "web");
        assert_eq!(event.attributes[ATTR_LOG_STREAM], "stderr");
    }

    #[test]
    fn line_without_timestamp_keeps_body() {
        let event = line_event("docker", "web", &line("stdout", "plain message"));
        assert_eq!(event.body, "plain message");
    }

    #[tokio::test]
    async fn streams_are_merged_and_since_is_persisted() {
        // Given: 두 컨테이너의 로그
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(MockLogApi {
            lines: BTreeMap::from([
                ("web".to_owned(), vec![line("stdout", "2024-01-15T12:00:00Z hello")]),
                ("db".to_owned(), vec![line("stderr", "2024-01-15T12:00:05Z slow query")]),
            ]),
            requested: Mutex::new(Vec::new()),
            hold_open: true,
        });
        let queue = SourceQueue::new("docker", &BackpressureConfig::default());
        let cancel = CancellationToken::new();
        let config = DockerSourceConfig {
            containers: vec!["web".to_owned(), "db".to_owned()],
            socket: None,
        };
        let mut collector = DockerCollector::new("docker", config.clone(), dir.path(), queue.clone(), cancel.clone())
            .with_api(api.clone());
        let task = tokio::spawn(async move { collector.run().await });

        // When
        let mut bodies = vec![queue.pop().await.unwrap().body, queue.pop().await.unwrap().body];
        bodies.sort();
        cancel.cancel();
        task.await.unwrap().unwrap();

        // Then
        assert_eq!(bodies, vec!["hello", "slow query"]);
        let store = CheckpointStore::new(dir.path(), "docker", "docker", "json");
        let saved: BTreeMap<String, i64> = store.load().await;
        assert_eq!(saved["web"], 1_705_320_000);
        assert_eq!(saved["db"], 1_705_320_005);

        // 재시작하면 저장된 since로 구독
        let restart_api = Arc::new(MockLogApi {
            lines: BTreeMap::new(),
            requested: Mutex::new(Vec::new()),
            hold_open: false,
        });
        let mut restarted = DockerCollector::new("docker", config, dir.path(), queue, CancellationToken::new())
            .with_api(restart_api.clone());
        assert!(restarted.run().await.is_err());
        let requested = restart_api.requested.lock().unwrap().clone();
        assert!(requested.contains(&("web".to_owned(), 1_705_320_000)));
        assert!(requested.contains(&("db".to_owned(), 1_705_320_005)));
    }

    #[tokio::test]
    async fn no_containers_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = DockerCollector::new(
            "docker",
            DockerSourceConfig::default(),
            dir.path(),
            SourceQueue::new("docker", &BackpressureConfig::default()),
            CancellationToken::new(),
        );
        assert!(matches!(
            collector.run().await,
            Err(CollectorError::SourceUnavailable { .. })
        ));
    }
}
