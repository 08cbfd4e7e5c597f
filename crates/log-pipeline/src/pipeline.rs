//! 수집 파이프라인 오케스트레이션 -- 소스, 프로세서 체인, 봉인, 버퍼 적재
//!
//! [`CollectorPipeline`]은 core의 [`Pipeline`](logpost_core::pipeline::Pipeline) trait을 구현하여
//! `logpost-daemon`에서 다른 컴포넌트와 동일한 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! Sources -> SourceQueue -> mpsc -> ProcessorChain -> Batcher -> seal() -> DurableBuffer
//!                                                                  |
//!                                                        evictor (retention policy)
//! ```
//!
//! # 종료 순서
//! 1. 소스 취소, 각 소스 큐의 남은 이벤트를 체인으로 전달
//! 2. 모든 송신측이 닫히면 체인이 부분 배치를 한 번 플러시하고 봉인
//! 3. 만료 태스크 종료
//!
//! 봉인에 실패한 배치는 기록 후 폐기되며 평문으로 버퍼에 들어가지 않습니다.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use logpost_core::config::{BufferConfig, CollectorConfig, LogpostConfig, SealingConfig};
use logpost_core::error::{LogpostError, PipelineError};
use logpost_core::event::{LogBatch, LogEvent};
use logpost_core::metrics as m;
use logpost_core::pipeline::{HealthStatus, Pipeline};
use logpost_seal::{ClientKeyMaterial, seal};
use logpost_spool::{DurableBuffer, RetentionPolicy};

use crate::collector::{CollectorStatus, SourceHandle};
use crate::error::CollectorError;
use crate::processor::ProcessorChain;

/// 소스 태스크 종료 대기 시간
const SOURCE_STOP_TIMEOUT: Duration = Duration::from_secs(5);
/// 체인 플러시 대기 시간
const CHAIN_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);
/// deadline이 없을 때 select 분기를 잠재우는 시간
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// 파이프라인 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 봉인/적재 누적 카운터
#[derive(Debug, Default)]
struct SealCounters {
    sealed: AtomicU64,
    failed: AtomicU64,
    store_failed: AtomicU64,
}

/// 배치를 봉인하고 버퍼에 적재합니다.
#[derive(Clone)]
struct Sealer {
    keys: Arc<RwLock<ClientKeyMaterial>>,
    buffer: DurableBuffer,
    compress: bool,
    counters: Arc<SealCounters>,
}

impl Sealer {
    async fn seal_and_store(&self, events: Vec<LogEvent>) {
        let count = events.len();
        let batch = LogBatch::from_events(&events);
        drop(events);

        let started = Instant::now();
        let sealed = {
            let keys = self.keys.read().await;
            seal(&batch, &keys, self.compress)
        };
        // 평문 배치는 봉인 직후 폐기
        drop(batch);

        let envelope = match sealed {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(records = count, error = %e, "sealing failed, batch discarded");
                metrics::counter!(m::SEAL_FAILURES_TOTAL).increment(1);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        metrics::histogram!(m::SEAL_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        metrics::counter!(
            m::SEAL_BATCHES_SEALED_TOTAL,
            m::LABEL_ALGORITHM => envelope.algorithm.clone()
        )
        .increment(1);
        self.counters.sealed.fetch_add(1, Ordering::Relaxed);

        match self.buffer.enqueue(&envelope).await {
            Ok(sequence_id) => {
                debug!(sequence_id, records = count, "sealed batch buffered");
            }
            Err(e) => {
                error!(records = count, error = %e, "failed to persist sealed batch");
                self.counters.store_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// 수집 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use logpost_log_pipeline::CollectorPipelineBuilder;
///
/// let buffer = DurableBuffer::open_with_config(config.buffer_path(), &config.buffer).await?;
/// let mut pipeline = CollectorPipelineBuilder::new()
///     .config(&config)
///     .buffer(buffer)
///     .build()?;
///
/// pipeline.start().await?;
/// ```
pub struct CollectorPipeline {
    config: CollectorConfig,
    buffer_config: BufferConfig,
    sealing: SealingConfig,
    data_dir: PathBuf,
    state: PipelineState,
    sealer: Sealer,
    cancel: CancellationToken,
    sources: Vec<SourceHandle>,
    chain_task: Option<JoinHandle<()>>,
    evict_task: Option<JoinHandle<()>>,
}

impl CollectorPipeline {
    /// 현재 상태 이름
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 실행 중인 소스 이름과 상태
    pub fn source_statuses(&self) -> Vec<(String, CollectorStatus)> {
        self.sources
            .iter()
            .map(|s| (s.name().to_owned(), s.status()))
            .collect()
    }

    /// 봉인되어 버퍼에 넘겨진 배치 수
    pub fn sealed_batches(&self) -> u64 {
        self.sealer.counters.sealed.load(Ordering::Relaxed)
    }

    /// 봉인 실패로 폐기된 배치 수
    pub fn seal_failures(&self) -> u64 {
        self.sealer.counters.failed.load(Ordering::Relaxed)
    }

    /// 공유 버퍼 핸들
    pub fn buffer(&self) -> &DurableBuffer {
        &self.sealer.buffer
    }

    /// 키 파일을 다시 읽어 이후 배치부터 새 키로 봉인합니다 (SIGHUP).
    ///
    /// 새 키를 읽지 못하면 기존 키를 유지합니다.
    pub async fn reload_keys(&self) -> Result<(), CollectorError> {
        self.key_reloader().reload().await
    }

    /// 파이프라인을 레지스트리로 넘긴 뒤에도 쓸 수 있는 키 재로드 핸들
    pub fn key_reloader(&self) -> KeyReloader {
        KeyReloader {
            sealing: self.sealing.clone(),
            keys: Arc::clone(&self.sealer.keys),
        }
    }

    async fn shutdown_tasks(&mut self) {
        self.cancel.cancel();

        for source in self.sources.drain(..) {
            source.stop(SOURCE_STOP_TIMEOUT).await;
        }

        if let Some(task) = self.chain_task.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(CHAIN_FLUSH_TIMEOUT, task).await.is_err() {
                warn!("processor chain did not flush in time, aborting");
                abort.abort();
            }
        }

        if let Some(task) = self.evict_task.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(SOURCE_STOP_TIMEOUT, task).await.is_err() {
                abort.abort();
            }
        }
    }
}

/// 봉인 키 재로드 핸들
#[derive(Clone)]
pub struct KeyReloader {
    sealing: SealingConfig,
    keys: Arc<RwLock<ClientKeyMaterial>>,
}

impl KeyReloader {
    /// 설정된 키 파일을 다시 읽어 교체합니다. 실패하면 기존 키를 유지합니다.
    pub async fn reload(&self) -> Result<(), CollectorError> {
        let fresh = ClientKeyMaterial::load(&self.sealing)?;
        let algorithm = fresh.algorithm();
        *self.keys.write().await = fresh;
        info!(algorithm = algorithm.as_str(), "sealing keys reloaded");
        Ok(())
    }
}

impl Pipeline for CollectorPipeline {
    async fn start(&mut self) -> Result<(), LogpostError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }
        info!(sources = self.config.sources.len(), "starting collector pipeline");

        self.cancel = CancellationToken::new();
        let chain = ProcessorChain::from_config(&self.config.processors)?;
        info!(processors = ?chain.stage_names(), "processor chain built");

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let retry = Duration::from_secs(self.config.source_retry_interval_secs.max(1));
        for source in &self.config.sources {
            match SourceHandle::spawn(source, &self.data_dir, retry, tx.clone(), &self.cancel) {
                Ok(handle) => self.sources.push(handle),
                Err(e) => {
                    error!(source = %source.name, error = %e, "failed to create source");
                    self.shutdown_tasks().await;
                    return Err(e.into());
                }
            }
        }
        // 체인은 모든 포워더가 송신측을 닫을 때 종료
        drop(tx);

        self.chain_task = Some(tokio::spawn(run_chain(rx, chain, self.sealer.clone())));
        self.evict_task = Some(tokio::spawn(run_evictor(
            self.sealer.buffer.clone(),
            RetentionPolicy::from_config(&self.buffer_config),
            Duration::from_secs(self.buffer_config.evict_interval_secs.max(1)),
            self.cancel.clone(),
        )));

        self.state = PipelineState::Running;
        info!("collector pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LogpostError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }
        info!("stopping collector pipeline");
        self.shutdown_tasks().await;
        self.state = PipelineState::Stopped;
        info!(
            sealed = self.sealed_batches(),
            seal_failures = self.seal_failures(),
            "collector pipeline stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                let failing: Vec<String> = self
                    .sources
                    .iter()
                    .filter(|s| matches!(s.status(), CollectorStatus::Error(_)))
                    .map(|s| s.name().to_owned())
                    .collect();
                if !failing.is_empty() {
                    HealthStatus::Degraded(format!("sources unavailable: {}", failing.join(", ")))
                } else if self.sealer.counters.store_failed.load(Ordering::Relaxed) > 0 {
                    HealthStatus::Degraded("buffer writes failing".to_owned())
                } else {
                    HealthStatus::Healthy
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 프로세서 체인 소비 루프
async fn run_chain(mut rx: mpsc::Receiver<LogEvent>, mut chain: ProcessorChain, sealer: Sealer) {
    loop {
        let deadline = chain.batcher().deadline();
        let wake_at = deadline.unwrap_or_else(|| Instant::now() + IDLE_WAIT);

        tokio::select! {
            received = rx.recv() => match received {
                Some(event) => {
                    if let Some(batch) = chain.push(event) {
                        sealer.seal_and_store(batch).await;
                    }
                }
                None => break,
            },
            _ = tokio::time::sleep_until(wake_at), if deadline.is_some() => {
                if let Some(batch) = chain.flush() {
                    sealer.seal_and_store(batch).await;
                }
            }
        }
    }

    if let Some(batch) = chain.flush() {
        info!(records = batch.len(), "flushing partial batch on shutdown");
        sealer.seal_and_store(batch).await;
    }
    debug!("processor chain finished");
}

/// 보존 정책 적용 루프
async fn run_evictor(
    buffer: DurableBuffer,
    policy: RetentionPolicy,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match buffer.evict_expired(&policy).await {
                    Ok(0) => {}
                    Ok(evicted) => warn!(evicted, "buffer entries expired by retention policy"),
                    Err(e) => warn!(error = %e, "buffer eviction failed"),
                }
                if let Err(e) = buffer.stats().await {
                    debug!(error = %e, "failed to refresh buffer stats");
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

/// 수집 파이프라인 빌더
pub struct CollectorPipelineBuilder {
    config: CollectorConfig,
    buffer_config: BufferConfig,
    sealing: SealingConfig,
    data_dir: PathBuf,
    buffer: Option<DurableBuffer>,
    keys: Option<ClientKeyMaterial>,
}

impl CollectorPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        let defaults = LogpostConfig::default();
        Self {
            config: defaults.collector,
            buffer_config: defaults.buffer,
            sealing: defaults.sealing,
            data_dir: PathBuf::from(defaults.general.data_dir),
            buffer: None,
            keys: None,
        }
    }

    /// 전체 설정에서 수집기/봉인/버퍼 섹션을 가져옵니다.
    pub fn config(mut self, config: &LogpostConfig) -> Self {
        self.config = config.collector.clone();
        self.buffer_config = config.buffer.clone();
        self.sealing = config.sealing.clone();
        self.data_dir = PathBuf::from(&config.general.data_dir);
        self
    }

    /// 전송 클라이언트와 공유할 버퍼를 지정합니다.
    pub fn buffer(mut self, buffer: DurableBuffer) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// 키 파일 대신 메모리의 키를 사용합니다.
    pub fn keys(mut self, keys: ClientKeyMaterial) -> Self {
        self.keys = Some(keys);
        self
    }

    /// 파이프라인을 빌드합니다. 프로세서 설정과 키는 여기서 검증됩니다.
    pub fn build(self) -> Result<CollectorPipeline, CollectorError> {
        ProcessorChain::from_config(&self.config.processors)?;

        let buffer = self.buffer.ok_or_else(|| CollectorError::Config {
            field: "buffer".to_owned(),
            reason: "durable buffer handle is required".to_owned(),
        })?;
        let keys = match self.keys {
            Some(keys) => keys,
            None => ClientKeyMaterial::load(&self.sealing)?,
        };

        Ok(CollectorPipeline {
            config: self.config,
            buffer_config: self.buffer_config,
            data_dir: self.data_dir,
            state: PipelineState::Initialized,
            sealer: Sealer {
                keys: Arc::new(RwLock::new(keys)),
                buffer,
                compress: self.sealing.compression,
                counters: Arc::new(SealCounters::default()),
            },
            sealing: self.sealing,
            cancel: CancellationToken::new(),
            sources: Vec::new(),
            chain_task: None,
            evict_task: None,
        })
    }
}

impl Default for CollectorPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use logpost_core::config::{BatchConfig, FilterConfig, ProcessorConfig};
    use logpost_seal::{AeadKey, SecretKey};

    use super::*;

    async fn buffer(dir: &tempfile::TempDir) -> DurableBuffer {
        DurableBuffer::open(dir.path().join("buffer.db"), Duration::from_secs(30))
            .await
            .unwrap()
    }

    fn keys() -> ClientKeyMaterial {
        ClientKeyMaterial::new("edge-01", SecretKey::Aead(AeadKey::generate()))
    }

    #[tokio::test]
    async fn builder_requires_buffer() {
        let result = CollectorPipelineBuilder::new().keys(keys()).build();
        assert!(matches!(result, Err(CollectorError::Config { .. })));
    }

    #[tokio::test]
    async fn builder_rejects_misplaced_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LogpostConfig::default();
        config.collector.processors = vec![
            ProcessorConfig::Batch(BatchConfig::default()),
            ProcessorConfig::Filter(FilterConfig::default()),
        ];
        let result = CollectorPipelineBuilder::new()
            .config(&config)
            .buffer(buffer(&dir).await)
            .keys(keys())
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn builder_fails_without_key_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LogpostConfig::default();
        config.sealing.client_id = "edge-01".to_owned();
        config.sealing.encryption_key_path = dir.path().join("missing.aead").display().to_string();
        let result = CollectorPipelineBuilder::new()
            .config(&config)
            .buffer(buffer(&dir).await)
            .build();
        assert!(matches!(result, Err(CollectorError::Seal(_))));
    }

    #[tokio::test]
    async fn lifecycle_without_sources() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = CollectorPipelineBuilder::new()
            .buffer(buffer(&dir).await)
            .keys(keys())
            .build()
            .unwrap();
        assert!(pipeline.health_check().await.is_unhealthy());
        assert!(pipeline.stop().await.is_err());

        // When
        pipeline.start().await.unwrap();

        // Then
        assert_eq!(pipeline.state_name(), "running");
        assert!(pipeline.health_check().await.is_healthy());
        assert!(pipeline.start().await.is_err());

        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.state_name(), "stopped");
        assert_eq!(pipeline.sealed_batches(), 0);
    }

    #[tokio::test]
    async fn sealer_buffers_envelope_and_never_plaintext() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer(&dir).await;
        let sealer = Sealer {
            keys: Arc::new(RwLock::new(keys())),
            buffer: buffer.clone(),
            compress: false,
            counters: Arc::new(SealCounters::default()),
        };

        // When
        sealer
            .seal_and_store(vec![LogEvent::new("app", "secret body")])
            .await;

        // Then
        let ready = buffer.peek_ready(10).await.unwrap();
        assert_eq!(ready.len(), 1);
        let envelope = &ready[0].envelope;
        assert_eq!(envelope.client_id, "edge-01");
        let needle = b"secret body";
        assert!(!envelope.payload.windows(needle.len()).any(|w| w == needle));
        assert_eq!(sealer.counters.sealed.load(Ordering::Relaxed), 1);
    }
}
