//! 전송 클라이언트 -- 내구성 버퍼 drain 루프
//!
//! [`TransportClient`]는 core의 [`Pipeline`] trait을 구현하여 데몬에서
//! 수집 파이프라인과 같은 생명주기로 관리됩니다.
//!
//! # drain 사이클
//! 1. 브레이커가 열려 있으면 냉각 시간이 끝날 때까지 대기
//! 2. `peek_ready(drain_batch_size)`로 항목을 임대
//! 3. 항목마다 최대 `retry_max_count + 1`회 시도, 시도 전마다 남은 임대를 갱신
//!    - 성공: `mark_delivered`
//!    - 영구 실패: `mark_expired` (즉시)
//!    - 일시 실패: 백오프 후 재시도, 한도 소진 시 `mark_failed`로 되돌림
//! 4. 미뤄진 항목과 같은 `client_id`의 뒤 항목은 이번 사이클에서 반납하고,
//!    다른 클라이언트의 항목은 계속 전송 (클라이언트별 FIFO 유지)
//! 5. 브레이커가 열리면 남은 임대를 반납하고 사이클 종료
//!
//! 보존 정책 등으로 이미 버퍼에서 사라진 항목의 상태 갱신은 처리 완료로 간주합니다.
//!
//! # 종료
//! 취소 후 `shutdown_grace_secs` 동안 항목당 한 번씩만 시도하는 최종 drain을 수행합니다.
//! 유예 시간 안에 끝나지 않은 임대는 다음 시작 시 Pending으로 복구됩니다.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use logpost_core::config::{LogpostConfig, TransportConfig};
use logpost_core::error::{LogpostError, PipelineError};
use logpost_core::metrics as m;
use logpost_core::pipeline::{HealthStatus, Pipeline};
use logpost_spool::{BufferedEnvelope, DurableBuffer, SpoolError};

use crate::backoff::Backoff;
use crate::breaker::{BreakerState, CircuitBreaker};
use crate::error::TransportError;
use crate::sender::HttpSender;

/// 유예 시간 외에 drain 태스크 종료를 기다리는 여유
const STOP_MARGIN: Duration = Duration::from_secs(2);

/// 클라이언트 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    Initialized,
    Running,
    Stopped,
}

/// 전송 결과 누적 카운터
#[derive(Debug, Default)]
pub struct DeliveryCounters {
    delivered: AtomicU64,
    expired: AtomicU64,
    deferred: AtomicU64,
    buffer_error: AtomicBool,
}

impl DeliveryCounters {
    /// 전달 완료 수
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// 영구 실패로 만료된 수
    pub fn expired(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    /// 재시도 한도를 소진해 다음 사이클로 미룬 수
    pub fn deferred(&self) -> u64 {
        self.deferred.load(Ordering::Relaxed)
    }

    fn settled(&self) -> u64 {
        self.delivered() + self.expired()
    }
}

/// 항목 하나의 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Delivered,
    Expired,
    Deferred,
    /// 임대 중 버퍼에서 사라짐 (보존 정책 만료)
    Vanished,
    /// 브레이커 개방 또는 취소로 사이클 중단
    Halted,
}

/// drain 루프 태스크 상태
struct Drainer {
    buffer: DurableBuffer,
    sender: HttpSender,
    breaker: Arc<CircuitBreaker>,
    backoff: Backoff,
    counters: Arc<DeliveryCounters>,
    batch_size: usize,
    max_attempts: u32,
    poll_interval: Duration,
    grace: Duration,
}

impl Drainer {
    async fn run(self, cancel: CancellationToken) {
        info!(
            endpoint = %self.sender.endpoint(),
            batch_size = self.batch_size,
            "transport drain loop started"
        );

        while !cancel.is_cancelled() {
            let idle = match self.drain_once(&cancel, self.max_attempts).await {
                Ok(0) => true,
                Ok(_) => false,
                Err(e) => {
                    error!(error = %e, "drain cycle failed");
                    self.counters.buffer_error.store(true, Ordering::Relaxed);
                    true
                }
            };
            if idle {
                let wait = self
                    .breaker
                    .remaining_cooldown()
                    .filter(|d| !d.is_zero())
                    .unwrap_or(self.poll_interval);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }

        self.final_drain().await;
        info!(
            delivered = self.counters.delivered(),
            expired = self.counters.expired(),
            "transport drain loop stopped"
        );
    }

    /// 유예 시간 안에서 항목당 한 번씩 전송을 시도합니다.
    async fn final_drain(&self) {
        if self.breaker.state() == BreakerState::Open {
            info!("circuit breaker open, leaving buffered entries for next start");
            return;
        }
        let never = CancellationToken::new();
        let pass = async {
            loop {
                let settled = self.counters.settled();
                match self.drain_once(&never, 1).await {
                    Ok(0) => break,
                    Ok(_) if self.breaker.state() == BreakerState::Open => break,
                    // 진척이 없으면 같은 항목을 반복하지 않음
                    Ok(_) if self.counters.settled() == settled => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "final drain failed");
                        break;
                    }
                }
            }
        };
        if tokio::time::timeout(self.grace, pass).await.is_err() {
            warn!(
                grace_secs = self.grace.as_secs(),
                "shutdown grace period elapsed, remaining entries stay buffered"
            );
        }
    }

    /// 한 사이클을 수행하고 임대한 항목 수를 반환합니다.
    async fn drain_once(
        &self,
        cancel: &CancellationToken,
        max_attempts: u32,
    ) -> Result<usize, TransportError> {
        if self.breaker.state() == BreakerState::Open {
            return Ok(0);
        }
        let entries = self.buffer.peek_ready(self.batch_size).await?;
        let leased = entries.len();
        if leased > 0 {
            debug!(leased, "drain cycle started");
        }
        let ids: Vec<i64> = entries.iter().map(|e| e.sequence_id).collect();

        let mut halted = false;
        let mut held_back: HashSet<&str> = HashSet::new();
        for (idx, entry) in entries.iter().enumerate() {
            let client_id = entry.envelope.client_id.as_str();
            if halted || held_back.contains(client_id) {
                debug!(
                    sequence_id = entry.sequence_id,
                    client_id, "lease returned without attempt"
                );
                settle(entry.sequence_id, self.buffer.release(entry.sequence_id).await)?;
                continue;
            }
            match self.deliver(entry, &ids[idx..], cancel, max_attempts).await? {
                Outcome::Deferred => {
                    held_back.insert(client_id);
                }
                Outcome::Halted => halted = true,
                Outcome::Delivered | Outcome::Expired | Outcome::Vanished => {}
            }
        }
        self.counters.buffer_error.store(false, Ordering::Relaxed);
        Ok(leased)
    }

    /// 항목 하나를 전송합니다. `remaining`은 이 항목부터 사이클 끝까지의 임대 목록입니다.
    async fn deliver(
        &self,
        entry: &BufferedEnvelope,
        remaining: &[i64],
        cancel: &CancellationToken,
        max_attempts: u32,
    ) -> Result<Outcome, TransportError> {
        let sequence_id = entry.sequence_id;
        let mut attempt = 0u32;

        loop {
            let held = self.buffer.renew_leases(remaining).await?;
            if !held.contains(&sequence_id) {
                warn!(sequence_id, "buffered envelope removed while leased, skipping");
                return Ok(Outcome::Vanished);
            }
            if !self.breaker.try_acquire() {
                settle(sequence_id, self.buffer.release(sequence_id).await)?;
                return Ok(Outcome::Halted);
            }

            match self.sender.send(&entry.envelope).await {
                Ok(()) => {
                    self.breaker.record_success();
                    settle(sequence_id, self.buffer.mark_delivered(sequence_id).await)?;
                    metrics::counter!(m::TRANSPORT_ATTEMPTS_TOTAL, m::LABEL_RESULT => "delivered")
                        .increment(1);
                    metrics::counter!(m::TRANSPORT_DELIVERED_TOTAL).increment(1);
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    debug!(sequence_id, attempts = attempt + 1, "envelope delivered");
                    return Ok(Outcome::Delivered);
                }
                Err(TransportError::Permanent { reason }) => {
                    // 서버는 응답했으므로 브레이커 관점에서는 성공
                    self.breaker.record_success();
                    metrics::counter!(m::TRANSPORT_ATTEMPTS_TOTAL, m::LABEL_RESULT => "permanent")
                        .increment(1);
                    metrics::counter!(m::TRANSPORT_EXPIRED_TOTAL, m::LABEL_REASON => "permanent")
                        .increment(1);
                    settle(sequence_id, self.buffer.mark_expired(sequence_id, &reason).await)?;
                    self.counters.expired.fetch_add(1, Ordering::Relaxed);
                    return Ok(Outcome::Expired);
                }
                Err(TransportError::Transient {
                    reason,
                    retry_after,
                }) => {
                    metrics::counter!(m::TRANSPORT_ATTEMPTS_TOTAL, m::LABEL_RESULT => "transient")
                        .increment(1);
                    let opened = self.breaker.record_failure();
                    attempt += 1;

                    if opened || attempt >= max_attempts {
                        settle(sequence_id, self.buffer.mark_failed(sequence_id).await)?;
                        self.counters.deferred.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            sequence_id,
                            attempts = attempt,
                            reason = %reason,
                            "delivery deferred to next drain cycle"
                        );
                        return Ok(if opened {
                            Outcome::Halted
                        } else {
                            Outcome::Deferred
                        });
                    }

                    let delay = retry_delay(&self.backoff, attempt, retry_after);
                    debug!(
                        sequence_id,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        reason = %reason,
                        "transient delivery failure, backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            settle(sequence_id, self.buffer.mark_failed(sequence_id).await)?;
                            return Ok(Outcome::Halted);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(other) => {
                    settle(sequence_id, self.buffer.release(sequence_id).await)?;
                    return Err(other);
                }
            }
        }
    }
}

/// `attempt`번째 실패 후 대기 시간. `Retry-After`는 백오프 상한까지 존중합니다.
fn retry_delay(backoff: &Backoff, attempt: u32, retry_after: Option<Duration>) -> Duration {
    let delay = backoff.delay(attempt.saturating_sub(1));
    match retry_after {
        Some(hint) => delay.max(hint.min(backoff.max())),
        None => delay,
    }
}

/// 이미 버퍼에서 사라진 항목(보존 정책 만료 등)에 대한 상태 갱신은 처리 완료로 봅니다.
fn settle(sequence_id: i64, result: Result<(), SpoolError>) -> Result<(), TransportError> {
    match result {
        Err(SpoolError::UnknownSequence(_)) => {
            warn!(sequence_id, "buffered envelope already removed, nothing to update");
            Ok(())
        }
        other => other.map_err(TransportError::from),
    }
}

/// 내구성 버퍼를 원격 인테이크로 비우는 전송 클라이언트
///
/// # 사용 예시
/// ```ignore
/// let mut client = TransportClientBuilder::new()
///     .config(&config)
///     .buffer(buffer.clone())
///     .build()?;
/// client.start().await?;
/// ```
pub struct TransportClient {
    config: TransportConfig,
    buffer: DurableBuffer,
    sender: HttpSender,
    breaker: Arc<CircuitBreaker>,
    counters: Arc<DeliveryCounters>,
    state: ClientState,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TransportClient {
    /// 현재 상태 이름
    pub fn state_name(&self) -> &str {
        match self.state {
            ClientState::Initialized => "initialized",
            ClientState::Running => "running",
            ClientState::Stopped => "stopped",
        }
    }

    /// 서킷 브레이커 상태
    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// 전송 결과 카운터
    pub fn counters(&self) -> &DeliveryCounters {
        &self.counters
    }

    /// drain 대상 버퍼
    pub fn buffer(&self) -> &DurableBuffer {
        &self.buffer
    }

    fn drainer(&self) -> Drainer {
        Drainer {
            buffer: self.buffer.clone(),
            sender: self.sender.clone(),
            breaker: Arc::clone(&self.breaker),
            backoff: Backoff::from_config(&self.config),
            counters: Arc::clone(&self.counters),
            batch_size: self.config.drain_batch_size.max(1),
            max_attempts: self.config.retry_max_count.saturating_add(1),
            poll_interval: Duration::from_millis(self.config.poll_interval_ms.max(1)),
            grace: Duration::from_secs(self.config.shutdown_grace_secs),
        }
    }
}

impl Pipeline for TransportClient {
    async fn start(&mut self) -> Result<(), LogpostError> {
        if self.state == ClientState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        self.cancel = CancellationToken::new();
        let drainer = self.drainer();
        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(drainer.run(cancel)));
        self.state = ClientState::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LogpostError> {
        if self.state != ClientState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        self.cancel.cancel();
        if let Some(mut task) = self.task.take() {
            let limit = Duration::from_secs(self.config.shutdown_grace_secs) + STOP_MARGIN;
            if tokio::time::timeout(limit, &mut task).await.is_err() {
                warn!("transport drain loop did not stop in time, aborting");
                task.abort();
            }
        }
        self.state = ClientState::Stopped;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ClientState::Running => {
                if self.breaker.state() == BreakerState::Open {
                    HealthStatus::Degraded("circuit breaker open".to_owned())
                } else if self.counters.buffer_error.load(Ordering::Relaxed) {
                    HealthStatus::Degraded("durable buffer errors".to_owned())
                } else {
                    HealthStatus::Healthy
                }
            }
            ClientState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ClientState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// [`TransportClient`] 빌더
pub struct TransportClientBuilder {
    config: TransportConfig,
    buffer: Option<DurableBuffer>,
}

impl TransportClientBuilder {
    /// 기본 설정으로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: TransportConfig::default(),
            buffer: None,
        }
    }

    /// 전체 설정에서 전송 설정을 가져옵니다.
    pub fn config(mut self, config: &LogpostConfig) -> Self {
        self.config = config.transport.clone();
        self
    }

    /// 전송 설정을 직접 지정합니다.
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// drain할 버퍼를 지정합니다.
    pub fn buffer(mut self, buffer: DurableBuffer) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// 클라이언트를 생성합니다.
    pub fn build(self) -> Result<TransportClient, TransportError> {
        let buffer = self.buffer.ok_or_else(|| TransportError::Config {
            field: "buffer".to_owned(),
            reason: "a durable buffer is required".to_owned(),
        })?;
        if self.config.drain_batch_size == 0 {
            return Err(TransportError::Config {
                field: "transport.drain_batch_size".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        let sender = HttpSender::new(&self.config)?;
        let breaker = CircuitBreaker::new(
            self.config.breaker_failure_threshold,
            Duration::from_secs(self.config.breaker_cooldown_secs),
        );

        Ok(TransportClient {
            config: self.config,
            buffer,
            sender,
            breaker: Arc::new(breaker),
            counters: Arc::new(DeliveryCounters::default()),
            state: ClientState::Initialized,
            cancel: CancellationToken::new(),
            task: None,
        })
    }
}

impl Default for TransportClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
