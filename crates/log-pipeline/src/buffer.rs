//! 소스별 백프레셔 큐
//!
//! [`SourceQueue`]는 소스 태스크와 프로세서 체인 사이에 놓이는 유한 용량 큐입니다.
//! 소스는 큐에만 이벤트를 넣고, 포워더 태스크가 큐에서 꺼내 공유 채널로 보냅니다.
//! 따라서 공유 채널이 가득 차면 그 압력은 소스별 정책으로 흡수됩니다.
//!
//! # 오버플로우 정책
//! 큐가 가득 찬 경우:
//! - [`BackpressurePolicy::DropOldest`]: 가장 오래된 이벤트를 드롭하고 새 이벤트를 넣음
//! - [`BackpressurePolicy::Block`]: 최대 `block_timeout_ms` 대기 후 새 이벤트를 드롭

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use logpost_core::config::{BackpressureConfig, BackpressurePolicy};
use logpost_core::event::LogEvent;
use logpost_core::metrics as m;

use crate::error::CollectorError;

struct Inner {
    source_name: String,
    events: Mutex<VecDeque<LogEvent>>,
    capacity: usize,
    policy: BackpressurePolicy,
    block_timeout: Duration,
    not_empty: Notify,
    not_full: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

/// 소스별 유한 용량 큐 (복제 시 같은 큐를 공유)
#[derive(Clone)]
pub struct SourceQueue {
    inner: Arc<Inner>,
}

impl SourceQueue {
    /// 소스 설정으로 새 큐를 생성합니다.
    pub fn new(source_name: impl Into<String>, config: &BackpressureConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                source_name: source_name.into(),
                events: Mutex::new(VecDeque::with_capacity(config.capacity.min(10_000))),
                capacity: config.capacity.max(1),
                policy: config.policy,
                block_timeout: Duration::from_millis(config.block_timeout_ms),
                not_empty: Notify::new(),
                not_full: Notify::new(),
                closed: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// 이벤트를 큐에 넣습니다.
    ///
    /// `DropOldest` 정책은 대기하지 않습니다. `Block` 정책은 자리가 날 때까지
    /// 최대 `block_timeout`만큼 대기하고, 시간이 지나면 새 이벤트를 드롭하고
    /// [`CollectorError::QueueFull`]을 반환합니다.
    pub async fn push(&self, event: LogEvent) -> Result<(), CollectorError> {
        let deadline = Instant::now() + self.inner.block_timeout;
        let mut pending = Some(event);

        loop {
            if self.inner.closed.load(Ordering::Acquire) {
                return Err(CollectorError::QueueClosed(self.inner.source_name.clone()));
            }

            {
                let mut events = self.lock();
                if events.len() < self.inner.capacity {
                    if let Some(event) = pending.take() {
                        events.push_back(event);
                    }
                    self.record_depth(events.len());
                    drop(events);
                    self.inner.not_empty.notify_one();
                    return Ok(());
                }

                if self.inner.policy == BackpressurePolicy::DropOldest {
                    events.pop_front();
                    if let Some(event) = pending.take() {
                        events.push_back(event);
                    }
                    drop(events);
                    self.record_drop();
                    self.inner.not_empty.notify_one();
                    return Ok(());
                }
            }

            if tokio::time::timeout_at(deadline, self.inner.not_full.notified())
                .await
                .is_err()
            {
                self.record_drop();
                return Err(CollectorError::QueueFull(self.inner.source_name.clone()));
            }
        }
    }

    /// 가장 오래된 이벤트를 꺼냅니다.
    ///
    /// 큐가 비어 있으면 새 이벤트가 들어올 때까지 대기하고,
    /// 닫힌 큐가 모두 비워지면 `None`을 반환합니다.
    pub async fn pop(&self) -> Option<LogEvent> {
        loop {
            {
                let mut events = self.lock();
                if let Some(event) = events.pop_front() {
                    self.record_depth(events.len());
                    drop(events);
                    self.inner.not_full.notify_one();
                    return Some(event);
                }
            }

            if self.inner.closed.load(Ordering::Acquire) {
                return None;
            }

            self.inner.not_empty.notified().await;
        }
    }

    /// 큐를 닫습니다. 이후 `push`는 실패하고, 남은 이벤트는 `pop`으로 비울 수 있습니다.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.not_empty.notify_one();
        self.inner.not_full.notify_waiters();
    }

    /// 닫혔는지 여부
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// 현재 대기 중인 이벤트 수
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 큐 용량
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// 백프레셔로 드롭된 이벤트 수
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// 소스 이름
    pub fn source_name(&self) -> &str {
        &self.inner.source_name
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<LogEvent>> {
        // 큐 연산은 패닉하지 않으므로 poison 상태의 데이터도 그대로 사용합니다.
        self.inner
            .events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn record_drop(&self) {
        let dropped = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::counter!(
            m::COLLECTOR_EVENTS_DROPPED_TOTAL,
            m::LABEL_SOURCE => self.inner.source_name.clone(),
            m::LABEL_REASON => "backpressure"
        )
        .increment(1);
        if dropped.is_power_of_two() {
            tracing::warn!(
                source = %self.inner.source_name,
                dropped,
                capacity = self.inner.capacity,
                policy = ?self.inner.policy,
                "source queue full, dropping events"
            );
        }
    }

    fn record_depth(&self, depth: usize) {
        metrics::gauge!(
            m::COLLECTOR_SOURCE_QUEUE_DEPTH,
            m::LABEL_SOURCE => self.inner.source_name.clone()
        )
        .set(depth as f64);
    }
}

impl std::fmt::Debug for SourceQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceQueue")
            .field("source_name", &self.inner.source_name)
            .field("capacity", &self.inner.capacity)
            .field("policy", &self.inner.policy)
            .field("len", &self.len())
            .finish()
    }
}
