//! 크기/시간 기준 배치 누적기
//!
//! 첫 이벤트가 들어온 시점부터 `timeout`을 잽니다. 크기 조건과 시간 조건 중
//! 먼저 도달한 쪽이 배치 하나를 방출합니다.

use std::time::Duration;

use tokio::time::Instant;

use logpost_core::config::BatchConfig;
use logpost_core::event::LogEvent;

/// 배치 누적기
#[derive(Debug)]
pub struct Batcher {
    send_batch_size: usize,
    timeout: Duration,
    pending: Vec<LogEvent>,
    started_at: Option<Instant>,
}

impl Batcher {
    /// 설정에서 누적기를 생성합니다.
    pub fn new(config: &BatchConfig) -> Self {
        let send_batch_size = config.send_batch_size.max(1);
        Self {
            send_batch_size,
            timeout: Duration::from_millis(config.timeout_ms.max(1)),
            pending: Vec::with_capacity(send_batch_size),
            started_at: None,
        }
    }

    /// 크기 트리거
    pub fn send_batch_size(&self) -> usize {
        self.send_batch_size
    }

    /// 시간 트리거
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 누적 중인 이벤트 수
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// 누적 중인 이벤트가 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// 이벤트를 추가하고, 크기 조건을 채우면 배치를 반환합니다.
    pub fn push(&mut self, event: LogEvent) -> Option<Vec<LogEvent>> {
        if self.pending.is_empty() {
            self.started_at = Some(Instant::now());
        }
        self.pending.push(event);
        if self.pending.len() >= self.send_batch_size {
            self.take()
        } else {
            None
        }
    }

    /// 시간 조건 마감 시각. 누적 중인 이벤트가 없으면 `None`입니다.
    pub fn deadline(&self) -> Option<Instant> {
        self.started_at.map(|started| started + self.timeout)
    }

    /// 부분 배치를 꺼냅니다. 비어 있으면 `None`입니다.
    pub fn flush(&mut self) -> Option<Vec<LogEvent>> {
        self.take()
    }

    fn take(&mut self) -> Option<Vec<LogEvent>> {
        self.started_at = None;
        if self.pending.is_empty() {
            return None;
        }
        Some(std::mem::replace(
            &mut self.pending,
            Vec::with_capacity(self.send_batch_size),
        ))
    }
}
