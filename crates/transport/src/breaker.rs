//! 서킷 브레이커
//!
//! 연속 일시 실패가 임계값에 도달하면 열리고, 냉각 시간이 지나면 반개방되어
//! 단 하나의 탐침 요청만 허용합니다. 탐침이 성공하면 닫히고, 실패하면 다시
//! 냉각 시간만큼 열립니다.
//!
//! ```text
//! Closed ──threshold failures──→ Open ──cooldown──→ HalfOpen ──success──→ Closed
//!                                  ↑                   │
//!                                  └─────failure───────┘
//! ```

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use logpost_core::metrics as m;

/// 브레이커 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// 정상 (요청 허용)
    Closed,
    /// 개방 (요청 차단)
    Open,
    /// 반개방 (탐침 하나 허용)
    HalfOpen,
}

impl BreakerState {
    /// 게이지 값 (0 = closed, 1 = open, 2 = half-open)
    pub fn gauge_value(self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::Open => 1.0,
            Self::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug)]
enum Inner {
    Closed { failures: u32 },
    Open { until: Instant },
    /// 탐침 요청이 진행 중
    HalfOpen,
}

/// 연속 실패 기반 서킷 브레이커
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// `threshold`는 최소 1로 보정합니다.
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            inner: Mutex::new(Inner::Closed { failures: 0 }),
        }
    }

    /// 현재 상태 (냉각이 끝난 Open은 HalfOpen으로 보고)
    pub fn state(&self) -> BreakerState {
        let inner = self.lock();
        match &*inner {
            Inner::Closed { .. } => BreakerState::Closed,
            Inner::Open { until } if Instant::now() >= *until => BreakerState::HalfOpen,
            Inner::Open { .. } => BreakerState::Open,
            Inner::HalfOpen => BreakerState::HalfOpen,
        }
    }

    /// 개방 상태가 끝날 때까지 남은 시간 (Open이 아니면 `None`)
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        match &*self.lock() {
            Inner::Open { until } => Some(until.saturating_duration_since(Instant::now())),
            _ => None,
        }
    }

    /// 요청을 보내도 되는지 확인합니다.
    ///
    /// 냉각이 끝난 뒤 처음 호출하면 반개방으로 전이하며 탐침 권한을 얻습니다.
    /// 탐침 결과가 기록되기 전까지 다른 호출은 거부됩니다.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        let (allowed, probe) = match *inner {
            Inner::Closed { .. } => (true, false),
            Inner::Open { until } => {
                let cooled = Instant::now() >= until;
                (cooled, cooled)
            }
            Inner::HalfOpen => (false, false),
        };
        if probe {
            debug!("circuit breaker half-open, sending probe");
            *inner = Inner::HalfOpen;
        }
        drop(inner);
        self.publish();
        allowed
    }

    /// 성공 기록: 브레이커를 닫습니다.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if !matches!(*inner, Inner::Closed { .. }) {
            debug!("circuit breaker closed after successful probe");
        }
        *inner = Inner::Closed { failures: 0 };
        drop(inner);
        self.publish();
    }

    /// 일시 실패 기록. 이번 호출로 브레이커가 열렸으면 `true`를 반환합니다.
    pub fn record_failure(&self) -> bool {
        let mut inner = self.lock();
        let opened = match &mut *inner {
            Inner::Closed { failures } => {
                *failures += 1;
                *failures >= self.threshold
            }
            Inner::HalfOpen => true,
            Inner::Open { .. } => false,
        };
        if opened {
            *inner = Inner::Open {
                until: Instant::now() + self.cooldown,
            };
            warn!(
                threshold = self.threshold,
                cooldown_secs = self.cooldown.as_secs(),
                "circuit breaker opened after consecutive transient failures"
            );
        }
        drop(inner);
        self.publish();
        opened
    }

    fn publish(&self) {
        metrics::gauge!(m::TRANSPORT_BREAKER_STATE).set(self.state().gauge_value());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_closed_below_threshold() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        assert!(!breaker.record_failure());
        assert!(!breaker.record_failure());
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.try_acquire());
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_success();
        assert!(!breaker.record_failure());
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn opens_at_threshold_and_blocks() {
        // Given
        let breaker = CircuitBreaker::new(2, Duration::from_secs(30));

        // When
        breaker.record_failure();
        let opened = breaker.record_failure();

        // Then
        assert!(opened);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.try_acquire());
        assert_eq!(breaker.remaining_cooldown(), Some(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_allows_single_probe() {
        // Given: 열린 브레이커
        let breaker = CircuitBreaker::new(1, Duration::from_secs(30));
        breaker.record_failure();

        // When: 냉각 시간 경과
        tokio::time::advance(Duration::from_secs(31)).await;

        // Then: 첫 요청만 탐침으로 허용
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.try_acquire());
        assert!(!breaker.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker.try_acquire());

        assert!(breaker.record_failure());
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn successful_probe_closes() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker.try_acquire());

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.try_acquire());
        assert!(breaker.try_acquire());
    }

    #[test]
    fn gauge_values_are_distinct() {
        assert_eq!(BreakerState::Closed.gauge_value(), 0.0);
        assert_eq!(BreakerState::Open.gauge_value(), 1.0);
        assert_eq!(BreakerState::HalfOpen.gauge_value(), 2.0);
        assert_eq!(BreakerState::HalfOpen.to_string(), "half_open");
    }
}
