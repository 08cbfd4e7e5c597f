//! 지수 백오프 + 지터
//!
//! `attempt`번째 재시도 지연은 `[ceiling(attempt - 1), ceiling(attempt)]` 구간에서
//! 무작위로 고릅니다. `ceiling(n) = min(base * 2^n, max)`이므로 지터가 있어도
//! 연속된 지연은 감소하지 않고, 상한에 도달하면 정확히 `max`로 고정됩니다.

use std::time::Duration;

use rand::Rng;

use logpost_core::config::TransportConfig;

/// 지터 해상도 (천분율)
const JITTER_SCALE: u32 = 1_000;

/// 재시도 지연 계산기
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    /// `max`가 `base`보다 작으면 `base`로 올립니다.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// 전송 설정의 재시도 지연 값으로 생성합니다.
    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(
            Duration::from_millis(config.retry_base_delay_ms),
            Duration::from_millis(config.retry_max_delay_ms),
        )
    }

    /// 기본 지연
    pub fn base(&self) -> Duration {
        self.base
    }

    /// 지연 상한
    pub fn max(&self) -> Duration {
        self.max
    }

    /// 지터를 적용하지 않은 `attempt`번째 지연 상한 (`attempt`는 0부터)
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    fn floor(&self, attempt: u32) -> Duration {
        match attempt.checked_sub(1) {
            Some(prev) => self.ceiling(prev),
            None => self.base / 2,
        }
    }

    /// 지터 값(`0..=1000` 천분율)을 지정해 지연을 계산합니다.
    pub fn delay_with_jitter(&self, attempt: u32, permille: u32) -> Duration {
        let floor = self.floor(attempt);
        let ceiling = self.ceiling(attempt);
        let span = (ceiling - floor).as_nanos();
        let offset = span * u128::from(permille.min(JITTER_SCALE)) / u128::from(JITTER_SCALE);
        let offset = Duration::from_nanos(u64::try_from(offset).unwrap_or(u64::MAX));
        (floor + offset).min(ceiling)
    }

    /// 무작위 지터로 `attempt`번째 지연을 계산합니다.
    pub fn delay(&self, attempt: u32) -> Duration {
        let permille = rand::thread_rng().gen_range(0..=JITTER_SCALE);
        self.delay_with_jitter(attempt, permille)
    }
}
