//! 파이프라인 trait -- 장기 실행 컴포넌트의 생명주기 정의
//!
//! 수집기, 전송 클라이언트, 인테이크 서버는 모두 [`Pipeline`]을 구현하고
//! 데몬의 플러그인 레지스트리에서 같은 방식(start/stop/health_check)으로 관리됩니다.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::error::LogpostError;

/// dyn-compatible trait에서 사용하는 박싱된 Future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 컴포넌트 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 성능 저하 (예: 백로그 증가, 서킷 개방)
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 여부
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 여부
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// 장기 실행 컴포넌트 trait
pub trait Pipeline: Send + Sync {
    /// 백그라운드 태스크를 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), LogpostError>> + Send;

    /// 협력적 종료를 수행합니다. 모든 대기는 유한 시간 안에 끝나야 합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), LogpostError>> + Send;

    /// 건강 상태를 보고합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_predicates() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(!HealthStatus::Degraded("slow".into()).is_healthy());
        assert!(HealthStatus::Unhealthy("down".into()).is_unhealthy());
    }

    #[test]
    fn health_serializes_with_reason() {
        let json = serde_json::to_string(&HealthStatus::Degraded("backlog".into())).unwrap();
        assert_eq!(json, r#"{"status":"degraded","reason":"backlog"}"#);
    }
}
