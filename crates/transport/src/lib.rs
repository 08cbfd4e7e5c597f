//! Logpost 전송 클라이언트
//!
//! 내구성 버퍼의 봉투를 원격 인테이크로 전송합니다.
//!
//! # 모듈 구성
//!
//! - [`backoff`]: 지수 백오프 + 지터 (연속 지연 비감소)
//! - [`breaker`]: 연속 일시 실패 기반 서킷 브레이커
//! - [`sender`]: reqwest 기반 봉투 송신과 응답 분류
//! - [`client`]: drain 루프 (Pipeline trait 구현)
//! - [`error`]: 도메인 에러 타입
//!
//! ```text
//! DurableBuffer --peek_ready--> Drainer --POST--> Remote Intake
//!       ^                          |
//!       +--mark_delivered/failed/expired
//! ```

pub mod backoff;
pub mod breaker;
pub mod client;
pub mod error;
pub mod sender;

pub use backoff::Backoff;
pub use breaker::{BreakerState, CircuitBreaker};
pub use client::{DeliveryCounters, TransportClient, TransportClientBuilder};
pub use error::TransportError;
pub use sender::{HttpSender, USER_AGENT};
