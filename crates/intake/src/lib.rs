//! Logpost 원격 인테이크
//!
//! 클라이언트가 보낸 봉투를 인증, 검증하고 레코드를 멱등하게 저장합니다.
//!
//! # 모듈 구성
//!
//! - [`auth`]: Bearer 토큰 → client_id (상수 시간 비교)
//! - [`keystore`]: client_id별 검증 키 파일 로드/캐시
//! - [`validate`]: 배치 스키마 제한 검사
//! - [`store`]: `(client_id, content_hash)` 기준 멱등 SQLite 저장
//! - [`sink`]: 저장 완료 배치 알림 (분석 서브시스템 연결점)
//! - [`server`]: axum 라우터와 서버 생명주기 (Pipeline trait 구현)
//! - [`error`]: 도메인 에러와 HTTP 응답 매핑
//!
//! 응답 코드는 전송 클라이언트의 재시도 분류와 맞물립니다. 4xx는 재시도해도
//! 결과가 같으므로 영구 실패, 5xx는 일시 실패입니다. 중복 배치는 200으로
//! 응답하여 클라이언트가 항목을 전달 완료로 처리하게 합니다.

pub mod auth;
pub mod error;
pub mod keystore;
pub mod server;
pub mod sink;
pub mod store;
pub mod validate;

pub use auth::{ClientIdentity, ClientRegistry};
pub use error::{ErrorResponse, IntakeError};
pub use keystore::KeyStore;
pub use server::{IngestResponse, IntakeServer, IntakeServerBuilder, IntakeState, router};
pub use sink::{CollectingSink, IntakeSink, TracingSink};
pub use store::{RecordStore, StoreOutcome};
pub use validate::{SchemaLimits, validate_batch};
