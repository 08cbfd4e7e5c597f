//! 인테이크 HTTP 서버
//!
//! `POST /v1/logs` 요청 처리 순서:
//!
//! ```text
//! Bearer 인증 → Content-Type 분기 → (봉투 파싱 → client_id 대조 → unseal)
//!             → 스키마 검증 → 멱등 저장 → 싱크 알림 → 200
//! ```
//!
//! 각 단계는 실패 시 [`IntakeError`]로 즉시 응답하며, 그 뒤 단계는 실행되지 않습니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logpost_core::config::{IntakeConfig, LogpostConfig};
use logpost_core::envelope::{CONTENT_TYPE_PLAIN, CONTENT_TYPE_SEALED, Envelope};
use logpost_core::error::{LogpostError, PipelineError};
use logpost_core::event::LogBatch;
use logpost_core::metrics as m;
use logpost_core::pipeline::{HealthStatus, Pipeline};

use crate::auth::ClientRegistry;
use crate::error::IntakeError;
use crate::keystore::KeyStore;
use crate::sink::{IntakeSink, TracingSink};
use crate::store::{RecordStore, StoreOutcome};
use crate::validate::{SchemaLimits, validate_batch};

/// 서버 태스크 종료 대기 한도
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// 요청 처리에 공유되는 상태
#[derive(Clone)]
pub struct IntakeState {
    registry: Arc<ClientRegistry>,
    keys: Arc<KeyStore>,
    limits: SchemaLimits,
    store: RecordStore,
    sink: Arc<dyn IntakeSink>,
    allow_plaintext: bool,
}

/// 성공 응답 본문
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// `accepted` 또는 `duplicate`
    pub status: &'static str,
    /// 새로 저장된 레코드 수
    pub records: usize,
}

/// 인테이크 라우터를 생성합니다.
pub fn router(state: IntakeState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/v1/logs", post(ingest))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<HealthStatus> {
    Json(HealthStatus::Healthy)
}

async fn ingest(State(state): State<IntakeState>, headers: HeaderMap, body: Bytes) -> Response {
    match handle_ingest(&state, &headers, &body).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn handle_ingest(
    state: &IntakeState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<IngestResponse, IntakeError> {
    let identity = state.registry.authenticate(headers)?;

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
        .unwrap_or_default();

    let (batch, content_hash) = match content_type.as_str() {
        CONTENT_TYPE_SEALED => {
            let envelope =
                Envelope::from_json(body).map_err(|e| IntakeError::Malformed(e.to_string()))?;
            if envelope.client_id != identity.client_id {
                return Err(IntakeError::ClientMismatch {
                    authenticated: identity.client_id,
                    claimed: envelope.client_id,
                });
            }
            let batch = logpost_seal::unseal(&envelope, state.keys.as_ref()).map_err(|e| {
                debug!(client_id = %identity.client_id, error = %e, "envelope rejected");
                IntakeError::VerificationFailed
            })?;
            (batch, envelope.content_hash())
        }
        CONTENT_TYPE_PLAIN if state.allow_plaintext => {
            let batch: LogBatch =
                serde_json::from_slice(body).map_err(|e| IntakeError::Malformed(e.to_string()))?;
            (batch, blake3::hash(body).to_hex().to_string())
        }
        other => return Err(IntakeError::UnsupportedMediaType(other.to_owned())),
    };

    validate_batch(&batch, &state.limits)?;

    match state
        .store
        .persist(&identity.client_id, &content_hash, &batch)
        .await?
    {
        StoreOutcome::Stored(records) => {
            metrics::counter!(m::INTAKE_BATCHES_ACCEPTED_TOTAL).increment(1);
            metrics::counter!(m::INTAKE_RECORDS_STORED_TOTAL).increment(records as u64);
            debug!(client_id = %identity.client_id, records, "batch accepted");
            state.sink.on_persisted(&identity.client_id, &batch);
            Ok(IngestResponse {
                status: "accepted",
                records,
            })
        }
        StoreOutcome::Duplicate => {
            metrics::counter!(m::INTAKE_BATCHES_DUPLICATE_TOTAL).increment(1);
            debug!(client_id = %identity.client_id, content_hash = %content_hash, "duplicate batch acknowledged");
            Ok(IngestResponse {
                status: "duplicate",
                records: 0,
            })
        }
    }
}

/// 서버 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    Initialized,
    Running,
    Stopped,
}

/// 원격 인테이크 서버
///
/// # 사용 예시
/// ```ignore
/// let store = RecordStore::open(config.intake_database_path()).await?;
/// let mut server = IntakeServerBuilder::new()
///     .config(&config)
///     .store(store)
///     .build()?;
/// server.start().await?;
/// ```
pub struct IntakeServer {
    config: IntakeConfig,
    state: IntakeState,
    server_state: ServerState,
    local_addr: Option<SocketAddr>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl IntakeServer {
    /// 현재 상태 이름
    pub fn state_name(&self) -> &str {
        match self.server_state {
            ServerState::Initialized => "initialized",
            ServerState::Running => "running",
            ServerState::Stopped => "stopped",
        }
    }

    /// 실제 바인드된 주소 (시작 후)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// 검증 키 저장소 (SIGHUP 재로드용)
    pub fn keys(&self) -> Arc<KeyStore> {
        Arc::clone(&self.state.keys)
    }

    /// 레코드 저장소
    pub fn store(&self) -> &RecordStore {
        &self.state.store
    }

    /// 설정된 제한이 적용된 라우터
    pub fn router(&self) -> Router {
        router(self.state.clone(), self.config.max_body_bytes)
    }
}

impl Pipeline for IntakeServer {
    async fn start(&mut self) -> Result<(), LogpostError> {
        if self.server_state == ServerState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let listener = TcpListener::bind(&self.config.bind_addr).await.map_err(|e| {
            PipelineError::InitFailed(format!(
                "failed to bind intake to {}: {e}",
                self.config.bind_addr
            ))
        })?;
        let local_addr = listener.local_addr()?;
        info!(
            bind_addr = %local_addr,
            clients = self.state.registry.len(),
            allow_plaintext = self.state.allow_plaintext,
            "intake server listening"
        );

        self.cancel = CancellationToken::new();
        let cancel = self.cancel.clone();
        let app = self.router();
        self.task = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await
            {
                warn!(error = %e, "intake server exited with error");
            }
        }));
        self.local_addr = Some(local_addr);
        self.server_state = ServerState::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LogpostError> {
        if self.server_state != ServerState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        self.cancel.cancel();
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(STOP_TIMEOUT, &mut task).await.is_err() {
                warn!("intake server did not drain in time, aborting");
                task.abort();
            }
        }
        self.server_state = ServerState::Stopped;
        info!("intake server stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.server_state {
            ServerState::Running => {
                if self.task.as_ref().is_some_and(|t| t.is_finished()) {
                    HealthStatus::Unhealthy("server task exited".to_owned())
                } else if self.state.registry.is_empty() {
                    HealthStatus::Degraded("no clients registered".to_owned())
                } else {
                    HealthStatus::Healthy
                }
            }
            ServerState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ServerState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// [`IntakeServer`] 빌더
pub struct IntakeServerBuilder {
    config: IntakeConfig,
    store: Option<RecordStore>,
    keys: Option<KeyStore>,
    sink: Option<Arc<dyn IntakeSink>>,
}

impl IntakeServerBuilder {
    /// 기본 설정으로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: IntakeConfig::default(),
            store: None,
            keys: None,
            sink: None,
        }
    }

    /// 전체 설정에서 인테이크 설정을 가져옵니다.
    pub fn config(mut self, config: &LogpostConfig) -> Self {
        self.config = config.intake.clone();
        self
    }

    /// 인테이크 설정을 직접 지정합니다.
    pub fn intake_config(mut self, config: IntakeConfig) -> Self {
        self.config = config;
        self
    }

    /// 레코드 저장소 (필수)
    pub fn store(mut self, store: RecordStore) -> Self {
        self.store = Some(store);
        self
    }

    /// 검증 키 저장소. 지정하지 않으면 `keys_dir`를 읽습니다.
    pub fn keys(mut self, keys: KeyStore) -> Self {
        self.keys = Some(keys);
        self
    }

    /// 저장 완료 알림을 받을 싱크. 기본값은 [`TracingSink`].
    pub fn sink(mut self, sink: Arc<dyn IntakeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 서버를 생성합니다.
    pub fn build(self) -> Result<IntakeServer, IntakeError> {
        let store = self.store.ok_or_else(|| IntakeError::Config {
            field: "store".to_owned(),
            reason: "a record store is required".to_owned(),
        })?;
        if self.config.max_body_bytes == 0 {
            return Err(IntakeError::Config {
                field: "intake.max_body_bytes".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        let registry = ClientRegistry::new(&self.config.clients);
        if registry.is_empty() {
            warn!("intake has no clients with tokens, every request will be rejected");
        }
        let keys = self
            .keys
            .unwrap_or_else(|| KeyStore::new(&self.config.keys_dir));

        let state = IntakeState {
            registry: Arc::new(registry),
            keys: Arc::new(keys),
            limits: SchemaLimits::from_config(&self.config),
            store,
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
            allow_plaintext: self.config.allow_plaintext,
        };

        Ok(IntakeServer {
            config: self.config,
            state,
            server_state: ServerState::Initialized,
            local_addr: None,
            cancel: CancellationToken::new(),
            task: None,
        })
    }
}

impl Default for IntakeServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
