//! HTTP ingest 수집기
//!
//! `POST /ingest`로 JSON 객체 하나 또는 객체 배열을 받습니다.
//!
//! ```json
//! [{"body": "user login", "level": "info", "attributes": {"user": "alice"}}]
//! ```
//!
//! 응답:
//! - `202 Accepted` `{"accepted": n}`
//! - `400 Bad Request`: JSON 형식 오류
//! - `413 Payload Too Large`: `max_body_bytes` 초과
//! - `503 Service Unavailable`: `block` 정책에서 큐가 가득 참 (클라이언트가 재시도)

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use logpost_core::config::HttpSourceConfig;
use logpost_core::event::LogEvent;

use crate::buffer::SourceQueue;
use crate::error::CollectorError;

/// 요청 본문의 이벤트 하나
#[derive(Debug, Deserialize)]
struct IngestEvent {
    body: String,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IngestPayload {
    One(IngestEvent),
    Many(Vec<IngestEvent>),
}

#[derive(Clone)]
struct IngestState {
    name: String,
    queue: SourceQueue,
}

/// HTTP ingest 수집기
pub struct HttpCollector {
    name: String,
    config: HttpSourceConfig,
    queue: SourceQueue,
    cancel: CancellationToken,
}

impl HttpCollector {
    /// 새 HTTP 수집기를 생성합니다.
    pub fn new(
        name: &str,
        config: HttpSourceConfig,
        queue: SourceQueue,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: name.to_owned(),
            config,
            queue,
            cancel,
        }
    }

    /// `/ingest` 라우터를 생성합니다.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ingest", post(ingest))
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .with_state(IngestState {
                name: self.name.clone(),
                queue: self.queue.clone(),
            })
    }

    /// 바인드 후 취소될 때까지 요청을 처리합니다.
    pub async fn run(&mut self) -> Result<(), CollectorError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await.map_err(|e| {
            CollectorError::unavailable(
                &self.name,
                format!("failed to bind to {}: {e}", self.config.bind_addr),
            )
        })?;
        info!(source = %self.name, bind_addr = %self.config.bind_addr, "HTTP ingest collector listening");

        let cancel = self.cancel.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| CollectorError::unavailable(&self.name, format!("server error: {e}")))?;
        debug!(source = %self.name, "HTTP ingest collector stopped");
        Ok(())
    }
}

async fn ingest(State(state): State<IngestState>, body: Bytes) -> Response {
    let payload: IngestPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid payload: {e}") })),
            )
                .into_response();
        }
    };
    let events = match payload {
        IngestPayload::One(event) => vec![event],
        IngestPayload::Many(events) => events,
    };

    let mut accepted = 0usize;
    for item in events {
        let mut event = LogEvent::new(&state.name, item.body);
        if let Some(level) = item.level {
            event = event.with_level(level);
        }
        if let Some(ts) = item.timestamp {
            event = event.with_timestamp(ts);
        }
        event.attributes.extend(item.attributes);

        match state.queue.push(event).await {
            Ok(()) => accepted += 1,
            Err(CollectorError::QueueFull(_)) => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "queue full", "accepted": accepted })),
                )
                    .into_response();
            }
            Err(_) => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "source stopping", "accepted": accepted })),
                )
                    .into_response();
            }
        }
    }

    (StatusCode::ACCEPTED, Json(json!({ "accepted": accepted }))).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use logpost_core::config::{BackpressureConfig, BackpressurePolicy};
    use tower::ServiceExt;

    use super::*;

    fn collector(backpressure: BackpressureConfig, max_body_bytes: usize) -> (HttpCollector, SourceQueue) {
        let queue = SourceQueue::new("http", &backpressure);
        let collector = HttpCollector::new(
            "http",
            HttpSourceConfig {
                bind_addr: "127.0.0.1:0".to_owned(),
                max_body_bytes,
            },
            queue.clone(),
            CancellationToken::new(),
        );
        (collector, queue)
    }

    fn post_ingest(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/ingest")
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn single_object_is_accepted() {
        let (collector, queue) = collector(BackpressureConfig::default(), 1024);

        let response = collector
            .router()
            .oneshot(post_ingest(r#"{"body":"hello","level":"warn","attributes":{"k":"v"}}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let event = queue.pop().await.unwrap();
        assert_eq!(event.body, "hello");
        assert_eq!(event.level.as_deref(), Some("warn"));
        assert_eq!(event.attributes["k"], "v");
        assert_eq!(event.source_name, "http");
    }

    #[tokio::test]
    async fn array_preserves_order() {
        let (collector, queue) = collector(BackpressureConfig::default(), 1024);

        let response = collector
            .router()
            .oneshot(post_ingest(r#"[{"body":"a"},{"body":"b"},{"body":"c"}]"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["accepted"], 3);
        for expected in ["a", "b", "c"] {
            assert_eq!(queue.pop().await.unwrap().body, expected);
        }
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let (collector, queue) = collector(BackpressureConfig::default(), 1024);
        let response = collector.router().oneshot(post_ingest("{nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let (collector, _queue) = collector(BackpressureConfig::default(), 16);
        let response = collector
            .router()
            .oneshot(post_ingest(r#"{"body":"this body is longer than sixteen bytes"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn full_queue_under_block_policy_returns_503() {
        // Given: 용량 1, block 정책 큐
        let (collector, queue) = collector(
            BackpressureConfig {
                capacity: 1,
                policy: BackpressurePolicy::Block,
                block_timeout_ms: 10,
            },
            1024,
        );

        // When
        let response = collector
            .router()
            .oneshot(post_ingest(r#"[{"body":"first"},{"body":"second"}]"#))
            .await
            .unwrap();

        // Then: 첫 이벤트만 적재됨
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(queue.len(), 1);
    }
}
