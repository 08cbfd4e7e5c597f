//! 봉투 HTTP 송신기
//!
//! 봉투 하나를 인테이크 엔드포인트로 POST하고 결과를 분류합니다.
//!
//! | 결과 | 분류 |
//! |---|---|
//! | 2xx | 성공 |
//! | 408, 429, 5xx, 타임아웃, 연결 실패 | [`TransportError::Transient`] |
//! | 그 밖의 4xx/3xx | [`TransportError::Permanent`] |

use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use logpost_core::config::TransportConfig;
use logpost_core::envelope::{CONTENT_TYPE_SEALED, Envelope};
use logpost_core::metrics as m;

use crate::error::TransportError;

/// 요청에 붙는 User-Agent
pub const USER_AGENT: &str = concat!("logpost-collector/", env!("CARGO_PKG_VERSION"));

/// 영구 실패 사유에 포함하는 응답 본문 최대 길이
const MAX_REASON_BODY: usize = 256;

/// 인테이크 엔드포인트 송신기
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: Client,
    endpoint: Url,
    bearer_token: String,
}

impl HttpSender {
    /// 설정으로 HTTP 클라이언트를 만듭니다. 엔드포인트 URL은 여기서 검증합니다.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| TransportError::Config {
            field: "transport.endpoint".to_owned(),
            reason: format!("'{}': {e}", config.endpoint),
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Config {
                field: "transport".to_owned(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            endpoint,
            bearer_token: config.bearer_token.clone(),
        })
    }

    /// 엔드포인트 URL
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// 봉투를 전송합니다.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let body = envelope.to_json().map_err(|e| TransportError::Permanent {
            reason: format!("envelope encoding failed: {e}"),
        })?;

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, CONTENT_TYPE_SEALED)
            .body(body);
        if !self.bearer_token.is_empty() {
            request = request.bearer_auth(&self.bearer_token);
        }

        let started = Instant::now();
        let result = request.send().await;
        metrics::histogram!(m::TRANSPORT_REQUEST_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        let response = result.map_err(classify_request_error)?;
        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "envelope accepted by intake");
            return Ok(());
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, retry_after, &body))
    }
}

/// 성공이 아닌 HTTP 상태를 분류합니다.
pub fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> TransportError {
    let code = status.as_u16();
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        TransportError::Transient {
            reason: format!("http_{code}"),
            retry_after,
        }
    } else {
        let snippet: String = body.chars().take(MAX_REASON_BODY).collect();
        TransportError::Permanent {
            reason: if snippet.is_empty() {
                format!("http_{code}")
            } else {
                format!("http_{code}: {snippet}")
            },
        }
    }
}

fn classify_request_error(err: reqwest::Error) -> TransportError {
    let reason = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else {
        "request"
    };
    debug!(error = %err, reason, "request failed before a response");
    TransportError::Transient {
        reason: reason.to_owned(),
        retry_after: None,
    }
}

/// `Retry-After`의 초 단위 값만 해석합니다.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
