//! 인테이크 에러 타입
//!
//! 요청 처리 에러는 [`IntoResponse`]로 HTTP 응답이 됩니다.
//! 4xx는 전송 클라이언트가 영구 실패로, 5xx는 일시 실패로 분류합니다.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use logpost_core::error::{LogpostError, PipelineError, StorageError};
use logpost_core::metrics as m;

/// 인테이크 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    /// 자격 증명이 없거나 등록되지 않음
    #[error("authentication required")]
    Unauthorized,

    /// 인증된 신원과 봉투의 client_id 불일치
    #[error("client mismatch: authenticated as '{authenticated}', envelope claims '{claimed}'")]
    ClientMismatch {
        /// 토큰으로 인증된 client_id
        authenticated: String,
        /// 봉투의 client_id
        claimed: String,
    },

    /// 지원하지 않는 Content-Type (또는 비활성화된 평문 경로)
    #[error("unsupported content type: {0}")]
    UnsupportedMediaType(String),

    /// 봉투/배치 JSON 형식 오류
    #[error("malformed request: {0}")]
    Malformed(String),

    /// 봉투 검증 실패 (원인은 노출하지 않음)
    #[error("verification failed")]
    VerificationFailed,

    /// 배치 스키마 검증 실패
    #[error("validation error: {field}: {message}")]
    Validation {
        /// 위반한 필드 경로 (예: `records[3].body`)
        field: String,
        /// 위반 내용
        message: String,
    },

    /// 레코드 저장소 에러
    #[error("storage error: {0}")]
    Storage(String),

    /// 인테이크 구성 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러 (바인드 등)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntakeError {
    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// HTTP 상태 코드
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ClientMismatch { .. } => StatusCode::FORBIDDEN,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::VerificationFailed => StatusCode::BAD_REQUEST,
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Storage(_) | Self::Config { .. } | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 기계 판독용 에러 코드 (거부 메트릭의 reason 레이블)
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::ClientMismatch { .. } => "client_mismatch",
            Self::UnsupportedMediaType(_) => "unsupported_media_type",
            Self::Malformed(_) => "malformed",
            Self::VerificationFailed => "verification_failed",
            Self::Validation { .. } => "validation",
            Self::Storage(_) => "storage",
            Self::Config { .. } => "config",
            Self::Io(_) => "io",
        }
    }
}

impl From<rusqlite::Error> for IntakeError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// 에러 응답 본문
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// 에러 코드
    pub error: &'static str,
    /// 에러 메시지
    pub message: String,
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
        };

        metrics::counter!(m::INTAKE_BATCHES_REJECTED_TOTAL, m::LABEL_REASON => body.error)
            .increment(1);
        if status.is_server_error() {
            tracing::error!(error_code = body.error, error_message = %body.message, "intake request failed");
        } else {
            tracing::warn!(error_code = body.error, error_message = %body.message, status = %status, "intake request rejected");
        }

        (status, Json(body)).into_response()
    }
}

impl From<IntakeError> for LogpostError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::Io(e) => LogpostError::Io(e),
            IntakeError::Storage(msg) => LogpostError::Storage(StorageError::Query(msg)),
            other => LogpostError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
