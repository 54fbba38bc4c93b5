use axum::Json;
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 键值存储（Redis）调用失败
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key-value store unavailable during {op}: {reason}")]
    Unavailable { op: &'static str, reason: String },
    #[error("key-value store call {op} timed out after {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u64 },
    #[error("key-value store rejected {op}: {reason}")]
    Command { op: &'static str, reason: String },
}

impl StoreError {
    pub(crate) fn from_redis(op: &'static str, err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_timeout()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
        {
            StoreError::Unavailable {
                op,
                reason: err.to_string(),
            }
        } else {
            StoreError::Command {
                op,
                reason: err.to_string(),
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    /// 超时、断连或命令失败都归为存储不可用
    #[error("rate limit store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    #[error("invalid rate limit identity: {0:?}")]
    InvalidIdentity(String),
}

/// 记录存储（数据库）错误
#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Rejected(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for environment variable {name}")]
    Invalid { name: &'static str, value: String },
}

/// HTTP 层错误，统一转换为 JSON 响应
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    UnprocessableEntity(String),
    RateLimited { retry_after_secs: u64 },
    ServiceUnavailable(String),
    InternalServerError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    code: i32,
    error_message: String,
}

impl From<RecordStoreError> for AppError {
    fn from(err: RecordStoreError) -> Self {
        match err {
            RecordStoreError::Conflict(msg) => AppError::BadRequest(msg),
            RecordStoreError::Rejected(msg) => AppError::UnprocessableEntity(msg),
            RecordStoreError::Database(e) => {
                tracing::error!("Record store failure: {}", e);
                AppError::InternalServerError("Internal Server Error".to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after = None;
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::UnprocessableEntity(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::RateLimited { retry_after_secs } => {
                retry_after = Some(retry_after_secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "Too Many Requests".to_string(),
                )
            }
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse {
            code: status.as_u16() as i32,
            error_message,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
