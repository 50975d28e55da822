use serde::Serialize;

/// The error taxonomy kinds from the external interface (`§7`/`§6.3` of the
/// design notes). Concrete `ServiceError` variants below map 1:1 onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    InvalidId,
    InvalidIndex,
    CapacityLimitReached,
    ValidationError,
    ValidationTimeout,
    ConfigError,
    Unauthorized,
    Conflict,
    InternalError,
}

impl ErrorCode {
    /// HTTP status mapping from the external interface table.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::NotFound => 404,
            ErrorCode::InvalidId => 400,
            ErrorCode::InvalidIndex => 400,
            ErrorCode::ValidationError => 400,
            ErrorCode::ConfigError => 400,
            ErrorCode::ValidationTimeout => 408,
            ErrorCode::CapacityLimitReached => 409,
            ErrorCode::Conflict => 409,
            ErrorCode::Unauthorized => 401,
            ErrorCode::InternalError => 500,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("not found")]
    NotFound,
    #[error("invalid id: {0}")]
    InvalidId(String),
    #[error("invalid index: {0}")]
    InvalidIndex(String),
    #[error("capacity limit reached")]
    CapacityLimitReached,
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("validation timed out")]
    ValidationTimeout,
    #[error("config error: {0}")]
    ConfigError(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::NotFound => ErrorCode::NotFound,
            ServiceError::InvalidId(_) => ErrorCode::InvalidId,
            ServiceError::InvalidIndex(_) => ErrorCode::InvalidIndex,
            ServiceError::CapacityLimitReached => ErrorCode::CapacityLimitReached,
            ServiceError::ValidationError(_) => ErrorCode::ValidationError,
            ServiceError::ValidationTimeout => ErrorCode::ValidationTimeout,
            ServiceError::ConfigError(_) => ErrorCode::ConfigError,
            ServiceError::Unauthorized => ErrorCode::Unauthorized,
            ServiceError::Conflict(_) => ErrorCode::Conflict,
            ServiceError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Message safe to surface to a caller: never leaks paths or internal ids.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Internal(_) => "internal error".to_string(),
            ServiceError::ConfigError(_) => "configuration error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        ServiceError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::ValidationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&ServiceError> for ErrorPayload {
    fn from(e: &ServiceError) -> Self {
        ErrorPayload {
            code: e.code(),
            message: e.public_message(),
            details: None,
        }
    }
}
