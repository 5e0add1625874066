/// Error Handling Module
///
/// Unified error handling for the service:
/// 1. Domain-specific error types (validation, storage, auth, config)
/// 2. The unified `AppError` used for control flow in handlers
/// 3. The refresh-protocol taxonomy: a rich internal `RefreshError` narrowed
///    to a two-member `RefreshRejection` at the service boundary
/// 4. HTTP response mapping with structured logging

use actix_web::{http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

use crate::principal::PrincipalId;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
    SuspiciousContent(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::SuspiciousContent(field) => {
                write!(f, "{} contains suspicious content", field)
            }
        }
    }
}

impl StdError for ValidationError {}

/// Credential store errors
///
/// These describe infrastructure failures only. "No such principal" is not an
/// error at this layer; lookups return `Option`.
#[derive(Debug, Clone)]
pub enum StoreError {
    Unavailable(String),
    Corrupt(String),
    Unexpected(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "Credential store unavailable: {}", msg),
            StoreError::Corrupt(msg) => write!(f, "Corrupt stored data: {}", msg),
            StoreError::Unexpected(msg) => write!(f, "Credential store error: {}", msg),
        }
    }
}

impl StdError for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(err.to_string())
            }
            _ => StoreError::Unexpected(err.to_string()),
        }
    }
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// Authentication errors for password login and access tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    TokenInvalid,
    MissingToken,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid credentials"),
            AuthError::TokenInvalid => write!(f, "Invalid or expired token"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
        }
    }
}

impl StdError for AuthError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Store(StoreError),
    Auth(AuthError),
    Config(ConfigError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Store(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

/// ============================================================================
/// 3. REFRESH PROTOCOL ERRORS
/// ============================================================================

/// Internal cause of a rejected refresh
///
/// Kept rich for logging. Never leaves the service; callers only ever see the
/// `RefreshRejection` it narrows to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    MissingCredential,
    MalformedCredential,
    NoSuchPrincipal(PrincipalId),
    DigestMismatch(PrincipalId),
    CredentialExpired(PrincipalId),
    PersistenceUnavailable(String),
    HashRecordCorrupt(String),
    HashingFailure(String),
    SigningFailure(String),
    RotationConflict(PrincipalId),
}

impl RefreshError {
    /// Narrow to the externally visible class
    pub fn rejection(&self) -> RefreshRejection {
        match self {
            RefreshError::MissingCredential
            | RefreshError::MalformedCredential
            | RefreshError::NoSuchPrincipal(_)
            | RefreshError::DigestMismatch(_)
            | RefreshError::CredentialExpired(_) => RefreshRejection::InvalidRefreshToken,
            RefreshError::PersistenceUnavailable(_)
            | RefreshError::HashRecordCorrupt(_)
            | RefreshError::HashingFailure(_)
            | RefreshError::SigningFailure(_)
            | RefreshError::RotationConflict(_) => RefreshRejection::InternalError,
        }
    }

    pub fn log(&self, request_id: &str) {
        match self.rejection() {
            RefreshRejection::InvalidRefreshToken => {
                tracing::warn!(request_id = request_id, cause = %self, "Refresh rejected");
            }
            RefreshRejection::InternalError => {
                tracing::error!(request_id = request_id, cause = %self, "Refresh failed");
            }
        }
    }
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshError::MissingCredential => write!(f, "no refresh credential presented"),
            RefreshError::MalformedCredential => write!(f, "malformed refresh credential"),
            RefreshError::NoSuchPrincipal(id) => {
                write!(f, "no credential slot for principal {}", id)
            }
            RefreshError::DigestMismatch(id) => write!(f, "digest mismatch for principal {}", id),
            RefreshError::CredentialExpired(id) => {
                write!(f, "refresh credential expired for principal {}", id)
            }
            RefreshError::PersistenceUnavailable(msg) => write!(f, "persistence failure: {}", msg),
            RefreshError::HashRecordCorrupt(msg) => write!(f, "stored hash record corrupt: {}", msg),
            RefreshError::HashingFailure(msg) => write!(f, "hashing failed: {}", msg),
            RefreshError::SigningFailure(msg) => write!(f, "access token signing failed: {}", msg),
            RefreshError::RotationConflict(id) => {
                write!(f, "rotation conflict persisted for principal {}", id)
            }
        }
    }
}

impl StdError for RefreshError {}

impl From<StoreError> for RefreshError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Corrupt(msg) => RefreshError::HashRecordCorrupt(msg),
            other => RefreshError::PersistenceUnavailable(other.to_string()),
        }
    }
}

/// The only two outcomes a failed refresh exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRejection {
    InvalidRefreshToken,
    InternalError,
}

impl fmt::Display for RefreshRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshRejection::InvalidRefreshToken => write!(f, "Invalid refresh token"),
            RefreshRejection::InternalError => write!(f, "Internal server error"),
        }
    }
}

impl StdError for RefreshRejection {}

// ============================================================================
// 4. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Request id the failure is logged under
    pub error_id: String,
    pub message: String,
    pub code: String,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);

    fn to_http_response(&self, request_id: &str) -> HttpResponse {
        self.log_error(request_id);
        let (status, body) = self.error_response(request_id);
        HttpResponse::build(status).json(body)
    }
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = match self {
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),
            AppError::Store(StoreError::Unavailable(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "Credential store temporarily unavailable".to_string(),
            ),
            AppError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                "Credential store error occurred".to_string(),
            ),
            AppError::Auth(AuthError::InvalidCredentials) => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid credentials".to_string(),
            ),
            AppError::Auth(AuthError::TokenInvalid) => (
                StatusCode::UNAUTHORIZED,
                "TOKEN_INVALID",
                "Invalid or expired token".to_string(),
            ),
            AppError::Auth(AuthError::MissingToken) => (
                StatusCode::UNAUTHORIZED,
                "MISSING_TOKEN",
                "Missing authentication token".to_string(),
            ),
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                "Server configuration error".to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        };

        let body = ErrorResponse::new(
            request_id.to_string(),
            message,
            code.to_string(),
            status.as_u16(),
        );
        (status, body)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Validation error");
            }
            AppError::Auth(AuthError::InvalidCredentials) => {
                tracing::warn!(request_id = request_id, error = %self, "Invalid credentials attempt");
            }
            AppError::Auth(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Authentication error");
            }
            AppError::Store(e) => {
                tracing::error!(request_id = request_id, error = %e, "Credential store error");
            }
            AppError::Config(e) => {
                tracing::error!(request_id = request_id, error = %e, "Configuration error");
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

impl ErrorHandler for RefreshRejection {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code) = match self {
            RefreshRejection::InvalidRefreshToken => {
                (StatusCode::UNAUTHORIZED, "INVALID_REFRESH_TOKEN")
            }
            RefreshRejection::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };
        let body = ErrorResponse::new(
            request_id.to_string(),
            self.to_string(),
            code.to_string(),
            status.as_u16(),
        );
        (status, body)
    }

    // The internal cause was already logged by the session service
    fn log_error(&self, _request_id: &str) {}
}

// ============================================================================
// 5. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Per-request diagnostic context
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub principal_id: Option<PrincipalId>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            principal_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_principal_id(mut self, principal_id: PrincipalId) -> Self {
        self.principal_id = Some(principal_id);
        self
    }

    pub fn log_error(&self, error: &AppError) {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "principal_id": self.principal_id.map(|id| id.as_i64()),
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match error {
            AppError::Validation(_) | AppError::Auth(_) => {
                tracing::warn!(error = %error, context = ?context, "Request rejected");
            }
            _ => {
                tracing::error!(error = %error, context = ?context, "Request failed");
            }
        }
    }
}
