use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Errors raised by the install pipeline and library operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The manifest could not be decoded as a playlist object
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    /// The remote answered with a non-success, non-redirect status
    #[error("remote returned HTTP {0}")]
    RemoteError(u16),

    /// The retrieval did not finish within the allotted wall-clock time
    #[error("download timed out after {0:?}")]
    Timeout(Duration),

    /// The downloaded archive could not be parsed
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// A path resolved outside the library root
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Structured error codes for host responses
/// These allow the UI to distinguish between failure classes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorCode {
    /// Input validation failed (malformed manifest, bad arguments)
    ValidationFailed,
    /// Permission denied (file access)
    PermissionDenied,
    /// Resource not found (file, directory, entry doesn't exist)
    NotFound,
    /// Network-related error (download failed, bad status)
    NetworkError,
    /// Archive-related error (extraction failed)
    ArchiveError,
    /// Path traversal attempt detected
    SecurityViolation,
    /// Operation timeout
    Timeout,
    /// No library root has been configured yet
    NotConfigured,
    /// Internal error (unexpected condition)
    Internal,
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorCode::ValidationFailed => write!(f, "validation_failed"),
            ApiErrorCode::PermissionDenied => write!(f, "permission_denied"),
            ApiErrorCode::NotFound => write!(f, "not_found"),
            ApiErrorCode::NetworkError => write!(f, "network_error"),
            ApiErrorCode::ArchiveError => write!(f, "archive_error"),
            ApiErrorCode::SecurityViolation => write!(f, "security_violation"),
            ApiErrorCode::Timeout => write!(f, "timeout"),
            ApiErrorCode::NotConfigured => write!(f, "not_configured"),
            ApiErrorCode::Internal => write!(f, "internal"),
        }
    }
}

/// Structured host error with code, message, and optional details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        code: ApiErrorCode,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details: Some(details.into()),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::ValidationFailed, message)
    }

    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::NotConfigured, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::Internal, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => ApiErrorCode::NotFound,
            std::io::ErrorKind::PermissionDenied => ApiErrorCode::PermissionDenied,
            std::io::ErrorKind::TimedOut => ApiErrorCode::Timeout,
            _ => ApiErrorCode::Internal,
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::MalformedManifest(_) => ApiError::validation(err.to_string()),
            Error::RemoteError(_) | Error::Network(_) => {
                ApiError::new(ApiErrorCode::NetworkError, err.to_string())
            }
            Error::Timeout(_) => ApiError::new(ApiErrorCode::Timeout, err.to_string()),
            Error::CorruptArchive(_) => ApiError::new(ApiErrorCode::ArchiveError, err.to_string()),
            Error::InvalidTarget(path) => ApiError::with_details(
                ApiErrorCode::SecurityViolation,
                "Target resolves outside the library root",
                path,
            ),
            Error::Io(io) => ApiError::from(io),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(domain) => ApiError::from(domain),
            Err(other) => ApiError::internal(format!("{:#}", other)),
        }
    }
}

/// Result type alias for host operations
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Converts `ApiResult<T>` into the `Result<T, String>` shape the UI bridge expects
pub trait ToHostError<T> {
    fn to_host_error(self) -> std::result::Result<T, String>;
}

impl<T> ToHostError<T> for ApiResult<T> {
    fn to_host_error(self) -> std::result::Result<T, String> {
        self.map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::new(ApiErrorCode::Internal, "Something went wrong");
        let display = format!("{}", err);
        assert!(display.contains("internal"));
        assert!(display.contains("Something went wrong"));
    }

    #[test]
    fn test_error_with_details() {
        let err = ApiError::with_details(ApiErrorCode::NotFound, "Map not found", "abc (x - y)");
        assert_eq!(err.code, ApiErrorCode::NotFound);
        assert_eq!(err.details, Some("abc (x - y)".to_string()));
    }

    #[test]
    fn test_domain_error_mapping() {
        let api: ApiError = Error::InvalidTarget("../outside".into()).into();
        assert_eq!(api.code, ApiErrorCode::SecurityViolation);
        assert_eq!(api.details.as_deref(), Some("../outside"));

        let api: ApiError = Error::RemoteError(404).into();
        assert_eq!(api.code, ApiErrorCode::NetworkError);
        assert!(api.message.contains("404"));

        let api: ApiError = Error::Timeout(Duration::from_millis(200)).into();
        assert_eq!(api.code, ApiErrorCode::Timeout);
        assert!(api.message.contains("200ms"));

        let api: ApiError = Error::CorruptArchive("bad header".into()).into();
        assert_eq!(api.code, ApiErrorCode::ArchiveError);

        let api: ApiError = Error::MalformedManifest("not an object".into()).into();
        assert_eq!(api.code, ApiErrorCode::ValidationFailed);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let api_err: ApiError = io_err.into();
        assert_eq!(api_err.code, ApiErrorCode::NotFound);
    }

    #[test]
    fn test_anyhow_downcasts_domain_errors() {
        let err = anyhow::Error::from(Error::InvalidTarget("a/../../b".into()));
        let api: ApiError = err.into();
        assert_eq!(api.code, ApiErrorCode::SecurityViolation);

        let api: ApiError = anyhow::anyhow!("config is unreadable").into();
        assert_eq!(api.code, ApiErrorCode::Internal);
    }

    #[test]
    fn test_serialization() {
        let err = ApiError::validation("test error");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("validation_failed"));
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_to_host_error() {
        let ok: ApiResult<i32> = Ok(42);
        assert_eq!(ok.to_host_error().unwrap(), 42);

        let err: ApiResult<i32> = Err(ApiError::not_configured("no root"));
        assert!(err.to_host_error().unwrap_err().contains("not_configured"));
    }
}
