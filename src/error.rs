//! Error types for the backup generator

use std::path::PathBuf;
use thiserror::Error;

/// Authentication failures. None of these are retried.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The bearer token was rejected by the API (HTTP 401)
    #[error(
        "Dropbox authentication failed (401). Your token may be invalid or expired. \
         Generate a new token at https://www.dropbox.com/developers/apps"
    )]
    Unauthorized,
    /// The token endpoint rejected a refresh-token request
    #[error("token refresh failed (HTTP {status}): {body}. Check your app key, app secret, and refresh token")]
    RefreshRejected { status: u16, body: String },
    /// The token endpoint rejected an authorization code
    #[error("code exchange failed (HTTP {status}): {body}")]
    ExchangeRejected { status: u16, body: String },
    /// The token endpoint answered 200 without the expected token
    #[error("empty {0} in token response")]
    MissingToken(&'static str),
}

/// Errors returned by the remote API client
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Any non-success status other than 401 and 429
    #[error("Dropbox API error {status} on {endpoint}: {body}")]
    Status {
        status: u16,
        endpoint: String,
        body: String,
    },
    /// The request never produced a response
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },
    /// The response body could not be decoded
    #[error("failed to decode {context} response: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// The response decoded but lacked a required field
    #[error("empty {0} in response")]
    MissingField(&'static str),
    /// The shared cancellation token fired
    #[error("operation cancelled")]
    Cancelled,
}

impl ApiError {
    /// Whether the failure requires re-authentication
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth(_))
    }
}

/// Error kinds that can occur during the local walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanErrorKind {
    /// Permission denied when accessing a file or directory
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// I/O error during traversal
    IoError,
    /// Symlink loop or other traversal failure
    Traversal,
}

/// A filesystem walk failure. Aborts the scan.
#[derive(Debug, Error)]
#[error("{kind:?}: {message} (path: {path:?})")]
pub struct ScanError {
    /// The kind of error
    pub kind: ScanErrorKind,
    /// The path where the error occurred
    pub path: Option<PathBuf>,
    /// Human-readable error message
    pub message: String,
}

impl ScanError {
    /// Create a new scan error
    pub fn new(kind: ScanErrorKind, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(path: PathBuf) -> Self {
        Self::new(
            ScanErrorKind::NotFound,
            Some(path.clone()),
            format!("Not found: {:?}", path),
        )
    }
}

impl From<walkdir::Error> for ScanError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf());
        let kind = match err.io_error().map(|e| e.kind()) {
            Some(std::io::ErrorKind::PermissionDenied) => ScanErrorKind::PermissionDenied,
            Some(std::io::ErrorKind::NotFound) => ScanErrorKind::NotFound,
            Some(_) => ScanErrorKind::IoError,
            None => ScanErrorKind::Traversal,
        };
        Self::new(kind, path, err.to_string())
    }
}

/// Per-file extraction failure. Recorded against one item only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// The tag library could not open or parse the file
    #[error("unreadable audio file: {0}")]
    Unreadable(String),
    /// The extraction call panicked
    #[error("tag reader panicked: {0}")]
    Panicked(String),
}

/// Tag cache failures. Never fatal to a run.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of one worker-pool slot that did not produce a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError<E> {
    /// The item function returned an error
    #[error("{0}")]
    Failed(E),
    /// The item function panicked
    #[error("task panicked: {0}")]
    Panicked(String),
    /// Cancellation fired before the item was issued
    #[error("task not started: cancelled")]
    Cancelled,
}

/// Run-level error surfaced to the operator
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("scanning local directory: {0}")]
    Scan(#[from] ScanError),
    #[error("worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error in {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("interrupted")]
    Cancelled,
}

impl Error {
    /// Wrap an I/O error with a short description of what was attempted
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_is_auth() {
        let err: ApiError = AuthError::Unauthorized.into();
        assert!(err.is_auth());
        assert!(err.to_string().contains("401"));

        let err = ApiError::Status {
            status: 500,
            endpoint: "/files/list_folder".to_string(),
            body: "oops".to_string(),
        };
        assert!(!err.is_auth());
        assert_eq!(
            err.to_string(),
            "Dropbox API error 500 on /files/list_folder: oops"
        );
    }

    #[test]
    fn test_task_error_display() {
        let err: TaskError<ExtractionError> =
            TaskError::Failed(ExtractionError::Unreadable("bad header".to_string()));
        assert_eq!(err.to_string(), "unreadable audio file: bad header");
        assert_eq!(
            TaskError::<ExtractionError>::Cancelled.to_string(),
            "task not started: cancelled"
        );
    }
}
