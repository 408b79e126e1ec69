use serde::Deserialize;
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// The presented token is missing, expired or was rejected by the server.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A valid session that lacks the required role.
    #[error("Access restricted: {0}")]
    Forbidden(String),

    /// A resource not found error.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The bounded request timeout elapsed.
    #[error("Request timed out")]
    Timeout,

    /// A network or protocol failure before a response was received.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Any other non-success response from the server.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// A local validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A success response whose body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A transfer job was asked to make a transition it cannot make.
    #[error("Invalid transfer state: {0}")]
    InvalidState(String),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Coarse classification of an [`AppError`], recorded on failed transfer jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Authentication,
    Forbidden,
    Timeout,
    Transport,
    Server,
    NotFound,
    Local,
}

impl AppError {
    /// Returns the failure classification for this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            AppError::Authentication(_) => FailureKind::Authentication,
            AppError::Forbidden(_) => FailureKind::Forbidden,
            AppError::Timeout => FailureKind::Timeout,
            AppError::Transport(_) => FailureKind::Transport,
            AppError::Server { .. } | AppError::Decode(_) => FailureKind::Server,
            AppError::NotFound(_) => FailureKind::NotFound,
            AppError::Validation(_) | AppError::InvalidState(_) | AppError::Io(_) => {
                FailureKind::Local
            }
        }
    }

    /// Whether this error is the distinguishable "timed out" failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AppError::Timeout)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Timeout
        } else if e.is_decode() {
            AppError::Decode(e.to_string())
        } else {
            AppError::Transport(e.to_string())
        }
    }
}

impl From<sonic_rs::Error> for AppError {
    fn from(e: sonic_rs::Error) -> Self {
        AppError::Decode(e.to_string())
    }
}

impl From<garde::Report> for AppError {
    fn from(report: garde::Report) -> Self {
        AppError::Validation(report.to_string().trim().to_string())
    }
}

/// The server's error payload. Its shape is not fixed, so every field is optional.
#[derive(Deserialize, Default)]
struct ErrorBody {
    error: Option<String>,
    mensaje: Option<String>,
    message: Option<String>,
}

/// Extracts a human-readable message from an error response body.
pub(crate) fn server_message(status: u16, body: &[u8]) -> String {
    let parsed: ErrorBody = sonic_rs::from_slice(body).unwrap_or_default();

    parsed
        .error
        .or(parsed.mensaje)
        .or(parsed.message)
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("request failed with status {}", status))
}

/// Maps a non-success HTTP status (other than 401) to an `AppError`.
pub(crate) fn from_status(status: u16, body: &[u8]) -> AppError {
    let message = server_message(status, body);
    match status {
        401 => AppError::Authentication(message),
        403 => AppError::Forbidden(message),
        404 => AppError::NotFound(message),
        _ => AppError::Server { status, message },
    }
}
