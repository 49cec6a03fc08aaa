//! Error types for the streaming relay

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Error types that can occur while serving a stream request
#[derive(Error, Debug, Clone)]
pub enum RelayError {
    #[error("URL parameter is required")]
    MissingUrl,

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Not authorized to stream this video")]
    AccessDenied,

    #[error("Lecture not found")]
    LectureNotFound,

    #[error("Course not found")]
    CourseNotFound,

    #[error("Unsupported source type: {0}")]
    UnsupportedSource(String),

    #[error("Range start beyond resource size {total}")]
    UnsatisfiableRange { total: u64 },

    #[error("Upstream returned status {0}")]
    UpstreamStatus(u16),

    #[error("Upstream connection failed: {0}")]
    UpstreamConnect(String),

    #[error("Upstream request timed out")]
    UpstreamTimeout,

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Catalog error: {0}")]
    CatalogError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::IoError(err.to_string())
    }
}

impl RelayError {
    /// Convert error to the HTTP status code sent to the client.
    ///
    /// Upstream 4xx/5xx statuses are forwarded when they are valid
    /// client-facing statuses; anything else maps to 500. These mappings
    /// apply only while response headers have not yet been written - a
    /// mid-stream failure aborts the connection instead.
    pub fn to_http_status(&self) -> u16 {
        match self {
            RelayError::MissingUrl => 400,
            RelayError::InvalidUrl(_) => 400,

            RelayError::AuthRequired => 401,
            RelayError::AccessDenied => 403,

            RelayError::LectureNotFound => 404,
            RelayError::CourseNotFound => 404,

            RelayError::UnsupportedSource(_) => 415,
            RelayError::UnsatisfiableRange { .. } => 416,

            // Pass through upstream errors that are already client-facing
            RelayError::UpstreamStatus(status) if (400..600).contains(status) => *status,
            RelayError::UpstreamStatus(_) => 500,

            RelayError::UpstreamConnect(_) => 502,
            RelayError::UpstreamTimeout => 504,

            RelayError::Stream(_) => 500,
            RelayError::ConfigError(_) => 500,
            RelayError::CatalogError(_) => 500,
            RelayError::IoError(_) => 500,
            RelayError::InternalError(_) => 500,
        }
    }

    /// Whether this failure happened before any upstream connection was
    /// opened (client-side validation and authorization failures).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RelayError::MissingUrl
                | RelayError::InvalidUrl(_)
                | RelayError::AuthRequired
                | RelayError::AccessDenied
                | RelayError::LectureNotFound
                | RelayError::CourseNotFound
                | RelayError::UnsatisfiableRange { .. }
        )
    }
}
