use std::fmt;

/// One entry of a 422 validation response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Path to the offending field, e.g. `["body", "chunk_size"]`.
    pub loc: Vec<String>,
    pub message: String,
    pub kind: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.loc.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.loc.join("."), self.message)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    /// The request could not be built, e.g. a malformed content type.
    InvalidRequest,
    HttpStatus(u16),
    /// HTTP 422 with field-level details.
    Validation(Vec<FieldError>),
    Timeout,
    Network,
    Decode,
}

impl FailureKind {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FailureKind::HttpStatus(code) => Some(*code),
            FailureKind::Validation(_) => Some(422),
            _ => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::InvalidRequest => write!(f, "invalid request"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Validation(fields) => {
                write!(f, "validation failed ({} fields)", fields.len())
            }
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Decode => write!(f, "invalid response body"),
        }
    }
}

/// Transport-level failure of a REST call, or of a stream before it started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: FailureKind,
    pub message: String,
}

impl ApiError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match &self.kind {
            FailureKind::Validation(fields) => fields,
            _ => &[],
        }
    }
}

/// Failure reported through `StreamHandlers::on_error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The request failed or was rejected before any event arrived.
    #[error("stream request failed: {0}")]
    Transport(ApiError),
    /// The connection broke while reading the body.
    #[error("stream interrupted: {0}")]
    Read(ApiError),
    /// The server sent an explicit `error` event.
    #[error("{message}")]
    Server { message: String },
}
