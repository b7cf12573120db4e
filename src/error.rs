use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A malformed or missing field in a library response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to parse `{field}`: {reason}")]
pub struct ParseError {
    pub field: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, "field is missing")
    }
}

/// Failures local to one request or one library item. None of them aborts a sync.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Failed to fetch {context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: BoxError,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Timed out waiting for {operation} after {after:?}")]
    Timeout { operation: String, after: Duration },
    #[error("Request for {operation} was cancelled")]
    Cancelled { operation: String },
}

impl SyncError {
    pub fn transport(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transport {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Maps a reqwest failure, keeping client-side timeouts distinct from other transport errors.
    pub fn from_reqwest(context: impl Into<String>, timeout: Duration, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                operation: context.into(),
                after: timeout,
            }
        } else if error.is_decode() {
            Self::Parse(ParseError::new(context, error.to_string()))
        } else {
            Self::transport(context, error)
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
