//! Error types for each pipeline concern.
//!
//! Every enum pairs a precise `Display` (for logs) with a
//! `user_message()` (for the terminal): the raw cause never reaches the
//! user, the display-ready sentence never loses the detail the log
//! needs. The pipeline downcasts to these types when mapping a stage
//! failure to its error event.

use thiserror::Error;

/// Failures while resolving a URL to a content handler.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("invalid URL format: {0}")]
    InvalidUrlFormat(String),

    #[error("no handler found for {0}")]
    NoHandlerFound(String),

    /// Phase-2 classification could not get an answer (page fetch or
    /// backend call failed).
    #[error("content classification failed: {0}")]
    ContentFetchFailed(String),
}

impl ClassifyError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidUrlFormat(_) => "That doesn't look like a valid URL.",
            Self::NoHandlerFound(_) => "This page type isn't supported yet.",
            Self::ContentFetchFailed(_) => {
                "Couldn't read the page to work out what it is. Try again in a moment."
            }
        }
    }
}

/// HTTP download failures.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server returned HTTP {0}")]
    Status(u16),
}

/// Failures inside a content handler's fetch step.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The page is reachable but a field the handler depends on is gone.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("content unavailable: {0}")]
    ContentUnavailable(String),
}

impl HandlerError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Fetch(FetchError::Status(_)) => {
                "The page couldn't be downloaded. It may be gone or blocking clients."
            }
            Self::Fetch(FetchError::Network(_)) => {
                "Couldn't reach the page. Check your connection and try again."
            }
            Self::MissingField(_) => {
                "The page didn't contain the information needed for this note."
            }
            Self::ContentUnavailable(_) => "This content isn't accessible.",
        }
    }
}

/// Failures from a generation backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("no generation backend configured")]
    NotConfigured,
}

impl BackendError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Auth(_) => "The AI provider rejected the request. Check your API key.",
            Self::Network(_) => {
                "Couldn't reach the AI provider. Check your connection and try again."
            }
            Self::Api { .. } => "The AI provider returned an error. Try again in a moment.",
            Self::InvalidResponse(_) => {
                "The AI provider sent an unexpected response. Try again."
            }
            Self::NotConfigured => {
                "No AI provider is configured. Set llm.provider in clipnote.toml."
            }
        }
    }
}

/// A handler rejected the generated output.
#[derive(Debug, Error)]
#[error("generated output failed validation")]
pub struct ValidationError;

/// Failures while persisting a note.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error(transparent)]
    Io(std::io::Error),
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied(err.to_string())
        } else {
            Self::Io(err)
        }
    }
}

impl SinkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => {
                "Permission denied writing to the notes folder. Check its permissions."
            }
            Self::Io(_) => "Couldn't write the note file.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_never_leak_the_cause() {
        let err = BackendError::Auth("sk-secret was rejected (HTTP 401)".to_string());
        assert!(!err.user_message().contains("sk-secret"));
        assert!(err.user_message().contains("API key"));

        let err = ClassifyError::InvalidUrlFormat("relative URL without a base".to_string());
        assert!(!err.user_message().contains("relative URL"));
    }

    #[test]
    fn fetch_errors_convert_into_handler_errors() {
        let err: HandlerError = FetchError::Status(404).into();
        assert!(matches!(err, HandlerError::Fetch(FetchError::Status(404))));
        assert!(err.user_message().contains("downloaded"));
    }

    #[test]
    fn io_errors_convert_into_sink_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: SinkError = io.into();
        assert!(matches!(err, SinkError::Io(_)));

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: SinkError = denied.into();
        assert!(matches!(err, SinkError::PermissionDenied(_)));
        assert!(err.user_message().contains("Permission denied"));
    }
}
