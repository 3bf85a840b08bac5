//! Handler error type.

/// Boxed error used for cancellation reasons and handler error sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result returned by every event handler.
pub type HandlerResult = Result<(), HandlerError>;

/// A handler failed while an event was being dispatched.
///
/// Handler failures are non-fatal: the dispatcher logs them, records them in
/// the [`Dispatch`](crate::Dispatch) outcome and moves on to the next handler.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl HandlerError {
    /// Create a handler error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a handler error wrapping an underlying error.
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The human-readable failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
