//! Error types shared by the composer, the pipe runtime and middleware.

use thiserror::Error;

/// Errors raised while composing or running an effect's middleware chain
///
/// Composer misuse (`EmptyStack`, `NextCalledMultipleTimes`) is a programming
/// error and is never caught internally. `Aborted` is the distinguished
/// cancellation outcome; check [`PipeError::is_aborted`] to tell it apart from
/// a genuine failure.
#[derive(Error, Debug)]
pub enum PipeError {
    /// `compose` was given no middleware
    #[error("Middleware stack must not be empty")]
    EmptyStack,

    /// A middleware invoked its `next` continuation a second time
    #[error("next() called multiple times")]
    NextCalledMultipleTimes,

    /// The operation was cancelled through its cancellation token
    #[error("aborted")]
    Aborted,

    /// A cancelable operation was dropped without ever settling
    #[error("operation abandoned before it settled")]
    Abandoned,

    /// A request-shaped middleware ran before `ctx.request` was initialised
    #[error("ctx.request does not exist")]
    MissingRequest,

    /// An effect built for one state type was dispatched into a store of another
    #[error("effect `{0}` was dispatched into a store with a different state type")]
    StoreMismatch(String),

    /// No tokio runtime was available to drive the effect
    #[error("no async runtime available to run effect `{0}`")]
    NoRuntime(String),

    /// The task driving an effect panicked or was cancelled by the runtime
    #[error("effect task failed: {0}")]
    TaskFailed(String),

    /// Base64 or UTF-8 decoding failed
    #[error("invalid encoding: {0}")]
    Encoding(String),

    /// Payload (de)serialization failed
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Application failure raised by a middleware
    #[error("{0}")]
    Handler(String),

    /// Any other error surfaced by caller-supplied middleware
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipeError {
    /// Build an application-level failure from a message
    #[must_use]
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// Whether this error is the cancellation outcome
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// Result of running a middleware
pub type MiddlewareResult = Result<(), PipeError>;
