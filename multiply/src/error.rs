//! Error types for gain processing.

use std::fmt;

use thiserror::Error;

/// Error returned by a completion callback.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid gain at creation, or an unusable format at queueing time.
    #[error("multiply: configuration error: {0}")]
    Configuration(String),

    /// A scaling job is already in flight for this processor.
    #[error("multiply: already doing work")]
    Busy,

    /// `feed` was called before any format was queued.
    #[error("multiply: no format set")]
    NoFormat,

    /// The completion callback could not be invoked. Processor state has
    /// already been committed when this is reported.
    #[error("multiply: failed to invoke completion callback: {0}")]
    Invocation(String),

    #[error("multiply: invalid processor handle")]
    InvalidHandle,

    #[error("multiply: event loop closed")]
    Closed,

    #[error("multiply: worker pool: {0}")]
    Runtime(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A rejected `feed`. Hands the buffer back so the caller keeps ownership.
pub struct FeedError<B> {
    error: Error,
    buffer: B,
}

impl<B> FeedError<B> {
    pub(crate) fn new(error: Error, buffer: B) -> Self {
        Self { error, buffer }
    }

    /// Returns the reason the buffer was rejected.
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Returns the rejected buffer.
    pub fn into_buffer(self) -> B {
        self.buffer
    }

    pub fn into_parts(self) -> (Error, B) {
        (self.error, self.buffer)
    }
}

impl<B> fmt::Debug for FeedError<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<B> fmt::Display for FeedError<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<B> std::error::Error for FeedError<B> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<B> From<FeedError<B>> for Error {
    fn from(e: FeedError<B>) -> Self {
        e.error
    }
}
