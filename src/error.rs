//! Error taxonomy shared by every wrapper in the crate.
//!
//! A bounded wait that expires is not an error: enqueue/pop report it as
//! `Ok(false)` / `Ok(None)` and the native layer as [`crate::native::WaitResult::Timeout`].

use crate::handle::HandleKind;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Attempted to wrap or duplicate a null/invalid native reference.
    #[error("invalid {0} handle")]
    InvalidHandle(HandleKind),

    /// Operation on a resource whose disposal already completed.
    #[error("{0} has been disposed")]
    ObjectDisposed(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The native inference/record/playback call reported an unrecoverable failure.
    #[error("native pipeline failed: {0}")]
    PipelineFailed(String),

    /// Sequential read reached its natural end, or the tracking queue drained after shutdown.
    #[error("end of stream")]
    EndOfStream,

    #[error("cannot seek {path} to {offset_usec} us from {origin}")]
    SeekFailed {
        path: String,
        offset_usec: i64,
        origin: String,
    },

    #[error("recording {path}: {message}")]
    Recording { path: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn disposed(what: impl std::fmt::Display) -> Self {
        Error::ObjectDisposed(what.to_string())
    }

    pub(crate) fn pipeline(msg: impl Into<String>) -> Self {
        Error::PipelineFailed(msg.into())
    }

    pub(crate) fn recording(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Recording {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for outcomes a capture loop should treat as a normal end rather than abort on.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::EndOfStream)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
