//! Error categorization for the invocation pipeline.
//!
//! Every failure that crosses an [`Invoker`](crate::invoke::Invoker) is
//! categorized so middleware can decide locally whether to try again:
//! - Permanent: malformed request, authorization failure, resource not found
//! - RateLimited: the server asked the client to back off for a given duration
//! - Transient: network or timeout class failure that may succeed on retry
//! - Cancelled: external cancellation, never retried and never logged as an error

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Category of an invocation failure for retry decision-making.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Retrying will never help.
    Permanent,
    /// Server-issued backpressure; retry after the carried wait.
    RateLimited,
    /// May succeed on a later attempt (connection reset, timeout, 5xx).
    Transient,
    /// Propagated from an external cancellation signal.
    Cancelled,
}

/// Longest server-requested wait honoured; larger requests are clamped.
pub const MAX_FLOOD_WAIT: Duration = Duration::from_secs(24 * 60 * 60);
/// Wait applied to a 429 that does not say how long to back off.
pub const DEFAULT_FLOOD_WAIT: Duration = Duration::from_secs(1);

/// Error object as reported by the remote service.
///
/// Code `0` marks failures raised by the client itself (e.g. a stopped
/// flood-control gate or an undecodable reply).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    /// Explicit `retry_after` seconds, when the server sends one out of band.
    pub retry_after: Option<u64>,
}

impl RpcError {
    const FLOOD_WAIT_PREFIXES: [&'static str; 3] =
        ["FLOOD_WAIT_", "FLOOD_PREMIUM_WAIT_", "SLOWMODE_WAIT_"];

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Failure raised locally rather than by the server.
    pub fn local(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Wait requested by the server, if this is a flood-control error.
    ///
    /// Waits are capped at [`MAX_FLOOD_WAIT`]. A 429 that names no wait
    /// still backs off for [`DEFAULT_FLOOD_WAIT`].
    pub fn flood_wait(&self) -> Option<Duration> {
        let seconds = match self.retry_after {
            Some(seconds) => Some(seconds),
            None if self.code == 420 || self.code == 429 => self.wait_from_message(),
            None => return None,
        };
        match seconds {
            Some(seconds) => Some(Duration::from_secs(seconds).min(MAX_FLOOD_WAIT)),
            None if self.code == 429 => Some(DEFAULT_FLOOD_WAIT),
            None => None,
        }
    }

    /// Seconds from `FLOOD_WAIT_<n>` style messages or a trailing `retry after <n>`.
    fn wait_from_message(&self) -> Option<u64> {
        let secs = Self::FLOOD_WAIT_PREFIXES
            .iter()
            .find_map(|prefix| self.message.strip_prefix(prefix))
            .or_else(|| self.message.rsplit_once("retry after ").map(|(_, secs)| secs))?
            .trim();
        if secs.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // Digits beyond u64 still mean "a very long time".
        Some(secs.parse().unwrap_or(u64::MAX))
    }

    /// Map a server error onto the invocation taxonomy.
    pub fn into_invoke_error(self) -> InvokeError {
        if let Some(wait) = self.flood_wait() {
            return InvokeError::RateLimited(wait);
        }
        if self.code >= 500 {
            return InvokeError::Transient(self.to_string());
        }
        InvokeError::Permanent(self)
    }
}

/// Outcome of a failed [`Invoker::invoke`](crate::invoke::Invoker::invoke).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("{0}")]
    Permanent(RpcError),
    #[error("rate limited by server, retry after {0:?}")]
    RateLimited(Duration),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl InvokeError {
    pub fn permanent(message: impl Into<String>) -> Self {
        InvokeError::Permanent(RpcError::local(message))
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            InvokeError::Permanent(_) => ErrorCategory::Permanent,
            InvokeError::RateLimited(_) => ErrorCategory::RateLimited,
            InvokeError::Transient(_) => ErrorCategory::Transient,
            InvokeError::Cancelled => ErrorCategory::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, InvokeError::Cancelled)
    }

    /// Server-requested wait carried by a rate-limit failure.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            InvokeError::RateLimited(wait) => Some(*wait),
            _ => None,
        }
    }

    /// Server error code, when the failure came from the remote side.
    pub fn rpc_code(&self) -> Option<i32> {
        match self {
            InvokeError::Permanent(err) if err.code != 0 => Some(err.code),
            _ => None,
        }
    }
}

/// Categorize an IO error raised underneath the transport.
pub fn categorize_io_error(err: &io::Error) -> ErrorCategory {
    match err.kind() {
        io::ErrorKind::TimedOut
        | io::ErrorKind::Interrupted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::WouldBlock => ErrorCategory::Transient,

        // Unknown errors - default to permanent to avoid retry loops
        _ => ErrorCategory::Permanent,
    }
}

impl From<io::Error> for InvokeError {
    fn from(err: io::Error) -> Self {
        match categorize_io_error(&err) {
            ErrorCategory::Transient => InvokeError::Transient(err.to_string()),
            _ => InvokeError::permanent(err.to_string()),
        }
    }
}

/// Failure of an upload session.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("part size {0} is invalid: must be a positive multiple of 1024 dividing 524288")]
    InvalidPartSize(usize),
    #[error("cannot upload an empty file")]
    Empty,
    #[error("file of {size} bytes needs {parts} parts, limit is {max}")]
    TooLarge { size: u64, parts: u64, max: u64 },
    #[error("read part {index}: {source}")]
    Read {
        index: u64,
        #[source]
        source: io::Error,
    },
    #[error("upload part {index}: {source}")]
    Part {
        index: u64,
        #[source]
        source: InvokeError,
    },
    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

impl UploadError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            UploadError::Part { source, .. } | UploadError::Invoke(source) => {
                source.is_cancelled()
            }
            _ => false,
        }
    }
}
