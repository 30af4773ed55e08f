//! Unified error type for the framework, mirroring the kind/response-mapping
//! split used throughout the corpus (`ApiError` in the teacher, `masterror`'s
//! `AppErrorKind`).

use http::StatusCode;
use thiserror::Error;

/// The four error kinds named in the request task state machine.
#[derive(Debug, Error)]
pub enum FrameworkError {
    /// A contract violation by the code calling this crate: write-after-write,
    /// a double `write_error`, a dispatcher refusing a response, a redirect
    /// with a non-redirect status, and so on. These are bugs, not runtime
    /// conditions, and the task's panic trap is the only place that handles
    /// them.
    #[error("programmer error: {detail}")]
    Programmer { detail: String },

    /// A malformed or disallowed client request: wrong method, unsupported
    /// media type, unparsable body.
    #[error("client error ({status}): {reason}")]
    Client { status: StatusCode, reason: String },

    /// A failure while producing a response that the client could not have
    /// caused: template execution, JSON encoding, dispatcher write failure.
    #[error("server error: {detail}")]
    Server { detail: String },

    /// A local, recoverable contract violation on a single operation (a bad
    /// cookie name, a write to a claimed header) that does not abort the
    /// request.
    #[error("invariant violated: {detail}")]
    Invariant { detail: String },
}

impl FrameworkError {
    pub fn programmer(detail: impl Into<String>) -> Self {
        FrameworkError::Programmer {
            detail: detail.into(),
        }
    }

    pub fn client(status: StatusCode, reason: impl Into<String>) -> Self {
        FrameworkError::Client {
            status,
            reason: reason.into(),
        }
    }

    pub fn server(detail: impl Into<String>) -> Self {
        FrameworkError::Server {
            detail: detail.into(),
        }
    }

    pub fn invariant(detail: impl Into<String>) -> Self {
        FrameworkError::Invariant {
            detail: detail.into(),
        }
    }

    /// The status this error would be reported under if it reached the wire
    /// directly (used by the report collector; the task's own error path has
    /// its own status handling).
    pub fn status(&self) -> StatusCode {
        match self {
            FrameworkError::Programmer { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            FrameworkError::Client { status, .. } => *status,
            FrameworkError::Server { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            FrameworkError::Invariant { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The error type returned by [`crate::dispatcher::Dispatcher`] operations.
/// Kept distinct from [`FrameworkError`] because a dispatch failure is a
/// `ServerError` as far as the task is concerned but callers implementing a
/// `Dispatcher` should not have to know about the wider error taxonomy.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DispatchError(pub String);

impl DispatchError {
    pub fn new(detail: impl Into<String>) -> Self {
        DispatchError(detail.into())
    }
}

impl From<DispatchError> for FrameworkError {
    fn from(err: DispatchError) -> Self {
        FrameworkError::server(err.0)
    }
}
