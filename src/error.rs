//! Unified error handling for tensorserve
//!
//! Every failure in the engine, from registration through evaluation and
//! result extraction, is reported as a [`TensorServeError`]. Each variant maps
//! to one [`ErrorCategory`], which is what callers (and the HTTP layer) use to
//! decide how to surface it:
//! - AlreadyExists: duplicate tensor id
//! - NotFound: unresolved dependency or missing output
//! - InvalidArgument: bad shapes, ranks or payloads
//! - Unimplemented: operation not supported by the active backend
//! - Unavailable: resource exhaustion or backend initialization failure
//! - Internal: bugs and native execution failures

use std::fmt;
use std::time::Duration;

use crate::api::TensorId;

/// Unified error type for tensorserve
#[derive(Debug, thiserror::Error)]
pub enum TensorServeError {
    // ========== Registry Errors ==========
    /// Tensor id registered twice in the same scope
    #[error("tensor {0} already registered")]
    AlreadyExists(TensorId),

    /// Tensor id not present in the scope, or present but never computed
    #[error("tensor not found: {0}")]
    TensorNotFound(String),

    /// Requested output could not be ordered by the DAG builder
    #[error("tensor {0} could not be computed (unreachable in computation graph)")]
    Unreachable(TensorId),

    // ========== Argument Errors ==========
    /// Operand shapes or ranks rejected by an operation
    #[error("invalid tensor shape: {0}")]
    InvalidShape(String),

    /// Malformed tensor definition or request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid engine or server configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ========== Backend Errors ==========
    /// Operation or tensor layout the active backend does not support
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// Compute arena could not be reserved or is exhausted
    #[error("compute arena allocation failed: {0}")]
    ArenaAllocationFailed(String),

    /// Backend could not be brought up (worker pool, arena, ...)
    #[error("backend initialization failed: {0}")]
    BackendInitializationFailed(String),

    /// Caller stopped waiting for a calculation
    #[error("calculation timed out after {0:?}")]
    Timeout(Duration),

    /// Native graph execution failed
    #[error("graph execution failed: {0}")]
    ExecutionFailed(String),

    // ========== Internal Errors ==========
    /// Scope used after close
    #[error("scope closed")]
    ScopeClosed,

    /// Internal error (indicates a bug)
    #[error("internal error: {0}")]
    InternalError(String),
}

impl TensorServeError {
    /// Categorize the error for handling decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            TensorServeError::AlreadyExists(_) => ErrorCategory::AlreadyExists,

            TensorServeError::TensorNotFound(_) | TensorServeError::Unreachable(_) => {
                ErrorCategory::NotFound
            }

            TensorServeError::InvalidShape(_)
            | TensorServeError::InvalidRequest(_)
            | TensorServeError::InvalidConfiguration(_) => ErrorCategory::InvalidArgument,

            TensorServeError::Unimplemented(_) => ErrorCategory::Unimplemented,

            TensorServeError::ArenaAllocationFailed(_)
            | TensorServeError::BackendInitializationFailed(_)
            | TensorServeError::Timeout(_) => ErrorCategory::Unavailable,

            TensorServeError::ExecutionFailed(_)
            | TensorServeError::ScopeClosed
            | TensorServeError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// Errors caused by the request itself; resubmitting it unchanged fails again.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::AlreadyExists | ErrorCategory::NotFound | ErrorCategory::InvalidArgument
        )
    }

    /// Check if this error is recoverable (temporary condition)
    pub fn is_recoverable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Unavailable)
    }
}

/// Error taxonomy surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    AlreadyExists,
    NotFound,
    InvalidArgument,
    Unimplemented,
    Unavailable,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::AlreadyExists => "AlreadyExists",
            ErrorCategory::NotFound => "NotFound",
            ErrorCategory::InvalidArgument => "InvalidArgument",
            ErrorCategory::Unimplemented => "Unimplemented",
            ErrorCategory::Unavailable => "Unavailable",
            ErrorCategory::Internal => "Internal",
        };
        f.write_str(name)
    }
}

/// Helper type alias for Results using TensorServeError
pub type ServeResult<T> = std::result::Result<T, TensorServeError>;

/// Build an [`TensorServeError::InvalidShape`] from a format string
///
/// ```ignore
/// return Err(shape_error!("Add expects 1-D operands, got {:?}", shape));
/// ```
#[macro_export]
macro_rules! shape_error {
    ($msg:expr) => {
        $crate::error::TensorServeError::InvalidShape($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::TensorServeError::InvalidShape(format!($fmt, $($arg)*))
    };
}

/// Build an [`TensorServeError::InternalError`] from a format string
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::error::TensorServeError::InternalError($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::TensorServeError::InternalError(format!($fmt, $($arg)*))
    };
}
