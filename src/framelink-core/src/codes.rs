//! Return codes shared by every protocol operation.
//!
//! Rust callers see [`PluginResult`]; integer callers see the [`ReturnCode`]
//! values, which are fixed by the protocol and must not change.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Integer outcome of a protocol operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ReturnCode {
    OpenFailed = -200,
    DestroyFailed = -199,
    InstanceNotFound = -198,
    SmallBuffer = -197,
    Error = -196,
    FrameNotReady = -195,
    Ok = 0,
}

impl ReturnCode {
    pub const ALL: [ReturnCode; 7] = [
        ReturnCode::OpenFailed,
        ReturnCode::DestroyFailed,
        ReturnCode::InstanceNotFound,
        ReturnCode::SmallBuffer,
        ReturnCode::Error,
        ReturnCode::FrameNotReady,
        ReturnCode::Ok,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Parses an integer code. Any value outside the protocol's set is `None`.
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|rc| i64::from(rc.code()) == code)
    }

    pub fn is_ok(self) -> bool {
        self == ReturnCode::Ok
    }

    pub fn class(self) -> Option<ErrorClass> {
        match self {
            ReturnCode::Ok => None,
            ReturnCode::InstanceNotFound | ReturnCode::SmallBuffer => Some(ErrorClass::Resource),
            ReturnCode::Error => Some(ErrorClass::Capability),
            ReturnCode::FrameNotReady => Some(ErrorClass::Transient),
            ReturnCode::OpenFailed | ReturnCode::DestroyFailed => Some(ErrorClass::Lifecycle),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReturnCode::OpenFailed => "open_failed",
            ReturnCode::DestroyFailed => "destroy_failed",
            ReturnCode::InstanceNotFound => "instance_not_found",
            ReturnCode::SmallBuffer => "small_buffer",
            ReturnCode::Error => "error",
            ReturnCode::FrameNotReady => "frame_not_ready",
            ReturnCode::Ok => "ok",
        }
    }
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

/// How a caller is expected to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Caller-correctable: retry with a live handle or a bigger buffer.
    Resource,
    /// The driver cannot do this at all. Not retryable.
    Capability,
    /// No data yet. Retry later or use the timed read.
    Transient,
    /// Stream construction or teardown failed.
    Lifecycle,
}

/// Failure outcome of a protocol operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("failed to open stream: {reason}")]
    OpenFailed { reason: String },
    #[error("failed to destroy stream: {reason}")]
    DestroyFailed { reason: String },
    #[error("no stream instance for handle {handle}")]
    InstanceNotFound { handle: i64 },
    #[error("buffer too small: need {required} bytes, have {available}")]
    SmallBuffer { required: usize, available: usize },
    #[error("frame not ready")]
    FrameNotReady,
    #[error("{message}")]
    Error { message: String },
}

pub type PluginResult<T> = Result<T, PluginError>;

impl PluginError {
    pub fn open_failed(reason: impl Into<String>) -> Self {
        Self::OpenFailed {
            reason: reason.into(),
        }
    }

    pub fn destroy_failed(reason: impl Into<String>) -> Self {
        Self::DestroyFailed {
            reason: reason.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Error for a capability the driver does not implement.
    pub fn unsupported(operation: &str) -> Self {
        Self::Error {
            message: format!("operation not supported: {operation}"),
        }
    }

    pub fn return_code(&self) -> ReturnCode {
        match self {
            PluginError::OpenFailed { .. } => ReturnCode::OpenFailed,
            PluginError::DestroyFailed { .. } => ReturnCode::DestroyFailed,
            PluginError::InstanceNotFound { .. } => ReturnCode::InstanceNotFound,
            PluginError::SmallBuffer { .. } => ReturnCode::SmallBuffer,
            PluginError::FrameNotReady => ReturnCode::FrameNotReady,
            PluginError::Error { .. } => ReturnCode::Error,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self.return_code().class() {
            Some(class) => class,
            None => ErrorClass::Capability,
        }
    }

    /// `FrameNotReady` is an expected outcome rather than a fault.
    pub fn is_transient(&self) -> bool {
        matches!(self, PluginError::FrameNotReady)
    }
}

/// Collapses a unit result into its return code.
pub fn status_of(result: &PluginResult<()>) -> ReturnCode {
    match result {
        Ok(()) => ReturnCode::Ok,
        Err(err) => err.return_code(),
    }
}
