//! Service-level failure type.

use thiserror::Error;

/// Failure delivered to observers when a phase does not complete.
///
/// A code plus a human-readable message. Callers attach their own positive
/// codes when failing a phase; negative codes are reserved for failures the
/// scheduler records itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("service error {code}: {message}")]
pub struct ServiceError {
    code: i32,
    message: String,
}

impl ServiceError {
    /// Code recorded when a phase body panics or aborts.
    pub const INTERNAL: i32 = -1;

    /// Code recorded when a phase payload has an unexpected type.
    pub const PAYLOAD_MISMATCH: i32 = -2;

    /// Creates an error with a caller-defined code.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates an error with the [`INTERNAL`](Self::INTERNAL) code.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL, message)
    }

    /// Creates an error with the
    /// [`PAYLOAD_MISMATCH`](Self::PAYLOAD_MISMATCH) code.
    pub fn payload_mismatch(message: impl Into<String>) -> Self {
        Self::new(Self::PAYLOAD_MISMATCH, message)
    }

    /// The numeric failure code.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// The human-readable description.
    pub fn message(&self) -> &str {
        &self.message
    }
}
