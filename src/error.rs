//! Unified error handling for PrimForge
//!
//! One error type carries the whole status taxonomy of the library:
//! - Unimplemented: configuration outside this implementation's supported
//!   set; expected and non-fatal, drives capability-based dispatch
//! - InvalidArguments: malformed descriptor or execution context
//! - RuntimeError: kernel build, entry-point lookup, or launch failure
//! - OutOfMemory: device buffer allocation failure

use thiserror::Error;

/// Unified error type for PrimForge
#[derive(Error, Debug, Clone)]
pub enum PrimForgeError {
    /// Configuration not supported by this implementation.
    ///
    /// This is an expected outcome: the caller's dispatch layer is meant to
    /// try the next candidate implementation.
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// Malformed descriptor or execution context
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Kernel compilation, entry-point lookup, or launch failure.
    /// Terminal for the affected primitive instance; no internal retry.
    #[error("runtime error: {0}")]
    RuntimeError(String),

    /// Device buffer or kernel-resource allocation failure
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// Internal lock poisoned - this indicates a bug
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),
}

impl PrimForgeError {
    /// True for the expected "try the next implementation" outcome
    pub fn is_unimplemented(&self) -> bool {
        matches!(self, PrimForgeError::Unimplemented(_))
    }

    /// True for errors that abort the current primitive instance
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PrimForgeError::RuntimeError(_)
                | PrimForgeError::OutOfMemory(_)
                | PrimForgeError::LockPoisoned(_)
        )
    }
}

impl<T> From<std::sync::PoisonError<T>> for PrimForgeError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        PrimForgeError::LockPoisoned(err.to_string())
    }
}

/// Result alias used throughout the crate
pub type PrimResult<T> = std::result::Result<T, PrimForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unimplemented_is_not_fatal() {
        let err = PrimForgeError::Unimplemented("fp16 on this device".to_string());
        assert!(err.is_unimplemented());
        assert!(!err.is_fatal());
    }

    #[test]
    fn runtime_error_is_fatal() {
        let err = PrimForgeError::RuntimeError("compile failed".to_string());
        assert!(err.is_fatal());
        assert!(!err.is_unimplemented());
    }

    #[test]
    fn error_display() {
        let err = PrimForgeError::OutOfMemory("requested 1024 bytes".to_string());
        assert_eq!(err.to_string(), "out of memory: requested 1024 bytes");
    }
}
