//! Error handling types for reparse-scheduler
//!
//! This module provides the error types shared by the scheduler, the edit
//! coalescer and the update pipeline.

use std::sync::PoisonError;
use thiserror::Error;

/// Errors raised by the scheduler and the edit coalescer.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// An edit does not fit the mirrored document text
    #[error("Invalid edit at offset {offset} (removing {removed_len} of {text_len} bytes): {reason}")]
    InvalidEdit {
        offset: usize,
        removed_len: usize,
        text_len: usize,
        reason: &'static str,
    },

    /// The input was replaced after the snapshot was taken
    #[error("Snapshot of input generation {snapshot} superseded by generation {current}")]
    Superseded { snapshot: u64, current: u64 },

    /// Single-writer assumptions were broken; indicates a concurrency bug
    #[error("Invariant violation: {message}")]
    InvariantViolation { message: String },

    /// The session was disposed
    #[error("Session has been disposed")]
    Disposed,

    /// The worker thread could not be started
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    /// Create an invalid edit error
    pub fn invalid_edit(
        offset: usize,
        removed_len: usize,
        text_len: usize,
        reason: &'static str,
    ) -> Self {
        SchedulerError::InvalidEdit {
            offset,
            removed_len,
            text_len,
            reason,
        }
    }

    /// Create an invariant violation error
    pub fn invariant(message: impl Into<String>) -> Self {
        SchedulerError::InvariantViolation {
            message: message.into(),
        }
    }
}

/// Failure reported by a syntax model when it rejects a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// The text could not be parsed; the previous model stays installed
    #[error("Parse failure at byte {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// The model refused the edits for another reason
    #[error("Model rejected update: {0}")]
    Rejected(String),
}

impl ModelError {
    /// Create a parse failure
    pub fn parse(offset: usize, message: impl Into<String>) -> Self {
        ModelError::Parse {
            offset,
            message: message.into(),
        }
    }

    /// Create a generic rejection
    pub fn rejected(message: impl Into<String>) -> Self {
        ModelError::Rejected(message.into())
    }
}

/// Failure reported by a styling or outline renderer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Renderer failed: {message}")]
pub struct RenderError {
    pub message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        RenderError {
            message: message.into(),
        }
    }
}

/// Outcome of a task body that did not complete normally.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Helper trait to recover the guard from a poisoned lock.
///
/// A panicking task body is contained by the worker, so a poisoned mutex only
/// means some earlier holder panicked; the protected data is still usable.
pub trait LockResultExt<T> {
    /// Return the guard, logging which operation triggered the recovery.
    fn recover_poison(self, context: &str) -> T;
}

impl<T> LockResultExt<T> for Result<T, PoisonError<T>> {
    fn recover_poison(self, context: &str) -> T {
        match self {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!(
                    target: "reparse_scheduler::lock_recovery",
                    "Recovered from poisoned lock in {}",
                    context
                );
                poisoned.into_inner()
            }
        }
    }
}
