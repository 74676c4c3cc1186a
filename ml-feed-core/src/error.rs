//! Error types for the in-memory batch feeder

use std::io;
use thiserror::Error;

/// Result type for feeder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of an [`Error`]
///
/// Callers use this to decide whether a failure is worth retrying: input-shape
/// errors are fixed by the caller, protocol violations usually clear once the
/// consumer drains the pending batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad batch descriptor or config source
    Configuration,
    /// Operation called in the wrong feeder state
    Protocol,
    /// Malformed input sequence or buffer
    InputShape,
    /// Failure inside the transform collaborator
    Transformation,
    /// Memory budget or lock failure
    Resource,
}

/// Error type for feeder operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error while loading configuration
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Batch descriptor rejected at setup or batch-size change
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration source could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Injection, reset or batch-size change while a batch is still pending
    #[error("Previous batch not yet consumed: {operation} rejected")]
    PendingData {
        /// The rejected operation
        operation: &'static str,
    },

    /// Consumption before any batch was installed
    #[error("Feeder must be initialized before use: no batch has been installed")]
    NotInitialized,

    /// A batch descriptor outlived the buffer contents it pointed into
    #[error("Stale batch view: issued at version {issued}, buffer is at version {current}")]
    StaleView {
        /// Version the batch was issued at
        issued: u64,
        /// Current buffer version
        current: u64,
    },

    /// Empty input sequence
    #[error("No samples to add")]
    NoSamples,

    /// Sample count is not a multiple of the batch size
    #[error("Count must be a multiple of batch size: got {count}, batch size {batch_size}")]
    NotBatchMultiple {
        /// Number of samples supplied
        count: usize,
        /// Configured batch size
        batch_size: usize,
    },

    /// Label sequence length differs from the sample sequence length
    #[error("Label count mismatch: {samples} samples, {labels} labels")]
    LabelCountMismatch {
        /// Number of samples supplied
        samples: usize,
        /// Number of labels supplied
        labels: usize,
    },

    /// Buffer handed to reset was empty
    #[error("Empty {0} buffer passed to reset")]
    EmptyBuffer(&'static str),

    /// Data buffer length does not match label count times sample size
    #[error("Buffer length mismatch: expected {expected} data values, got {actual}")]
    BufferLengthMismatch {
        /// Expected number of values
        expected: usize,
        /// Actual number of values
        actual: usize,
    },

    /// Transformation error
    #[error("Transformation error: {0}")]
    TransformationError(String),

    /// Memory budget exceeded
    #[error("Memory budget exceeded: requested {requested} bytes, available {available} bytes")]
    MemoryBudgetExceeded {
        /// Requested memory in bytes
        requested: usize,
        /// Available memory in bytes
        available: usize,
    },

    /// A lock guarding shared feeder state was poisoned
    #[error("Feeder lock poisoned")]
    LockPoisoned,
}

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::InvalidConfig(_) | Error::ConfigParse(_) => {
                ErrorKind::Configuration
            }
            Error::PendingData { .. } | Error::NotInitialized | Error::StaleView { .. } => {
                ErrorKind::Protocol
            }
            Error::NoSamples
            | Error::NotBatchMultiple { .. }
            | Error::LabelCountMismatch { .. }
            | Error::EmptyBuffer(_)
            | Error::BufferLengthMismatch { .. } => ErrorKind::InputShape,
            Error::TransformationError(_) => ErrorKind::Transformation,
            Error::MemoryBudgetExceeded { .. } | Error::LockPoisoned => ErrorKind::Resource,
        }
    }

    /// Whether the caller can retry after draining or fixing its input
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InputShape | ErrorKind::Protocol | ErrorKind::Transformation
        )
    }
}
