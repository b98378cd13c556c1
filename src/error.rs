//! Error types for the committee tree system
//!
//! This module defines the error types used throughout the committee tree
//! system. The main error type is `CommitteeError`, which covers every typed
//! failure condition the core can surface: record ingestion, tree updates,
//! batch sequencing, root verification and dump export. No failure is
//! swallowed or auto-corrected; a `RootMismatch` or `CorruptTree` in
//! particular must propagate to the caller as a hard failure.

use thiserror::Error;

/// Main error type for the committee tree system
#[derive(Error, Debug)]
pub enum CommitteeError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error (JSON): {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    /// An input record row could not be parsed
    #[error("Malformed record at row {row}: {reason}")]
    MalformedRecord {
        /// Zero-based index of the offending row in the input.
        row: usize,
        /// Why the row was rejected.
        reason: String,
    },

    /// A key appeared more than once within a single record load
    #[error("Duplicate key {key} at row {row}")]
    DuplicateKey {
        /// The repeated key.
        key: u64,
        /// Zero-based index of the second occurrence.
        row: usize,
    },

    /// A key does not fit within the tree's address width
    #[error("Key {key} out of range for tree of height {height}")]
    KeyOutOfRange {
        /// The offending key.
        key: u64,
        /// The tree's address width in bits.
        height: u8,
    },

    /// An internal tree invariant was violated (child digest mismatch)
    #[error("Corrupt tree: {0}")]
    CorruptTree(String),

    /// A batch was applied out of sequence
    #[error("Out-of-order batch: expected batch {expected}, got batch {got}")]
    OutOfOrderBatch {
        /// The batch id the sequencer expected next.
        expected: u64,
        /// The batch id that was actually supplied.
        got: u64,
    },

    /// A batch id was re-applied with different operations
    #[error("Batch {batch_id} re-applied with conflicting operations")]
    BatchConflict {
        /// The conflicting batch id.
        batch_id: u64,
    },

    /// A dump or lookup referenced a subsystem the configuration does not define
    #[error("Unknown subsystem: {0}")]
    UnknownSubsystem(String),

    /// A locally computed root disagrees with an externally claimed root
    #[error("Root mismatch for batch {batch_id}: expected {expected}, computed {computed}")]
    RootMismatch {
        /// The batch whose root diverged.
        batch_id: u64,
        /// The externally claimed root (hex).
        expected: String,
        /// The locally recomputed root (hex).
        computed: String,
    },

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for operations that can fail with a [CommitteeError]
pub type Result<T> = std::result::Result<T, CommitteeError>;

impl CommitteeError {
    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        CommitteeError::InvalidInput(msg.into())
    }

    /// Create a new not found error
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        CommitteeError::NotFound(what.into())
    }

    /// Create a new malformed record error
    pub fn malformed_record<S: Into<String>>(row: usize, reason: S) -> Self {
        CommitteeError::MalformedRecord {
            row,
            reason: reason.into(),
        }
    }

    /// Create a new corrupt tree error
    pub fn corrupt_tree<S: Into<String>>(detail: S) -> Self {
        CommitteeError::CorruptTree(detail.into())
    }
}

impl From<std::num::TryFromIntError> for CommitteeError {
    fn from(err: std::num::TryFromIntError) -> Self {
        CommitteeError::invalid_input(format!("Integer conversion error: {}", err))
    }
}
