//! Error types for the loader.
//!
//! - [`ParseError`] - a row could not be mapped onto the column layout
//! - [`BatchError`] - an operation could not be queued
//! - [`StoreError`] - the graph store refused or never received a batch
//! - [`ImportError`] - top-level failures of a load run

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    /// Row is shorter than the column layout requires.
    #[error("Row has {len} columns, column {index} is required")]
    MissingColumn { index: usize, len: usize },

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum BatchError {
    /// A relationship endpoint points at a position not queued yet.
    #[error("Batch position {position} is out of range for a batch of {len} operations")]
    DanglingReference { position: usize, len: usize },

    /// A relationship endpoint points at a relationship operation.
    #[error("Batch position {position} does not create a node")]
    NotANode { position: usize },

    #[error("Failed to build property map: {0}")]
    Properties(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// A create-or-fail index entry already exists.
    #[error("Uniqueness violation: {0}")]
    UniquenessViolation(String),

    /// The store answered but refused the batch.
    #[error("Batch rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("HTTP transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Bolt transport failed: {0}")]
    Bolt(#[from] neo4rs::Error),

    #[error("Failed to decode store response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The batch is internally inconsistent and was never sent.
    #[error("Invalid batch: {0}")]
    InvalidBatch(#[from] BatchError),
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to initialise row parser: {0}")]
    Setup(#[from] ParseError),

    #[error("Row {row}: {source}")]
    Row {
        row: u64,
        #[source]
        source: ParseError,
    },

    #[error("Failed to submit batch for rows {first_row}-{last_row}: {source}")]
    Submit {
        first_row: u64,
        last_row: u64,
        #[source]
        source: StoreError,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
