//! Graph Stores
//!
//! A store accepts a whole [`WriteBatch`] and commits every operation in it
//! or none of them.

pub mod bolt;
pub mod memory;
pub mod rest;

use crate::batch::{BatchPosition, WriteBatch};
use crate::error::StoreError;

/// Outcome of one queued operation after a successful submit
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub position: BatchPosition,
    /// Store location of the entity, when the store reports one
    pub location: Option<String>,
}

pub trait GraphStore {
    /// Submit the batch atomically. Results are in batch order.
    async fn submit(&self, batch: &WriteBatch) -> Result<Vec<OperationResult>, StoreError>;
}

impl<S: GraphStore> GraphStore for &S {
    async fn submit(&self, batch: &WriteBatch) -> Result<Vec<OperationResult>, StoreError> {
        (**self).submit(batch).await
    }
}

/// Store chosen at runtime from the command line
pub enum StoreBackend {
    Rest(rest::RestBatchStore),
    Bolt(bolt::BoltStore),
    Memory(memory::MemoryStore),
}

impl StoreBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Rest(_) => "rest",
            StoreBackend::Bolt(_) => "bolt",
            StoreBackend::Memory(_) => "memory",
        }
    }
}

impl GraphStore for StoreBackend {
    async fn submit(&self, batch: &WriteBatch) -> Result<Vec<OperationResult>, StoreError> {
        match self {
            StoreBackend::Rest(store) => store.submit(batch).await,
            StoreBackend::Bolt(store) => store.submit(batch).await,
            StoreBackend::Memory(store) => store.submit(batch).await,
        }
    }
}
