//! Write Batch
//!
//! A queued list of graph mutations submitted to the store as one atomic
//! unit. Nothing in a pending batch has a store id yet, so operations refer
//! to each other by their position in the batch. Every queueing call hands
//! back the [`BatchPosition`] of the operation it appended; relationships
//! are built from those handles.

use crate::error::BatchError;
use crate::record::AddressType;
use crate::schema::{EntityGroup, NodeIndex, RELATIONSHIP_INDEX_KEY};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

pub type Properties = BTreeMap<String, String>;

/// Flatten a record into node properties. `None` fields are omitted.
pub fn to_properties<T: Serialize>(value: &T) -> Result<Properties, BatchError> {
    let properties = match serde_json::to_value(value)? {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::Null => None,
                Value::String(s) => Some((key, s)),
                other => Some((key, other.to_string())),
            })
            .collect(),
        _ => Properties::new(),
    };
    Ok(properties)
}

// ============================================================================
// References
// ============================================================================

/// Offset of an operation inside its batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchPosition(usize);

impl BatchPosition {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for BatchPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0)
    }
}

/// Endpoint of a relationship: a node queued in this batch, or one the
/// store already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef {
    Pending(BatchPosition),
    Stored(i64),
}

impl From<BatchPosition> for NodeRef {
    fn from(position: BatchPosition) -> Self {
        NodeRef::Pending(position)
    }
}

/// `(index, key, value)` entry of a node or relationship index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexEntry {
    pub index: String,
    pub key: String,
    pub value: String,
}

/// Synthesised value that makes a relationship unique through an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey(String);

impl CompositeKey {
    /// `"<npi> <address_type> <target>"`
    pub fn address(npi: &str, address_type: AddressType, target: &str) -> Self {
        CompositeKey(format!("{} {} {}", npi, address_type.as_str(), target))
    }

    /// `"<npi> <entity><position>"`, position is 1-based within its group
    pub fn entity(npi: &str, group: EntityGroup, position: usize) -> Self {
        CompositeKey(format!("{} {}{}", npi, group.as_str(), position))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Operations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uniqueness {
    /// Return the indexed entity when one exists
    GetOrCreate,
    /// Fail the whole batch when the entry exists
    CreateOrFail,
}

impl Uniqueness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Uniqueness::GetOrCreate => "get_or_create",
            Uniqueness::CreateOrFail => "create_or_fail",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOperation {
    CreateNode {
        label: &'static str,
        properties: Properties,
    },
    CreateRelationship {
        start: NodeRef,
        rel_type: String,
        end: NodeRef,
    },
    IndexedNode {
        label: &'static str,
        entry: IndexEntry,
        uniqueness: Uniqueness,
        properties: Properties,
    },
    IndexedRelationship {
        entry: IndexEntry,
        start: NodeRef,
        rel_type: String,
        end: NodeRef,
    },
}

impl BatchOperation {
    pub fn creates_node(&self) -> bool {
        matches!(
            self,
            BatchOperation::CreateNode { .. } | BatchOperation::IndexedNode { .. }
        )
    }

    /// Relationship endpoints, empty for node operations
    pub fn endpoints(&self) -> Option<(NodeRef, NodeRef)> {
        match self {
            BatchOperation::CreateRelationship { start, end, .. }
            | BatchOperation::IndexedRelationship { start, end, .. } => Some((*start, *end)),
            _ => None,
        }
    }
}

// ============================================================================
// Batch
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    operations: Vec<BatchOperation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[BatchOperation] {
        &self.operations
    }

    pub fn positions(&self) -> impl Iterator<Item = BatchPosition> {
        (0..self.operations.len()).map(BatchPosition)
    }

    /// Position of the most recently appended operation
    pub fn cursor(&self) -> Option<BatchPosition> {
        self.operations.len().checked_sub(1).map(BatchPosition)
    }

    pub fn create_node(&mut self, label: &'static str, properties: Properties) -> BatchPosition {
        self.append(BatchOperation::CreateNode { label, properties })
    }

    pub fn create_relationship(
        &mut self,
        start: impl Into<NodeRef>,
        rel_type: impl Into<String>,
        end: impl Into<NodeRef>,
    ) -> Result<BatchPosition, BatchError> {
        let (start, end) = (start.into(), end.into());
        self.check_node_ref(start)?;
        self.check_node_ref(end)?;
        Ok(self.append(BatchOperation::CreateRelationship {
            start,
            rel_type: rel_type.into(),
            end,
        }))
    }

    pub fn get_or_create_indexed_node(
        &mut self,
        index: &NodeIndex,
        value: impl Into<String>,
        properties: Properties,
    ) -> BatchPosition {
        self.indexed_node(index, value.into(), Uniqueness::GetOrCreate, properties)
    }

    pub fn create_indexed_node_or_fail(
        &mut self,
        index: &NodeIndex,
        value: impl Into<String>,
        properties: Properties,
    ) -> BatchPosition {
        self.indexed_node(index, value.into(), Uniqueness::CreateOrFail, properties)
    }

    pub fn get_or_create_indexed_relationship(
        &mut self,
        entry: IndexEntry,
        start: impl Into<NodeRef>,
        rel_type: impl Into<String>,
        end: impl Into<NodeRef>,
    ) -> Result<BatchPosition, BatchError> {
        let (start, end) = (start.into(), end.into());
        self.check_node_ref(start)?;
        self.check_node_ref(end)?;
        Ok(self.append(BatchOperation::IndexedRelationship {
            entry,
            start,
            rel_type: rel_type.into(),
            end,
        }))
    }

    /// Queue a relationship that is created at most once per `key` within
    /// the relationship index `index_name`.
    pub fn get_or_create_unique_relationship(
        &mut self,
        index_name: &str,
        key: &CompositeKey,
        start: impl Into<NodeRef>,
        rel_type: impl Into<String>,
        end: impl Into<NodeRef>,
    ) -> Result<BatchPosition, BatchError> {
        let entry = IndexEntry {
            index: index_name.to_string(),
            key: RELATIONSHIP_INDEX_KEY.to_string(),
            value: key.as_str().to_string(),
        };
        self.get_or_create_indexed_relationship(entry, start, rel_type, end)
    }

    /// Split the batch into ranges that never reference a position outside
    /// themselves. Each range can be executed on its own, in order.
    pub fn segments(&self) -> Vec<Range<usize>> {
        let len = self.operations.len();
        // lowest position reached by any operation at or after i
        let mut reach = vec![0usize; len];
        let mut lowest = usize::MAX;
        for (i, operation) in self.operations.iter().enumerate().rev() {
            lowest = lowest.min(i);
            if let Some((start, end)) = operation.endpoints() {
                for endpoint in [start, end] {
                    if let NodeRef::Pending(position) = endpoint {
                        lowest = lowest.min(position.index());
                    }
                }
            }
            reach[i] = lowest;
        }

        let mut segments = Vec::new();
        let mut segment_start = 0;
        for i in 1..len {
            if reach[i] >= i {
                segments.push(segment_start..i);
                segment_start = i;
            }
        }
        if len > 0 {
            segments.push(segment_start..len);
        }
        segments
    }

    fn indexed_node(
        &mut self,
        index: &NodeIndex,
        value: String,
        uniqueness: Uniqueness,
        mut properties: Properties,
    ) -> BatchPosition {
        properties
            .entry(index.key.to_string())
            .or_insert_with(|| value.clone());
        self.append(BatchOperation::IndexedNode {
            label: index.label,
            entry: IndexEntry {
                index: index.name.to_string(),
                key: index.key.to_string(),
                value,
            },
            uniqueness,
            properties,
        })
    }

    fn append(&mut self, operation: BatchOperation) -> BatchPosition {
        self.operations.push(operation);
        BatchPosition(self.operations.len() - 1)
    }

    fn check_node_ref(&self, node: NodeRef) -> Result<(), BatchError> {
        let NodeRef::Pending(position) = node else {
            return Ok(());
        };
        match self.operations.get(position.index()) {
            None => Err(BatchError::DanglingReference {
                position: position.index(),
                len: self.operations.len(),
            }),
            Some(operation) if !operation.creates_node() => Err(BatchError::NotANode {
                position: position.index(),
            }),
            Some(_) => Ok(()),
        }
    }
}
