//! In-Memory Graph Store
//!
//! Keeps the graph in process with the same index semantics as the remote
//! stores. Used for dry runs and tests.

use super::{GraphStore, OperationResult};
use crate::batch::{BatchOperation, IndexEntry, NodeRef, Properties, Uniqueness, WriteBatch};
use crate::error::{BatchError, StoreError};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    pub label: &'static str,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRelationship {
    pub start: usize,
    pub rel_type: String,
    pub end: usize,
}

#[derive(Debug, Clone, Copy)]
enum Entity {
    Node(usize),
    Relationship(usize),
}

impl Entity {
    fn location(&self) -> String {
        match self {
            Entity::Node(id) => format!("node/{}", id),
            Entity::Relationship(id) => format!("relationship/{}", id),
        }
    }
}

#[derive(Debug, Default)]
struct Graph {
    nodes: Vec<StoredNode>,
    relationships: Vec<StoredRelationship>,
    node_index: HashMap<IndexEntry, usize>,
    relationship_index: HashMap<IndexEntry, usize>,
}

/// Entries added while applying one batch, enough to undo it
#[derive(Default)]
struct Journal {
    nodes: usize,
    relationships: usize,
    node_entries: Vec<IndexEntry>,
    relationship_entries: Vec<IndexEntry>,
}

impl Graph {
    fn apply(&mut self, batch: &WriteBatch) -> Result<Vec<Entity>, StoreError> {
        let mut journal = Journal {
            nodes: self.nodes.len(),
            relationships: self.relationships.len(),
            ..Journal::default()
        };

        let mut entities = Vec::with_capacity(batch.len());
        for operation in batch.operations() {
            match self.apply_operation(operation, &entities, &mut journal) {
                Ok(entity) => entities.push(entity),
                Err(e) => {
                    self.rollback(journal);
                    return Err(e);
                }
            }
        }
        Ok(entities)
    }

    fn apply_operation(
        &mut self,
        operation: &BatchOperation,
        entities: &[Entity],
        journal: &mut Journal,
    ) -> Result<Entity, StoreError> {
        match operation {
            BatchOperation::CreateNode { label, properties } => {
                Ok(Entity::Node(self.push_node(*label, properties)))
            }
            BatchOperation::CreateRelationship { start, rel_type, end } => {
                let (start, end) = (self.resolve(*start, entities)?, self.resolve(*end, entities)?);
                Ok(Entity::Relationship(self.push_relationship(start, rel_type, end)))
            }
            BatchOperation::IndexedNode {
                label,
                entry,
                uniqueness,
                properties,
            } => {
                if let Some(&id) = self.node_index.get(entry) {
                    return match uniqueness {
                        Uniqueness::GetOrCreate => Ok(Entity::Node(id)),
                        Uniqueness::CreateOrFail => Err(StoreError::UniquenessViolation(format!(
                            "{} already indexes {}={}",
                            entry.index, entry.key, entry.value
                        ))),
                    };
                }
                let id = self.push_node(*label, properties);
                self.node_index.insert(entry.clone(), id);
                journal.node_entries.push(entry.clone());
                Ok(Entity::Node(id))
            }
            BatchOperation::IndexedRelationship {
                entry,
                start,
                rel_type,
                end,
            } => {
                if let Some(&id) = self.relationship_index.get(entry) {
                    return Ok(Entity::Relationship(id));
                }
                let (start, end) = (self.resolve(*start, entities)?, self.resolve(*end, entities)?);
                let id = self.push_relationship(start, rel_type, end);
                self.relationship_index.insert(entry.clone(), id);
                journal.relationship_entries.push(entry.clone());
                Ok(Entity::Relationship(id))
            }
        }
    }

    fn resolve(&self, node: NodeRef, entities: &[Entity]) -> Result<usize, StoreError> {
        match node {
            NodeRef::Pending(position) => match entities.get(position.index()) {
                Some(Entity::Node(id)) => Ok(*id),
                Some(Entity::Relationship(_)) => Err(BatchError::NotANode {
                    position: position.index(),
                }
                .into()),
                None => Err(BatchError::DanglingReference {
                    position: position.index(),
                    len: entities.len(),
                }
                .into()),
            },
            NodeRef::Stored(id) => usize::try_from(id)
                .ok()
                .filter(|id| *id < self.nodes.len())
                .ok_or_else(|| StoreError::Rejected {
                    status: 404,
                    message: format!("node {} not found", id),
                }),
        }
    }

    fn push_node(&mut self, label: &'static str, properties: &Properties) -> usize {
        self.nodes.push(StoredNode {
            label,
            properties: properties.clone(),
        });
        self.nodes.len() - 1
    }

    fn push_relationship(&mut self, start: usize, rel_type: &str, end: usize) -> usize {
        self.relationships.push(StoredRelationship {
            start,
            rel_type: rel_type.to_string(),
            end,
        });
        self.relationships.len() - 1
    }

    fn rollback(&mut self, journal: Journal) {
        self.nodes.truncate(journal.nodes);
        self.relationships.truncate(journal.relationships);
        for entry in journal.node_entries {
            self.node_index.remove(&entry);
        }
        for entry in journal.relationship_entries {
            self.relationship_index.remove(&entry);
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    graph: Mutex<Graph>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn node_count(&self) -> usize {
        self.graph.lock().await.nodes.len()
    }

    pub async fn relationship_count(&self) -> usize {
        self.graph.lock().await.relationships.len()
    }

    pub async fn nodes_with_label(&self, label: &str) -> Vec<StoredNode> {
        let graph = self.graph.lock().await;
        graph
            .nodes
            .iter()
            .filter(|node| node.label == label)
            .cloned()
            .collect()
    }

    pub async fn relationships_of_type(&self, rel_type: &str) -> Vec<StoredRelationship> {
        let graph = self.graph.lock().await;
        graph
            .relationships
            .iter()
            .filter(|rel| rel.rel_type == rel_type)
            .cloned()
            .collect()
    }
}

impl GraphStore for MemoryStore {
    async fn submit(&self, batch: &WriteBatch) -> Result<Vec<OperationResult>, StoreError> {
        let mut graph = self.graph.lock().await;
        let entities = graph.apply(batch)?;
        debug!(
            "Applied {} operations in memory ({} nodes, {} relationships)",
            entities.len(),
            graph.nodes.len(),
            graph.relationships.len()
        );

        Ok(batch
            .positions()
            .zip(entities)
            .map(|(position, entity)| OperationResult {
                position,
                location: Some(entity.location()),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::CompositeKey;
    use crate::record::AddressType;
    use crate::schema::{PROVIDERS, ZIPCODES};

    #[tokio::test]
    async fn test_get_or_create_reuses_indexed_node() {
        let store = MemoryStore::new();

        for _ in 0..2 {
            let mut batch = WriteBatch::new();
            batch.get_or_create_indexed_node(&ZIPCODES, "90210", Properties::new());
            let results = store.submit(&batch).await.unwrap();
            assert_eq!(results[0].location.as_deref(), Some("node/0"));
        }

        assert_eq!(store.node_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_or_fail_rolls_back_whole_batch() {
        let store = MemoryStore::new();
        let mut first = WriteBatch::new();
        first.create_indexed_node_or_fail(&PROVIDERS, "1", Properties::new());
        store.submit(&first).await.unwrap();

        let mut second = WriteBatch::new();
        let name = second.create_node("Name", Properties::new());
        let zip = second.get_or_create_indexed_node(&ZIPCODES, "90210", Properties::new());
        let key = CompositeKey::address("2", AddressType::Mailing, "90210");
        second
            .get_or_create_unique_relationship("in_zipcode", &key, name, "in_zipcode", zip)
            .unwrap();
        second.create_indexed_node_or_fail(&PROVIDERS, "1", Properties::new());

        let err = store.submit(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::UniquenessViolation(_)));
        assert_eq!(store.node_count().await, 1);
        assert_eq!(store.relationship_count().await, 0);

        // the rolled back zipcode entry must not linger in the index
        let mut third = WriteBatch::new();
        third.get_or_create_indexed_node(&ZIPCODES, "90210", Properties::new());
        let results = store.submit(&third).await.unwrap();
        assert_eq!(results[0].location.as_deref(), Some("node/1"));
    }

    #[tokio::test]
    async fn test_indexed_relationship_created_once() {
        let store = MemoryStore::new();
        let key = CompositeKey::address("1", AddressType::Mailing, "90210");

        for _ in 0..3 {
            let mut batch = WriteBatch::new();
            let a = batch.get_or_create_indexed_node(&PROVIDERS, "1", Properties::new());
            let z = batch.get_or_create_indexed_node(&ZIPCODES, "90210", Properties::new());
            batch
                .get_or_create_unique_relationship("in_zipcode", &key, a, "in_zipcode", z)
                .unwrap();
            store.submit(&batch).await.unwrap();
        }

        assert_eq!(store.relationships_of_type("in_zipcode").await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_stored_node_is_rejected() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        let a = batch.create_node("Address", Properties::new());
        batch.create_relationship(a, "in_state", NodeRef::Stored(7)).unwrap();

        let err = store.submit(&batch).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 404, .. }));
        assert_eq!(store.node_count().await, 0);
    }
}
