//! Bolt Graph Store
//!
//! Runs a write batch inside one neo4rs transaction. The batch is cut into
//! self-contained segments (see [`WriteBatch::segments`]) and each segment
//! is compiled to a single Cypher statement in which batch position N is
//! bound to the variable `n<N>` (nodes) or `r<N>` (relationships).

use super::{GraphStore, OperationResult};
use crate::batch::{BatchOperation, NodeRef, Properties, Uniqueness, WriteBatch};
use crate::error::StoreError;
use crate::schema::ALL_NODE_INDEXES;
use neo4rs::query;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::ops::Range;
use tracing::{debug, info, warn};

// ============================================================================
// Statement Compilation
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum StatementParam {
    Map(HashMap<String, String>),
    Text(String),
    Id(i64),
}

/// One Cypher statement and its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Vec<(String, StatementParam)>,
}

impl Statement {
    fn to_query(&self) -> neo4rs::Query {
        self.params
            .iter()
            .fold(query(&self.text), |q, (name, param)| match param {
                StatementParam::Map(map) => q.param(name, map.clone()),
                StatementParam::Text(text) => q.param(name, text.clone()),
                StatementParam::Id(id) => q.param(name, *id),
            })
    }
}

fn quote(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

fn to_map(properties: &Properties) -> HashMap<String, String> {
    properties
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Compile the operations in `range` to one statement. The range must not
/// reference pending positions outside itself.
pub fn compile_segment(batch: &WriteBatch, range: Range<usize>) -> Statement {
    let mut matches: Vec<String> = Vec::new();
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<(String, StatementParam)> = Vec::new();
    let mut stored: Vec<i64> = Vec::new();

    let mut var = |node: NodeRef,
                   matches: &mut Vec<String>,
                   params: &mut Vec<(String, StatementParam)>|
     -> String {
        match node {
            NodeRef::Pending(position) => format!("n{}", position.index()),
            NodeRef::Stored(id) => {
                let slot = match stored.iter().position(|s| *s == id) {
                    Some(slot) => slot,
                    None => {
                        stored.push(id);
                        let slot = stored.len() - 1;
                        matches.push(format!("MATCH (s{slot}) WHERE id(s{slot}) = $s{slot}"));
                        params.push((format!("s{slot}"), StatementParam::Id(id)));
                        slot
                    }
                };
                format!("s{}", slot)
            }
        }
    };

    for position in range {
        let Some(operation) = batch.operations().get(position) else {
            break;
        };
        let p = position;
        match operation {
            BatchOperation::CreateNode { label, properties } => {
                clauses.push(format!("CREATE (n{p}:{}) SET n{p} = $p{p}", quote(label)));
                params.push((format!("p{p}"), StatementParam::Map(to_map(properties))));
            }
            BatchOperation::IndexedNode {
                label,
                entry,
                uniqueness,
                properties,
            } => {
                match uniqueness {
                    Uniqueness::GetOrCreate => {
                        clauses.push(format!(
                            "MERGE (n{p}:{} {{{}: $v{p}}}) ON CREATE SET n{p} += $p{p}",
                            quote(label),
                            quote(&entry.key)
                        ));
                        params.push((format!("v{p}"), StatementParam::Text(entry.value.clone())));
                    }
                    // relies on the uniqueness constraint for the label
                    Uniqueness::CreateOrFail => {
                        clauses.push(format!("CREATE (n{p}:{}) SET n{p} = $p{p}", quote(label)));
                    }
                }
                params.push((format!("p{p}"), StatementParam::Map(to_map(properties))));
            }
            BatchOperation::CreateRelationship { start, rel_type, end } => {
                let start = var(*start, &mut matches, &mut params);
                let end = var(*end, &mut matches, &mut params);
                clauses.push(format!(
                    "CREATE ({start})-[r{p}:{}]->({end})",
                    quote(rel_type)
                ));
            }
            BatchOperation::IndexedRelationship {
                entry,
                start,
                rel_type,
                end,
            } => {
                let start = var(*start, &mut matches, &mut params);
                let end = var(*end, &mut matches, &mut params);
                clauses.push(format!(
                    "MERGE ({start})-[r{p}:{} {{{}: $v{p}}}]->({end})",
                    quote(rel_type),
                    quote(&entry.key)
                ));
                params.push((format!("v{p}"), StatementParam::Text(entry.value.clone())));
            }
        }
    }

    matches.extend(clauses);
    Statement {
        text: matches.join("\n"),
        params,
    }
}

/// Whether a server error message reports a uniqueness constraint failure
pub fn is_constraint_violation(message: &str) -> bool {
    message.contains("ConstraintValidationFailed") || message.contains("already exists with label")
}

fn classify_error(e: neo4rs::Error) -> StoreError {
    let message = e.to_string();
    if is_constraint_violation(&message) {
        StoreError::UniquenessViolation(message)
    } else {
        StoreError::Bolt(e)
    }
}

/// Await the rollback and hand back the error that caused it. A failed
/// rollback is only logged; the server drops the transaction either way.
async fn rolled_back<E: Display>(
    error: StoreError,
    rollback: impl Future<Output = Result<(), E>>,
) -> StoreError {
    if let Err(rollback_error) = rollback.await {
        warn!("⚠️  Rollback failed: {}", rollback_error);
    }
    error
}

// ============================================================================
// Store
// ============================================================================

pub struct BoltStore {
    graph: neo4rs::Graph,
}

impl BoltStore {
    pub fn new(graph: neo4rs::Graph) -> Self {
        Self { graph }
    }

    /// Create the uniqueness constraints backing the node indexes
    pub async fn ensure_constraints(&self) -> Result<(), StoreError> {
        for index in ALL_NODE_INDEXES {
            let q = query(&format!(
                "CREATE CONSTRAINT {}_{}_unique IF NOT EXISTS FOR (n:{}) REQUIRE n.{} IS UNIQUE",
                index.name,
                index.key,
                quote(index.label),
                quote(index.key)
            ));
            self.graph.run(q).await?;
        }
        info!("✅ Ensured {} uniqueness constraints", ALL_NODE_INDEXES.len());
        Ok(())
    }

    async fn run_segments(txn: &mut neo4rs::Txn, batch: &WriteBatch) -> Result<(), StoreError> {
        let segments = batch.segments();
        debug!("Running {} statements for {} operations", segments.len(), batch.len());
        for range in segments {
            let statement = compile_segment(batch, range);
            txn.run(statement.to_query()).await.map_err(classify_error)?;
        }
        Ok(())
    }
}

impl GraphStore for BoltStore {
    async fn submit(&self, batch: &WriteBatch) -> Result<Vec<OperationResult>, StoreError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut txn = self.graph.start_txn().await?;

        match Self::run_segments(&mut txn, batch).await {
            Ok(()) => {
                txn.commit().await?;
                info!("✅ Transaction committed ({} operations)", batch.len());
                Ok(batch
                    .positions()
                    .map(|position| OperationResult {
                        position,
                        location: None,
                    })
                    .collect())
            }
            Err(e) => {
                warn!("❌ Error during batch write, rolling back: {}", e);
                Err(rolled_back(e, txn.rollback()).await)
            }
        }
    }
}
