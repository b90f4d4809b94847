//! REST Batch Store
//!
//! Submits a write batch to the Neo4j REST `/batch` endpoint. Each queued
//! operation becomes one job whose id is its batch position, so a pending
//! reference renders as `{N}` and the server substitutes the location of
//! job N's result.

use super::{GraphStore, OperationResult};
use crate::batch::{BatchOperation, NodeRef, WriteBatch};
use crate::error::StoreError;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// One job of a REST batch request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchJob {
    pub method: &'static str,
    pub to: String,
    pub body: Value,
    pub id: usize,
}

#[derive(Debug, Deserialize)]
struct JobResult {
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    body: Option<Value>,
}

pub struct RestBatchStore {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl RestBatchStore {
    /// `base_url` is the data root, e.g. `http://localhost:7474/db/data/`
    pub fn new(base_url: impl Into<String>, credentials: Option<Credentials>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            credentials,
        }
    }

    pub fn batch_url(&self) -> String {
        format!("{}/batch", self.base_url)
    }

    /// Check the data root answers before any batch is sent
    pub async fn ping(&self) -> Result<(), StoreError> {
        let response = self
            .authorize(self.client.get(&self.base_url))
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    /// Render the batch as REST jobs
    pub fn batch_jobs(&self, batch: &WriteBatch) -> Vec<BatchJob> {
        batch
            .operations()
            .iter()
            .enumerate()
            .map(|(id, operation)| self.job(id, operation))
            .collect()
    }

    fn job(&self, id: usize, operation: &BatchOperation) -> BatchJob {
        let (to, body) = match operation {
            BatchOperation::CreateNode { properties, .. } => ("/node".to_string(), json!(properties)),
            BatchOperation::CreateRelationship { start, rel_type, end } => (
                format!("{}/relationships", self.path(*start)),
                json!({ "to": self.uri(*end), "type": rel_type }),
            ),
            BatchOperation::IndexedNode {
                entry,
                uniqueness,
                properties,
                ..
            } => (
                format!("/index/node/{}?uniqueness={}", entry.index, uniqueness.as_str()),
                json!({ "key": entry.key, "value": entry.value, "properties": properties }),
            ),
            BatchOperation::IndexedRelationship {
                entry,
                start,
                rel_type,
                end,
            } => (
                format!("/index/relationship/{}?uniqueness=get_or_create", entry.index),
                json!({
                    "key": entry.key,
                    "value": entry.value,
                    "start": self.uri(*start),
                    "end": self.uri(*end),
                    "type": rel_type,
                }),
            ),
        };

        BatchJob {
            method: "POST",
            to,
            body,
            id,
        }
    }

    /// Reference usable as a job target
    fn path(&self, node: NodeRef) -> String {
        match node {
            NodeRef::Pending(position) => position.to_string(),
            NodeRef::Stored(id) => format!("/node/{}", id),
        }
    }

    /// Reference usable inside a job body
    fn uri(&self, node: NodeRef) -> String {
        match node {
            NodeRef::Pending(position) => position.to_string(),
            NodeRef::Stored(id) => format!("{}/node/{}", self.base_url, id),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(credentials) => {
                request.basic_auth(&credentials.user, Some(&credentials.password))
            }
            None => request,
        }
    }
}

/// Map a failed job or request onto the store error taxonomy
fn classify_failure(status: u16, message: String) -> StoreError {
    let conflict = status == 409
        || message.contains("ConstraintViolation")
        || message.contains("UniqueConstraint")
        || message.contains("already exists");

    if conflict {
        StoreError::UniquenessViolation(message)
    } else {
        StoreError::Rejected { status, message }
    }
}

impl GraphStore for RestBatchStore {
    async fn submit(&self, batch: &WriteBatch) -> Result<Vec<OperationResult>, StoreError> {
        let jobs = self.batch_jobs(batch);
        info!("📤 Submitting {} batch jobs to {}", jobs.len(), self.batch_url());

        let response = self
            .authorize(self.client.post(self.batch_url()))
            .header(ACCEPT, "application/json")
            .json(&jobs)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!("❌ Batch request failed with status {}", status);
            return Err(classify_failure(status.as_u16(), text));
        }

        let results: Vec<JobResult> = serde_json::from_str(&text)?;
        for result in &results {
            if let Some(job_status) = result.status.filter(|s| *s >= 400) {
                let message = result
                    .body
                    .as_ref()
                    .map(|body| body.to_string())
                    .unwrap_or_default();
                return Err(classify_failure(job_status, message));
            }
        }

        if results.len() != batch.len() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                message: format!(
                    "expected {} job results, got {}",
                    batch.len(),
                    results.len()
                ),
            });
        }

        debug!("Batch accepted with {} results", results.len());
        Ok(batch
            .positions()
            .zip(results)
            .map(|(position, result)| OperationResult {
                position,
                location: result.location,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{CompositeKey, Properties};
    use crate::record::AddressType;
    use crate::schema::{PROVIDERS, ZIPCODES};
    use mockito::Matcher;

    fn sample_batch() -> WriteBatch {
        let mut batch = WriteBatch::new();
        let mut provider = Properties::new();
        provider.insert("organization_name".to_string(), "ACME CLINIC".to_string());
        let p = batch.create_indexed_node_or_fail(&PROVIDERS, "1234567893", provider);
        let a = batch.create_node("Address", Properties::new());
        batch.create_relationship(p, "has_address", a).unwrap();
        let z = batch.get_or_create_indexed_node(&ZIPCODES, "90210", Properties::new());
        let key = CompositeKey::address("1234567893", AddressType::Mailing, "90210");
        batch
            .get_or_create_unique_relationship("in_zipcode", &key, a, "in_zipcode", z)
            .unwrap();
        batch
    }

    #[test]
    fn test_batch_jobs_use_position_references() {
        let store = RestBatchStore::new("http://localhost:7474/db/data/", None);
        let jobs = store.batch_jobs(&sample_batch());

        assert_eq!(jobs.len(), 5);
        assert_eq!(jobs[0].to, "/index/node/providers?uniqueness=create_or_fail");
        assert_eq!(jobs[0].body["key"], "npi");
        assert_eq!(jobs[0].body["value"], "1234567893");
        assert_eq!(jobs[0].body["properties"]["npi"], "1234567893");
        assert_eq!(jobs[0].body["properties"]["organization_name"], "ACME CLINIC");

        assert_eq!(jobs[1].to, "/node");
        assert_eq!(jobs[2].to, "{0}/relationships");
        assert_eq!(jobs[2].body, json!({ "to": "{1}", "type": "has_address" }));

        assert_eq!(jobs[3].to, "/index/node/zipcodes?uniqueness=get_or_create");
        assert_eq!(jobs[4].to, "/index/relationship/in_zipcode?uniqueness=get_or_create");
        assert_eq!(jobs[4].body["start"], "{1}");
        assert_eq!(jobs[4].body["end"], "{3}");
        assert_eq!(jobs[4].body["value"], "1234567893 mailing 90210");

        for (i, job) in jobs.iter().enumerate() {
            assert_eq!(job.id, i);
            assert_eq!(job.method, "POST");
        }
    }

    #[test]
    fn test_stored_nodes_render_as_uris() {
        let store = RestBatchStore::new("http://db:7474/db/data", None);
        let mut batch = WriteBatch::new();
        let a = batch.create_node("Address", Properties::new());
        batch.create_relationship(NodeRef::Stored(12), "has_address", a).unwrap();
        batch.create_relationship(a, "in_state", NodeRef::Stored(7)).unwrap();

        let jobs = store.batch_jobs(&batch);
        assert_eq!(jobs[1].to, "/node/12/relationships");
        assert_eq!(jobs[2].body["to"], "http://db:7474/db/data/node/7");
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure(409, "Conflict".to_string()),
            StoreError::UniquenessViolation(_)
        ));
        assert!(matches!(
            classify_failure(500, "UniqueConstraintViolationKernelException".to_string()),
            StoreError::UniquenessViolation(_)
        ));
        assert!(matches!(
            classify_failure(400, "Bad request".to_string()),
            StoreError::Rejected { status: 400, .. }
        ));
    }

    #[tokio::test]
    async fn test_submit_success_returns_locations() {
        let mut server = mockito::Server::new_async().await;
        let body: Vec<Value> = (0..5)
            .map(|i| json!({ "id": i, "location": format!("http://db/node/{}", 100 + i), "status": 201 }))
            .collect();
        let mock = server
            .mock("POST", "/db/data/batch")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Regex(
                r#""to":"/index/node/providers\?uniqueness=create_or_fail""#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(Value::Array(body).to_string())
            .create_async()
            .await;

        let store = RestBatchStore::new(format!("{}/db/data/", server.url()), None);
        let results = store.submit(&sample_batch()).await.expect("submit");

        mock.assert_async().await;
        assert_eq!(results.len(), 5);
        assert_eq!(results[4].position.index(), 4);
        assert_eq!(results[4].location.as_deref(), Some("http://db/node/104"));
    }

    #[tokio::test]
    async fn test_submit_conflict_is_uniqueness_violation() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/db/data/batch")
            .with_status(409)
            .with_body(r#"{"message": "Node already exists in index providers"}"#)
            .create_async()
            .await;

        let store = RestBatchStore::new(format!("{}/db/data", server.url()), None);
        let err = store.submit(&sample_batch()).await.unwrap_err();

        assert!(matches!(err, StoreError::UniquenessViolation(_)));
    }

    #[tokio::test]
    async fn test_submit_server_error_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/db/data/batch")
            .with_status(500)
            .with_body("Internal Server Error")
            .create_async()
            .await;

        let store = RestBatchStore::new(format!("{}/db/data", server.url()), None);
        let err = store.submit(&sample_batch()).await.unwrap_err();

        match err {
            StoreError::Rejected { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "Internal Server Error");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_failed_job_inside_ok_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/db/data/batch")
            .with_status(200)
            .with_body(r#"[{"id": 0, "status": 409, "body": {"message": "conflict"}}]"#)
            .create_async()
            .await;

        let store = RestBatchStore::new(format!("{}/db/data", server.url()), None);
        let err = store.submit(&sample_batch()).await.unwrap_err();

        assert!(matches!(err, StoreError::UniquenessViolation(_)));
    }

    #[tokio::test]
    async fn test_submit_sends_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        // neo4j:secret
        let mock = server
            .mock("POST", "/db/data/batch")
            .match_header("authorization", "Basic bmVvNGo6c2VjcmV0")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let store = RestBatchStore::new(
            format!("{}/db/data", server.url()),
            Some(Credentials {
                user: "neo4j".to_string(),
                password: "secret".to_string(),
            }),
        );
        let results = store.submit(&WriteBatch::new()).await.expect("submit");

        mock.assert_async().await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_ping_reports_unreachable_root() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/db/data")
            .with_status(503)
            .create_async()
            .await;

        let store = RestBatchStore::new(format!("{}/db/data/", server.url()), None);
        let err = store.ping().await.unwrap_err();

        assert!(matches!(err, StoreError::Rejected { status: 503, .. }));
    }
}
