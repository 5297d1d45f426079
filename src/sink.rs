//! Bulk submission of records to a search index.
//!
//! [`IndexClient`] is the seam; [`ElasticsearchClient`] speaks the
//! `_bulk` NDJSON protocol. A submission is one batch, per-item failures
//! are collected and never retried.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::IndexConfig;
use crate::error::{IngestError, IngestResult};
use crate::models::NormalizedRecord;

/// One `{index, source}` pair of a bulk request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkAction {
    pub index: String,
    pub source: NormalizedRecord,
}

/// A rejected item of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemError {
    /// Position of the item in the submitted batch.
    pub position: usize,
    pub status: u16,
    pub reason: String,
}

/// Raw per-item outcome of a bulk call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResponse {
    pub succeeded: usize,
    pub errors: Vec<BulkItemError>,
}

/// Summary returned to the caller of [`submit_records`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub success_count: usize,
    pub errors: Vec<BulkItemError>,
}

impl BulkReport {
    /// The partial-failure classification, if any item was rejected.
    pub fn partial_failure(&self) -> Option<IngestError> {
        if self.errors.is_empty() {
            None
        } else {
            Some(IngestError::IndexingPartialFailure {
                failed: self.errors.len(),
            })
        }
    }
}

/// A search index that accepts batched writes.
#[async_trait]
pub trait IndexClient: Send + Sync {
    async fn bulk(&self, actions: &[BulkAction]) -> IngestResult<BulkResponse>;
}

/// Elasticsearch `_bulk` client with `ApiKey` authentication.
pub struct ElasticsearchClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ElasticsearchClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout_secs: u64) -> IngestResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| IngestError::Setup(format!("index client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    pub fn from_config(config: &IndexConfig) -> IngestResult<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| IngestError::Setup("index.url is not configured".to_string()))?;
        let api_key = config.api_key();
        if api_key.is_none() {
            tracing::warn!(env = %config.api_key_env, "no API key in environment, sending unauthenticated requests");
        }
        Self::new(url, api_key, config.timeout_secs)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("ApiKey {}", key)),
            None => request,
        }
    }

    /// Whether the cluster answers with a 2xx status.
    pub async fn ping(&self) -> bool {
        let request = self.authorized(self.client.head(&self.base_url));
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(url = %self.base_url, error = %e, "ping failed");
                false
            }
        }
    }
}

#[async_trait]
impl IndexClient for ElasticsearchClient {
    async fn bulk(&self, actions: &[BulkAction]) -> IngestResult<BulkResponse> {
        let url = format!("{}/_bulk", self.base_url);
        let body = to_ndjson(actions)?;

        let response = self
            .authorized(self.client.post(&url))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| IngestError::FetchFailure {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(IngestError::FetchFailure {
                url,
                reason: format!("bulk request returned {}: {}", status, body_text),
            });
        }

        let json: Value = response.json().await.map_err(|e| IngestError::FetchFailure {
            url: url.clone(),
            reason: format!("invalid bulk response: {}", e),
        })?;
        Ok(parse_bulk_response(&json))
    }
}

/// Serializes actions as `_bulk` NDJSON: an action line and a source line
/// per item, each newline-terminated.
pub fn to_ndjson(actions: &[BulkAction]) -> IngestResult<String> {
    let mut body = String::new();
    for action in actions {
        let header = serde_json::json!({ "index": { "_index": action.index } });
        let source = serde_json::to_string(&action.source).map_err(|e| {
            IngestError::MalformedDocument {
                locator: action.source.locator.clone(),
                reason: e.to_string(),
            }
        })?;
        body.push_str(&header.to_string());
        body.push('\n');
        body.push_str(&source);
        body.push('\n');
    }
    Ok(body)
}

/// Splits a `_bulk` response into succeeded and rejected items.
pub fn parse_bulk_response(json: &Value) -> BulkResponse {
    let mut response = BulkResponse::default();
    let items = json
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for (position, item) in items.iter().enumerate() {
        let Some(outcome) = item.as_object().and_then(|o| o.values().next()) else {
            continue;
        };
        let status = outcome
            .get("status")
            .and_then(Value::as_u64)
            .unwrap_or_default() as u16;
        match outcome.get("error") {
            Some(error) if !error.is_null() => {
                let reason = error
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string());
                response.errors.push(BulkItemError {
                    position,
                    status,
                    reason,
                });
            }
            _ => response.succeeded += 1,
        }
    }
    response
}

/// Submits `records` to `index` in one batch.
pub async fn submit_records(
    client: &dyn IndexClient,
    index: &str,
    records: &[NormalizedRecord],
) -> IngestResult<BulkReport> {
    if records.is_empty() {
        return Ok(BulkReport::default());
    }

    let actions: Vec<BulkAction> = records
        .iter()
        .map(|record| BulkAction {
            index: index.to_string(),
            source: record.clone(),
        })
        .collect();

    let response = client.bulk(&actions).await?;
    let report = BulkReport {
        success_count: response.succeeded,
        errors: response.errors,
    };
    tracing::info!(
        index,
        indexed = report.success_count,
        rejected = report.errors.len(),
        "bulk submission complete"
    );
    if let Some(err) = report.partial_failure() {
        tracing::warn!(error = %err, "some records were not indexed");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn record(title: &str) -> NormalizedRecord {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), json!(title));
        fields.insert("position".to_string(), json!("1"));
        NormalizedRecord {
            fields,
            locator: format!("mem://{}", title),
            extracted_at: "2024-05-01 10:00:00".into(),
            source: "test".into(),
            methods: BTreeMap::new(),
            incomplete: false,
        }
    }

    /// Rejects every item whose title starts with "bad".
    struct FakeIndex {
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl IndexClient for FakeIndex {
        async fn bulk(&self, actions: &[BulkAction]) -> IngestResult<BulkResponse> {
            self.batches.lock().unwrap().push(actions.len());
            let mut response = BulkResponse::default();
            for (position, action) in actions.iter().enumerate() {
                if action.source.title().is_some_and(|t| t.starts_with("bad")) {
                    response.errors.push(BulkItemError {
                        position,
                        status: 400,
                        reason: "mapper_parsing_exception".into(),
                    });
                } else {
                    response.succeeded += 1;
                }
            }
            Ok(response)
        }
    }

    #[tokio::test]
    async fn collects_partial_failures_in_one_batch() {
        let index = FakeIndex {
            batches: Mutex::new(Vec::new()),
        };
        let records = vec![record("good one"), record("bad one"), record("good two")];
        let report = submit_records(&index, "movies", &records).await.unwrap();
        assert_eq!(report.success_count, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].position, 1);
        assert_eq!(
            report.partial_failure(),
            Some(IngestError::IndexingPartialFailure { failed: 1 })
        );
        assert_eq!(*index.batches.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn empty_submission_skips_the_call() {
        let index = FakeIndex {
            batches: Mutex::new(Vec::new()),
        };
        let report = submit_records(&index, "movies", &[]).await.unwrap();
        assert_eq!(report, BulkReport::default());
        assert!(index.batches.lock().unwrap().is_empty());
    }

    #[test]
    fn ndjson_pairs_action_and_source() {
        let actions = vec![BulkAction {
            index: "movies".into(),
            source: record("Movie X"),
        }];
        let body = to_ndjson(&actions).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(body.ends_with('\n'));
        let header: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(header, json!({"index": {"_index": "movies"}}));
        let source: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(source["title"], json!("Movie X"));
    }

    #[test]
    fn parses_bulk_response_items() {
        let body = json!({
            "took": 3,
            "errors": true,
            "items": [
                {"index": {"_index": "movies", "status": 201}},
                {"index": {"_index": "movies", "status": 400,
                           "error": {"type": "mapper_parsing_exception", "reason": "bad field"}}}
            ]
        });
        let response = parse_bulk_response(&body);
        assert_eq!(response.succeeded, 1);
        assert_eq!(
            response.errors,
            vec![BulkItemError {
                position: 1,
                status: 400,
                reason: "bad field".into()
            }]
        );
    }

    #[tokio::test]
    async fn unreachable_cluster_is_fetch_failure() {
        let client = ElasticsearchClient::new("http://127.0.0.1:1", None, 2).unwrap();
        assert!(!client.ping().await);
        let err = client
            .bulk(&[BulkAction {
                index: "movies".into(),
                source: record("Movie X"),
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::FetchFailure { .. }));
    }

    #[test]
    fn missing_url_is_setup_error() {
        let err = ElasticsearchClient::from_config(&IndexConfig::default())
            .err()
            .unwrap();
        assert!(err.is_fatal());
    }
}
