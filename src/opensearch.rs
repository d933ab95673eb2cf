use crate::error::ConfigurationError;
use crate::identity::DocumentId;
use crate::sink::{BulkItem, BulkSink, ItemOutcome, ShipError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Configuration for [`OpenSearchSink`].
#[derive(Clone, Debug)]
pub struct OpenSearchConfig {
    /// Base URL of the cluster, e.g. "http://localhost:9200".
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Upper bound for establishing a connection.
    pub connect_timeout: Duration,
    /// Upper bound for a whole bulk request, response included.
    pub request_timeout: Duration,
}

impl Default for OpenSearchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// OpenSearch (and Elasticsearch) sink writing batches through the HTTP
/// `_bulk` API.
///
/// Each item becomes an `index` action keyed by its [`DocumentId`], so a
/// batch that is shipped twice overwrites instead of duplicating. The
/// underlying client pools connections and is shared by every worker.
#[derive(Clone)]
pub struct OpenSearchSink {
    client: Client,
    config: OpenSearchConfig,
}

impl OpenSearchSink {
    pub fn new(config: OpenSearchConfig) -> Result<Self, ConfigurationError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| ConfigurationError::Backend(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, index: &str) -> String {
        format!(
            "{}/{}/_bulk",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(index)
        )
    }
}

#[derive(Serialize)]
struct BulkAction<'a> {
    index: BulkActionMeta<'a>,
}

#[derive(Serialize)]
struct BulkActionMeta<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id")]
    id: &'a DocumentId,
}

#[derive(Deserialize)]
struct BulkResponse {
    items: Vec<HashMap<String, BulkResponseItem>>,
}

#[derive(Deserialize)]
struct BulkResponseItem {
    #[serde(rename = "_index")]
    index: Option<String>,
    #[serde(rename = "_id")]
    id: Option<String>,
    status: u16,
    error: Option<BulkItemError>,
}

#[derive(Deserialize)]
struct BulkItemError {
    #[serde(rename = "type")]
    kind: Option<String>,
    reason: Option<String>,
}

/// Render the NDJSON body: one action line and one document line per item.
fn encode_bulk_body(index: &str, items: &[BulkItem]) -> Result<Vec<u8>, serde_json::Error> {
    let capacity = items.iter().map(|item| item.body.len() + 96).sum();
    let mut body = Vec::with_capacity(capacity);
    for item in items {
        serde_json::to_writer(
            &mut body,
            &BulkAction {
                index: BulkActionMeta { index, id: &item.id },
            },
        )?;
        body.push(b'\n');
        body.extend_from_slice(&item.body);
        body.push(b'\n');
    }
    Ok(body)
}

/// Map the response's `items` back to outcomes. Entries come back in
/// request order; the echoed `_id` is preferred when it parses.
fn decode_outcomes(index: &str, items: &[BulkItem], response: BulkResponse) -> Vec<ItemOutcome> {
    response
        .items
        .into_iter()
        .zip(items)
        .filter_map(|(entry, sent)| {
            let (_, result) = entry.into_iter().next()?;
            let id = result
                .id
                .as_deref()
                .and_then(|raw| Uuid::parse_str(raw).ok())
                .map(DocumentId::from)
                .unwrap_or(sent.id);
            let target = result.index.unwrap_or_else(|| index.to_string());

            let outcome = match result.error {
                None if (200..300).contains(&result.status) => ItemOutcome::indexed(id, target),
                Some(BulkItemError {
                    reason: Some(reason),
                    ..
                }) => ItemOutcome::rejected(id, target, reason),
                Some(BulkItemError {
                    kind: Some(kind), ..
                }) => ItemOutcome::rejected(id, target, kind),
                _ => ItemOutcome::rejected(id, target, format!("status {}", result.status)),
            };
            Some(outcome)
        })
        .collect()
}

#[async_trait]
impl BulkSink for OpenSearchSink {
    async fn ship_batch(&self, index: &str, items: &[BulkItem]) -> Result<Vec<ItemOutcome>, ShipError> {
        let body = encode_bulk_body(index, items)?;

        let mut request = self
            .client
            .post(self.endpoint(index))
            .header("Content-Type", "application/x-ndjson")
            .body(body);
        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_ref());
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            return Err(format!("OpenSearch bulk request failed with status {}: {}", status, text).into());
        }

        let response: BulkResponse = resp.json().await?;
        Ok(decode_outcomes(index, items, response))
    }
}
