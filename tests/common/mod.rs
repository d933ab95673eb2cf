//! Test doubles for the bulk sink and helpers shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bulk_log_sink::identity::DocumentId;
use bulk_log_sink::sink::ShipError;
use bulk_log_sink::{BulkItem, BulkSink, Config, Connection, FailureRecord, ItemOutcome};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// One bulk request as seen by a [`RecordingSink`].
#[derive(Debug, Clone)]
pub struct ShippedBatch {
    pub at: Instant,
    pub index: String,
    pub docs: Vec<(DocumentId, Value)>,
}

impl ShippedBatch {
    pub fn messages(&self) -> Vec<String> {
        self.docs
            .iter()
            .map(|(_, doc)| doc["message"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

/// Accepts every item and remembers what it was sent. Items whose
/// message contains `reject` are refused with a per-item error.
#[derive(Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<ShippedBatch>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn batches(&self) -> Vec<ShippedBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches().iter().map(|b| b.docs.len()).collect()
    }

    pub fn doc_count(&self) -> usize {
        self.batch_sizes().iter().sum()
    }
}

#[async_trait]
impl BulkSink for RecordingSink {
    async fn ship_batch(&self, index: &str, items: &[BulkItem]) -> Result<Vec<ItemOutcome>, ShipError> {
        let mut docs = Vec::with_capacity(items.len());
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            let doc: Value = serde_json::from_slice(&item.body)?;
            let rejected = doc["message"]
                .as_str()
                .map_or(false, |m| m.contains("reject"));
            outcomes.push(if rejected {
                ItemOutcome::rejected(item.id, index, "document rejected")
            } else {
                ItemOutcome::indexed(item.id, index)
            });
            docs.push((item.id, doc));
        }
        self.batches.lock().unwrap().push(ShippedBatch {
            at: Instant::now(),
            index: index.to_string(),
            docs,
        });
        Ok(outcomes)
    }
}

/// Fails every request as a whole, like an unreachable backend.
pub struct UnreachableSink;

#[async_trait]
impl BulkSink for UnreachableSink {
    async fn ship_batch(&self, _index: &str, _items: &[BulkItem]) -> Result<Vec<ItemOutcome>, ShipError> {
        Err("connection refused".into())
    }
}

/// Answers for the first item of each batch only.
pub struct ForgetfulSink;

#[async_trait]
impl BulkSink for ForgetfulSink {
    async fn ship_batch(&self, index: &str, items: &[BulkItem]) -> Result<Vec<ItemOutcome>, ShipError> {
        Ok(items
            .iter()
            .take(1)
            .map(|item| ItemOutcome::indexed(item.id, index))
            .collect())
    }
}

/// Never completes a request.
pub struct StallingSink;

#[async_trait]
impl BulkSink for StallingSink {
    async fn ship_batch(&self, _index: &str, _items: &[BulkItem]) -> Result<Vec<ItemOutcome>, ShipError> {
        std::future::pending().await
    }
}

/// Acknowledges every item after a fixed delay.
pub struct SlowSink(pub Duration);

#[async_trait]
impl BulkSink for SlowSink {
    async fn ship_batch(&self, index: &str, items: &[BulkItem]) -> Result<Vec<ItemOutcome>, ShipError> {
        tokio::time::sleep(self.0).await;
        Ok(items
            .iter()
            .map(|item| ItemOutcome::indexed(item.id, index))
            .collect())
    }
}

/// Terminal outcomes collected from the indexer callbacks.
#[derive(Default)]
pub struct Outcomes {
    pub successes: Mutex<Vec<DocumentId>>,
    pub failures: Mutex<Vec<FailureRecord>>,
}

impl Outcomes {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn success_count(&self) -> usize {
        self.successes.lock().unwrap().len()
    }

    pub fn failures(&self) -> Vec<FailureRecord> {
        self.failures.lock().unwrap().clone()
    }

    /// Every id that reached a callback, asserting none arrived twice.
    pub fn unique_ids(&self) -> HashSet<DocumentId> {
        let mut seen = HashSet::new();
        for id in self.successes.lock().unwrap().iter() {
            assert!(seen.insert(*id), "duplicate outcome for {id}");
        }
        for failure in self.failures.lock().unwrap().iter() {
            assert!(seen.insert(failure.document_id), "duplicate outcome for {}", failure.document_id);
        }
        seen
    }
}

/// Indexer config wired to `sink` with callbacks feeding `outcomes`.
pub fn config(sink: Arc<dyn BulkSink>, outcomes: &Arc<Outcomes>) -> Config {
    let on_success = Arc::clone(outcomes);
    let on_failure = Arc::clone(outcomes);
    Config {
        connection: Connection::Sink(sink),
        index: "logs".to_string(),
        flush_bytes: 1024 * 1024,
        flush_interval: Duration::from_secs(3600),
        num_workers: 1,
        queue_capacity: 1024,
        console: false,
        ..Config::default()
    }
    .with_on_success(move |id| on_success.successes.lock().unwrap().push(*id))
    .with_on_failure(move |record| on_failure.failures.lock().unwrap().push(record))
}

/// Poll `condition` every few milliseconds until it holds or `timeout`
/// elapses.
pub async fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
