use crate::identity::DocumentId;
use async_trait::async_trait;
use std::error::Error;

/// Transport-level failure reported by a [`BulkSink`].
pub type ShipError = Box<dyn Error + Send + Sync>;

/// One serialized event waiting to be written under its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItem {
    pub id: DocumentId,
    /// JSON document body.
    pub body: Vec<u8>,
}

/// Per-item result echoed back by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub id: DocumentId,
    /// Index the backend reports for this item.
    pub index: String,
    /// `Err` carries the backend's rejection reason.
    pub result: Result<(), String>,
}

impl ItemOutcome {
    pub fn indexed(id: DocumentId, index: impl Into<String>) -> Self {
        ItemOutcome {
            id,
            index: index.into(),
            result: Ok(()),
        }
    }

    pub fn rejected(id: DocumentId, index: impl Into<String>, reason: impl Into<String>) -> Self {
        ItemOutcome {
            id,
            index: index.into(),
            result: Err(reason.into()),
        }
    }
}

/// Rejected item as handed to the caller's failure callback.
///
/// Never retried by the indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub index: String,
    pub reason: String,
    pub document_id: DocumentId,
}

/// Asynchronous bulk-write destination for batches built by the indexer.
///
/// Implementations own the wire protocol and authentication towards a
/// concrete backend (OpenSearch, Elasticsearch, a test double). A single
/// instance is shared by every worker, so `ship_batch` may run
/// concurrently with itself.
#[async_trait]
pub trait BulkSink: Send + Sync {
    /// Write `items` into `index` in one bulk request.
    ///
    /// **Returns**
    /// - `Ok(outcomes)` with one entry per item the backend answered for.
    ///   Items missing from the response are treated as failed.
    /// - `Err(..)` if the request as a whole failed (backend unreachable,
    ///   non-success status, unreadable response). Every item of the
    ///   batch is then reported as failed.
    ///
    /// Retrying is up to the implementation; the indexer never retries.
    async fn ship_batch(&self, index: &str, items: &[BulkItem]) -> Result<Vec<ItemOutcome>, ShipError>;
}
