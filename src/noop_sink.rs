use crate::sink::{BulkItem, BulkSink, ItemOutcome, ShipError};
use async_trait::async_trait;

/// A sink that acknowledges every item without sending it anywhere.
///
/// Useful for measuring the overhead of the indexer itself without any
/// external I/O, and for tests that don't care about persistence.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl BulkSink for NoopSink {
    async fn ship_batch(&self, index: &str, items: &[BulkItem]) -> Result<Vec<ItemOutcome>, ShipError> {
        Ok(items
            .iter()
            .map(|item| ItemOutcome::indexed(item.id, index))
            .collect())
    }
}
