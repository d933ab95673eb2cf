use crate::identity::DocumentId;
use crate::indexer::Shared;
use crate::record::LogEvent;
use crate::sink::BulkItem;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Receiving half of the intake queue, shared by every worker of a pool.
pub(crate) type Intake = Arc<Mutex<mpsc::Receiver<LogEvent>>>;

pub(crate) const ABANDONED_REASON: &str = "abandoned: indexer close deadline elapsed before shipment";

/// Events accumulated by one worker since its last flush.
#[derive(Debug, Default)]
pub(crate) struct Batch {
    items: Vec<BulkItem>,
    bytes: usize,
}

impl Batch {
    pub(crate) fn push(&mut self, item: BulkItem) {
        self.bytes += item.body.len();
        self.items.push(item);
    }

    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn take(&mut self) -> Vec<BulkItem> {
        self.bytes = 0;
        std::mem::take(&mut self.items)
    }
}

/// One member of the pool. Owns its batch exclusively; the only state
/// shared with other workers is the intake queue.
pub(crate) struct Worker {
    id: usize,
    intake: Intake,
    shared: Arc<Shared>,
    abort: CancellationToken,
}

impl Worker {
    pub(crate) fn new(id: usize, intake: Intake, shared: Arc<Shared>, abort: CancellationToken) -> Self {
        Worker {
            id,
            intake,
            shared,
            abort,
        }
    }

    /// Pull events until the intake closes, shipping whenever the flush
    /// policy says so. A final partial batch is flushed on the way out.
    pub(crate) async fn run(self) {
        let policy = self.shared.policy;
        let mut batch = Batch::default();
        let mut last_flush = Instant::now();

        loop {
            let deadline = last_flush + policy.max_interval();

            tokio::select! {
                biased;

                _ = self.abort.cancelled() => {
                    self.abandon(batch.take());
                    self.abandon_queued().await;
                    return;
                }
                next = next_event(&self.intake) => match next {
                    Some(event) => {
                        let Some(item) = self.prepare(event) else {
                            continue;
                        };
                        if policy.would_overflow(batch.bytes(), item.body.len()) {
                            self.flush(&mut batch).await;
                            last_flush = Instant::now();
                        }
                        batch.push(item);
                        if policy.should_flush(batch.bytes(), last_flush.elapsed()) {
                            self.flush(&mut batch).await;
                            last_flush = Instant::now();
                        }
                    }
                    None => {
                        self.flush(&mut batch).await;
                        debug!(worker = self.id, "intake closed, worker stopping");
                        return;
                    }
                },
                _ = sleep_until(deadline) => {
                    self.flush(&mut batch).await;
                    last_flush = Instant::now();
                }
            }
        }
    }

    /// Assign the event its identity and serialize it. Events that fail
    /// to serialize are reported right away.
    fn prepare(&self, event: LogEvent) -> Option<BulkItem> {
        let id = DocumentId::generate();
        match event.to_bytes() {
            Ok(body) => Some(BulkItem { id, body }),
            Err(err) => {
                self.shared
                    .report_failure(id, &self.shared.index, format!("failed to serialize event: {err}"));
                None
            }
        }
    }

    async fn flush(&self, batch: &mut Batch) {
        if batch.is_empty() {
            return;
        }
        let bytes = batch.bytes();
        let items = batch.take();
        debug!(worker = self.id, items = items.len(), bytes, "flushing batch");
        self.shared.counters.record_request();

        let shipped = tokio::select! {
            biased;
            result = self.shared.sink.ship_batch(&self.shared.index, &items) => Some(result),
            _ = self.abort.cancelled() => None,
        };

        match shipped {
            Some(Ok(outcomes)) => self.shared.dispatch(&items, outcomes),
            Some(Err(err)) => {
                error!(worker = self.id, items = items.len(), error = %err, "bulk request failed");
                self.shared
                    .fail_all(&items, &format!("bulk request failed: {err}"));
            }
            None => self.abandon(items),
        }
    }

    fn abandon(&self, items: Vec<BulkItem>) {
        if !items.is_empty() {
            debug!(worker = self.id, items = items.len(), "abandoning batch");
            self.shared.fail_all(&items, ABANDONED_REASON);
        }
    }

    /// Resolve whatever is still queued as failed. The queue is closed
    /// first so no sender can slip an event in behind the drain.
    async fn abandon_queued(&self) {
        let mut intake = self.intake.lock().await;
        intake.close();
        while let Ok(_event) = intake.try_recv() {
            self.shared
                .report_failure(DocumentId::generate(), &self.shared.index, ABANDONED_REASON);
        }
    }
}

async fn next_event(intake: &Intake) -> Option<LogEvent> {
    intake.lock().await.recv().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(len: usize) -> BulkItem {
        BulkItem {
            id: DocumentId::generate(),
            body: vec![b'x'; len],
        }
    }

    #[test]
    fn batch_tracks_serialized_size() {
        let mut batch = Batch::default();
        assert!(batch.is_empty());

        batch.push(item(100));
        batch.push(item(28));
        assert_eq!(batch.bytes(), 128);

        let items = batch.take();
        assert_eq!(items.len(), 2);
        assert!(batch.is_empty());
        assert_eq!(batch.bytes(), 0);
    }

    #[test]
    fn batch_preserves_arrival_order() {
        let mut batch = Batch::default();
        let first = item(1);
        let second = item(2);
        batch.push(first.clone());
        batch.push(second.clone());
        assert_eq!(batch.take(), vec![first, second]);
    }
}
