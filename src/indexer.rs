use crate::error::{CloseError, ConfigurationError, EnqueueError};
use crate::flush::FlushPolicy;
use crate::identity::DocumentId;
use crate::init::Config;
use crate::record::LogEvent;
use crate::sink::{BulkItem, BulkSink, FailureRecord, ItemOutcome};
use crate::worker::Worker;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Called once for every item the backend rejected or that could not be
/// shipped. Invoked concurrently from several workers.
pub type OnFailure = Arc<dyn Fn(FailureRecord) + Send + Sync>;

/// Called once for every item the backend accepted. Invoked concurrently
/// from several workers.
pub type OnSuccess = Arc<dyn Fn(&DocumentId) + Send + Sync>;

/// Snapshot of the indexer's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexerStats {
    /// Events accepted into the intake queue.
    pub num_added: u64,
    /// Items the backend acknowledged.
    pub num_indexed: u64,
    /// Items resolved to the failure callback.
    pub num_failed: u64,
    /// Bulk requests issued to the sink.
    pub num_requests: u64,
    /// Events refused by `try_add` because the queue was full.
    pub num_rejected: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    added: AtomicU64,
    indexed: AtomicU64,
    failed: AtomicU64,
    requests: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> IndexerStats {
        IndexerStats {
            num_added: self.added.load(Ordering::Relaxed),
            num_indexed: self.indexed.load(Ordering::Relaxed),
            num_failed: self.failed.load(Ordering::Relaxed),
            num_requests: self.requests.load(Ordering::Relaxed),
            num_rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Immutable state every worker reads: the sink, the target index, the
/// flush policy and the caller's callbacks.
pub(crate) struct Shared {
    pub(crate) sink: Arc<dyn BulkSink>,
    pub(crate) index: String,
    pub(crate) policy: FlushPolicy,
    pub(crate) counters: Counters,
    on_failure: Option<OnFailure>,
    on_success: Option<OnSuccess>,
}

impl Shared {
    pub(crate) fn report_success(&self, id: &DocumentId) {
        self.counters.indexed.fetch_add(1, Ordering::Relaxed);
        if let Some(on_success) = &self.on_success {
            on_success(id);
        }
    }

    pub(crate) fn report_failure(&self, id: DocumentId, index: &str, reason: impl Into<String>) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        let record = FailureRecord {
            index: index.to_string(),
            reason: reason.into(),
            document_id: id,
        };
        match &self.on_failure {
            Some(on_failure) => on_failure(record),
            None => warn!(
                index = %record.index,
                document_id = %record.document_id,
                reason = %record.reason,
                "failed to index log event"
            ),
        }
    }

    pub(crate) fn fail_all(&self, items: &[BulkItem], reason: &str) {
        for item in items {
            self.report_failure(item.id, &self.index, reason);
        }
    }

    /// Route the sink's per-item answers to the callbacks. Every item of
    /// the batch resolves exactly once; items the sink did not answer for
    /// count as failed.
    pub(crate) fn dispatch(&self, items: &[BulkItem], outcomes: Vec<ItemOutcome>) {
        let mut pending: HashSet<DocumentId> = items.iter().map(|item| item.id).collect();

        for outcome in outcomes {
            if !pending.remove(&outcome.id) {
                warn!(document_id = %outcome.id, "sink reported an unknown or duplicate item");
                continue;
            }
            match outcome.result {
                Ok(()) => self.report_success(&outcome.id),
                Err(reason) => self.report_failure(outcome.id, &outcome.index, reason),
            }
        }

        for item in items {
            if pending.remove(&item.id) {
                self.report_failure(item.id, &self.index, "no result returned by sink");
            }
        }
    }
}

/// Bulk indexer owning the intake queue and the worker pool.
///
/// Events go into a bounded queue shared by `num_workers` Tokio tasks.
/// Each task builds its own batch and ships it through the [`BulkSink`]
/// when the [`FlushPolicy`] trips, then routes the per-item results to the
/// configured callbacks.
pub struct BatchIndexer {
    sender: RwLock<Option<mpsc::Sender<LogEvent>>>,
    // Stays populated until a close has joined every worker, so a close
    // future dropped midway leaves the pool for the next close to finish.
    workers: tokio::sync::Mutex<Option<JoinSet<()>>>,
    abort: CancellationToken,
    shared: Arc<Shared>,
}

impl BatchIndexer {
    /// Validate `config`, resolve its backend and spawn the workers on the
    /// current Tokio runtime.
    pub fn start(config: Config) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let policy = FlushPolicy::new(config.flush_bytes, config.flush_interval)?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ConfigurationError::NoRuntime);
        }
        let sink = config.connection.into_sink()?;

        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let intake = Arc::new(tokio::sync::Mutex::new(receiver));
        let shared = Arc::new(Shared {
            sink,
            index: config.index,
            policy,
            counters: Counters::default(),
            on_failure: config.on_failure,
            on_success: config.on_success,
        });
        let abort = CancellationToken::new();

        let mut workers = JoinSet::new();
        for id in 0..config.num_workers {
            let worker = Worker::new(id, Arc::clone(&intake), Arc::clone(&shared), abort.clone());
            workers.spawn(worker.run());
        }
        debug!(
            index = %shared.index,
            workers = config.num_workers,
            flush_bytes = policy.max_bytes(),
            flush_interval = ?policy.max_interval(),
            "bulk indexer started"
        );

        Ok(BatchIndexer {
            sender: RwLock::new(Some(sender)),
            workers: tokio::sync::Mutex::new(Some(workers)),
            abort,
            shared,
        })
    }

    /// Queue an event for indexing.
    ///
    /// Waits only while the intake queue is full; never waits on the
    /// network. Fails with [`EnqueueError::Closed`] once the indexer has
    /// been closed.
    pub async fn add(&self, event: LogEvent) -> Result<(), EnqueueError> {
        let sender = self.sender()?;
        sender.send(event).await.map_err(|_| EnqueueError::Closed)?;
        self.shared.counters.added.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Queue an event without waiting for room.
    pub fn try_add(&self, event: LogEvent) -> Result<(), EnqueueError> {
        let sender = self.sender()?;
        match sender.try_send(event) {
            Ok(()) => {
                self.shared.counters.added.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(EnqueueError::Full)
            }
            Err(TrySendError::Closed(_)) => Err(EnqueueError::Closed),
        }
    }

    /// Stop accepting events and drain the pool.
    ///
    /// Workers flush whatever they hold and the call returns once every
    /// accepted event has been resolved. If that takes longer than
    /// `timeout`, in-flight shipments are cut short, every pending item
    /// goes to the failure callback, and [`CloseError::Timeout`] is
    /// returned. Closing an already closed indexer is a no-op.
    ///
    /// Dropping the returned future before it completes does not lose
    /// events: the workers keep draining and a later `close` waits for
    /// them.
    pub async fn close(&self, timeout: Duration) -> Result<(), CloseError> {
        drop(
            self.sender
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let mut slot = self.workers.lock().await;
        let Some(workers) = slot.as_mut() else {
            return Ok(());
        };

        let drained = tokio::time::timeout(timeout, join_workers(workers))
            .await
            .is_ok();
        if !drained {
            warn!(?timeout, "bulk indexer did not drain in time, abandoning pending items");
            self.abort.cancel();
            join_workers(workers).await;
        }
        *slot = None;

        if drained {
            debug!(index = %self.shared.index, "bulk indexer closed");
            Ok(())
        } else {
            Err(CloseError::Timeout { timeout })
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub fn index(&self) -> &str {
        &self.shared.index
    }

    pub fn stats(&self) -> IndexerStats {
        self.shared.counters.snapshot()
    }

    fn sender(&self) -> Result<mpsc::Sender<LogEvent>, EnqueueError> {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(EnqueueError::Closed)
    }
}

impl Drop for BatchIndexer {
    fn drop(&mut self) {
        // Without an explicit close the workers keep draining in the
        // background once the sender is gone.
        if let Some(mut workers) = self.workers.get_mut().take() {
            workers.detach_all();
        }
    }
}

async fn join_workers(workers: &mut JoinSet<()>) {
    while let Some(result) = workers.join_next().await {
        if let Err(err) = result {
            error!(error = %err, "indexer worker terminated abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::Connection;
    use crate::noop_sink::NoopSink;
    use std::sync::Mutex;

    fn config() -> Config {
        Config {
            connection: Connection::Sink(Arc::new(NoopSink)),
            index: "logs".to_string(),
            flush_bytes: 1024,
            flush_interval: Duration::from_millis(50),
            num_workers: 2,
            queue_capacity: 16,
            ..Config::default()
        }
    }

    fn event(message: &str) -> LogEvent {
        LogEvent::build(&Default::default(), crate::record::LogLevel::Info, message)
    }

    #[tokio::test]
    async fn add_after_close_is_rejected() {
        let indexer = BatchIndexer::start(config()).unwrap();
        indexer.add(event("before")).await.unwrap();
        indexer.close(Duration::from_secs(5)).await.unwrap();

        assert!(indexer.is_closed());
        assert_eq!(indexer.add(event("after")).await, Err(EnqueueError::Closed));
        assert_eq!(indexer.try_add(event("after")), Err(EnqueueError::Closed));

        let stats = indexer.stats();
        assert_eq!(stats.num_added, 1);
        assert_eq!(stats.num_indexed, 1);
    }

    #[tokio::test]
    async fn close_twice_is_a_no_op() {
        let indexer = BatchIndexer::start(config()).unwrap();
        indexer.close(Duration::from_secs(5)).await.unwrap();
        indexer.close(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_invalid_pool_size() {
        let result = BatchIndexer::start(Config {
            num_workers: 0,
            ..config()
        });
        assert!(matches!(result, Err(ConfigurationError::NoWorkers)));
    }

    #[test]
    fn start_requires_a_runtime() {
        let result = BatchIndexer::start(config());
        assert!(matches!(result, Err(ConfigurationError::NoRuntime)));
    }

    #[test]
    fn dispatch_resolves_every_item_once() {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let failures_cb = Arc::clone(&failures);
        let shared = Shared {
            sink: Arc::new(NoopSink),
            index: "logs".to_string(),
            policy: FlushPolicy::new(1, Duration::from_secs(1)).unwrap(),
            counters: Counters::default(),
            on_failure: Some(Arc::new(move |record: FailureRecord| {
                failures_cb.lock().unwrap().push(record);
            })),
            on_success: None,
        };
        let items: Vec<BulkItem> = (0..3)
            .map(|_| BulkItem {
                id: DocumentId::generate(),
                body: b"{}".to_vec(),
            })
            .collect();

        shared.dispatch(
            &items,
            vec![
                ItemOutcome::indexed(items[0].id, "logs"),
                ItemOutcome::indexed(items[0].id, "logs"),
                ItemOutcome::rejected(items[1].id, "logs-000001", "mapper_parsing_exception"),
                ItemOutcome::indexed(DocumentId::generate(), "logs"),
            ],
        );

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].index, "logs-000001");
        assert_eq!(failures[0].reason, "mapper_parsing_exception");
        assert_eq!(failures[0].document_id, items[1].id);
        assert_eq!(failures[1].document_id, items[2].id);
        assert_eq!(failures[1].reason, "no result returned by sink");

        let stats = shared.counters.snapshot();
        assert_eq!(stats.num_indexed, 1);
        assert_eq!(stats.num_failed, 2);
    }
}
