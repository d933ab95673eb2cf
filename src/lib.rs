pub mod record;
pub mod identity;
pub mod flush;
pub mod sink;
pub mod indexer;
pub mod channel;
pub mod error;

mod worker;

#[cfg(feature = "opensearch")]
pub mod opensearch;

pub mod backend;
pub mod env;
pub mod init;
pub mod noop_sink;

pub use channel::TelemetryChannel;
pub use error::{CloseError, ConfigurationError, EnqueueError};
pub use indexer::{BatchIndexer, IndexerStats};
pub use init::{Config, Connection};
pub use record::{Fields, LogEvent, LogLevel};
pub use sink::{BulkItem, BulkSink, FailureRecord, ItemOutcome};
