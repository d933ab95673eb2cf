use crate::error::{CloseError, ConfigurationError, EnqueueError};
use crate::indexer::{BatchIndexer, IndexerStats};
use crate::init::Config;
use crate::record::{Fields, LogEvent, LogLevel};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Target of the console mirror events.
pub const CONSOLE_TARGET: &str = "bulk_log_sink::console";

/// Caller-facing logging handle.
///
/// A channel carries an immutable set of context fields and forwards
/// every event to a shared [`BatchIndexer`]. Cloning and
/// [`with_fields`](Self::with_fields) are cheap; derived channels never
/// modify their parent's context, so parent and children can be used
/// concurrently.
///
/// ```no_run
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// use bulk_log_sink::{Config, TelemetryChannel};
///
/// let log = TelemetryChannel::new(Config::default())?;
/// let auth = log.with_fields([("service", "auth")]);
/// auth.info("user logged in").await?;
/// log.close(std::time::Duration::from_secs(5)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TelemetryChannel {
    indexer: Arc<BatchIndexer>,
    fields: Arc<Fields>,
    console: bool,
}

impl TelemetryChannel {
    /// Start an indexer from `config` and wrap it in a channel with an
    /// empty context. Must be called from within a Tokio runtime.
    pub fn new(config: Config) -> Result<Self, ConfigurationError> {
        let console = config.console;
        let indexer = BatchIndexer::start(config)?;
        Ok(Self {
            indexer: Arc::new(indexer),
            fields: Arc::new(Fields::new()),
            console,
        })
    }

    /// Wrap an already running indexer. `console` turns the console
    /// mirror on or off for this channel and the channels derived from it.
    pub fn from_indexer(indexer: Arc<BatchIndexer>, console: bool) -> Self {
        Self {
            indexer,
            fields: Arc::new(Fields::new()),
            console,
        }
    }

    /// Derive a channel whose context is this channel's context with
    /// `fields` merged on top. `self` is left untouched.
    pub fn with_fields<I, K, V>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut merged = Fields::clone(&self.fields);
        merged.extend(fields.into_iter().map(|(k, v)| (k.into(), v.into())));
        Self {
            indexer: Arc::clone(&self.indexer),
            fields: Arc::new(merged),
            console: self.console,
        }
    }

    /// Toggle the console mirror for this channel and its descendants.
    pub fn with_console(&self, console: bool) -> Self {
        Self {
            console,
            ..self.clone()
        }
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn indexer(&self) -> &BatchIndexer {
        &self.indexer
    }

    /// Build an event at `level` and queue it. Waits only if the intake
    /// queue is full; never waits for the event to be shipped.
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) -> Result<(), EnqueueError> {
        let event = self.event(level, message.into());
        self.indexer.add(event).await
    }

    /// Like [`log`](Self::log) but fails with [`EnqueueError::Full`]
    /// instead of waiting for room.
    pub fn try_log(&self, level: LogLevel, message: impl Into<String>) -> Result<(), EnqueueError> {
        let event = self.event(level, message.into());
        self.indexer.try_add(event)
    }

    pub async fn debug(&self, message: impl Into<String>) -> Result<(), EnqueueError> {
        self.log(LogLevel::Debug, message).await
    }

    pub async fn info(&self, message: impl Into<String>) -> Result<(), EnqueueError> {
        self.log(LogLevel::Info, message).await
    }

    pub async fn warn(&self, message: impl Into<String>) -> Result<(), EnqueueError> {
        self.log(LogLevel::Warning, message).await
    }

    pub async fn error(&self, message: impl Into<String>) -> Result<(), EnqueueError> {
        self.log(LogLevel::Error, message).await
    }

    /// Queue a `fatal` event. Does not terminate the process.
    pub async fn fatal(&self, message: impl Into<String>) -> Result<(), EnqueueError> {
        self.log(LogLevel::Fatal, message).await
    }

    /// Close the shared indexer. Affects every channel derived from the
    /// same root.
    pub async fn close(&self, timeout: Duration) -> Result<(), CloseError> {
        self.indexer.close(timeout).await
    }

    pub fn stats(&self) -> IndexerStats {
        self.indexer.stats()
    }

    fn event(&self, level: LogLevel, message: String) -> LogEvent {
        if self.console {
            mirror_to_console(level, &message);
        }
        LogEvent::build(&self.fields, level, message)
    }
}

fn mirror_to_console(level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!(target: CONSOLE_TARGET, "{}", message),
        LogLevel::Info => tracing::info!(target: CONSOLE_TARGET, "{}", message),
        LogLevel::Warning => tracing::warn!(target: CONSOLE_TARGET, "{}", message),
        LogLevel::Error => tracing::error!(target: CONSOLE_TARGET, "{}", message),
        LogLevel::Fatal => tracing::error!(target: CONSOLE_TARGET, fatal = true, "{}", message),
    }
}
