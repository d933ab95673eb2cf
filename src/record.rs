use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Contextual key/value pairs bound to a channel and merged into every
/// event it emits.
pub type Fields = BTreeMap<String, Value>;

// Keys owned by the event itself; context fields with these names are
// overwritten when the event is built.
pub const LEVEL_KEY: &str = "level";
pub const MESSAGE_KEY: &str = "message";
pub const TIMESTAMP_KEY: &str = "@timestamp";

/// Fixed second-precision layout, always rendered in UTC.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Severity of a [`LogEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structured log record ready for indexing.
///
/// Serializes as a flat JSON object: the bound context fields plus
/// `level`, `message` and `@timestamp`. Built-in keys always win over
/// context keys with the same name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LogEvent {
    fields: Fields,
}

impl LogEvent {
    /// Build an event stamped with the current time.
    pub fn build(context: &Fields, level: LogLevel, message: impl Into<String>) -> Self {
        Self::build_at(context, level, message, Utc::now())
    }

    /// Build an event stamped with `at`.
    ///
    /// Context fields are copied first and the built-in fields are
    /// inserted afterwards, so a caller cannot shadow `level`, `message`
    /// or `@timestamp`.
    pub fn build_at(
        context: &Fields,
        level: LogLevel,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        let mut fields = context.clone();
        fields.insert(LEVEL_KEY.to_string(), Value::from(level.as_str()));
        fields.insert(MESSAGE_KEY.to_string(), Value::String(message.into()));
        fields.insert(
            TIMESTAMP_KEY.to_string(),
            Value::String(at.format(TIMESTAMP_FORMAT).to_string()),
        );
        LogEvent { fields }
    }

    pub fn level(&self) -> Option<&str> {
        self.fields.get(LEVEL_KEY).and_then(Value::as_str)
    }

    pub fn message(&self) -> Option<&str> {
        self.fields.get(MESSAGE_KEY).and_then(Value::as_str)
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.fields.get(TIMESTAMP_KEY).and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// JSON document body as shipped to the backend.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.fields)
    }
}
