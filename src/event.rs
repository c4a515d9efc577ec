//! Event model: leveled, structured log events and exception chains.
//!
//! Everything here is pure construction. Events are immutable once built;
//! the `with_*` builder methods consume and return the event so ambient
//! context can be applied before per-call fields.

use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::error::Error;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured data attached to events and ambient contexts.
pub type Fields = HashMap<String, serde_json::Value>;

/// Log severity levels, totally ordered from least to most severe.
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
    /// Get all log levels in ascending severity order.
    pub fn all() -> &'static [LogLevel] {
        &[
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warning,
            LogLevel::Error,
            LogLevel::Fatal,
        ]
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Fatal => write!(f, "fatal"),
        }
    }
}

/// Error returned when a level string does not map onto the five-level scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError {
    pub input: String,
}

impl std::fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown log level '{}'", self.input)
    }
}

impl std::error::Error for ParseLevelError {}

impl std::str::FromStr for LogLevel {
    type Err = ParseLevelError;

    /// Parse a level name, accepting the aliases common in third-party
    /// logging front-ends. Severities outside the five-level scale clamp
    /// to the nearest level (`trace` to debug, `critical` to fatal), which
    /// preserves relative ordering.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" | "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "fatal" | "critical" => Ok(LogLevel::Fatal),
            _ => Err(ParseLevelError {
                input: s.to_string(),
            }),
        }
    }
}

impl From<tracing::Level> for LogLevel {
    /// Map the `tracing` severity scale onto the five-level scale,
    /// preserving relative ordering. TRACE has no counterpart and clamps
    /// to debug.
    fn from(level: tracing::Level) -> Self {
        if level == tracing::Level::ERROR {
            LogLevel::Error
        } else if level == tracing::Level::WARN {
            LogLevel::Warning
        } else if level == tracing::Level::INFO {
            LogLevel::Info
        } else {
            LogLevel::Debug
        }
    }
}

/// A captured exception chain.
///
/// `kind` is a classification tag derived from the error's `Debug`
/// representation; a trait object carries no recoverable type name, so the
/// leading identifier of the debug form is the only portable tag. The stack
/// trace is captured when the record is built, not where the error was
/// created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub stack_trace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner: Option<Box<ExceptionRecord>>,
}

impl ExceptionRecord {
    /// Capture an error and its cause chain as a linked record.
    ///
    /// The chain follows `Error::source` until a cause with no further
    /// source is reached. Revisiting an error already seen in this walk
    /// stops the chain instead of looping.
    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        let stack_trace = Backtrace::force_capture().to_string();

        let mut seen: Vec<*const ()> = Vec::new();
        let mut chain: Vec<(String, String)> = Vec::new();
        let mut current: Option<&(dyn Error + 'static)> = Some(err);

        while let Some(cause) = current {
            let identity = cause as *const dyn Error as *const ();
            if seen.contains(&identity) {
                break;
            }
            seen.push(identity);
            chain.push((classify(cause), cause.to_string()));
            current = cause.source();
        }

        // Fold the chain back-to-front into nested records.
        let mut record: Option<ExceptionRecord> = None;
        for (kind, message) in chain.into_iter().rev() {
            record = Some(ExceptionRecord {
                kind,
                message,
                stack_trace: stack_trace.clone(),
                inner: record.take().map(Box::new),
            });
        }

        record.unwrap_or(ExceptionRecord {
            kind: "Error".to_string(),
            message: String::new(),
            stack_trace,
            inner: None,
        })
    }

    /// Number of records in the chain, including this one.
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self.inner.as_deref();
        while let Some(record) = current {
            depth += 1;
            current = record.inner.as_deref();
        }
        depth
    }
}

/// Derive a classification tag from an error's `Debug` representation.
fn classify(err: &(dyn Error + 'static)) -> String {
    let debug_repr = format!("{:?}", err);
    let tag: String = debug_repr
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == ':')
        .collect();

    if tag.is_empty() {
        "Error".to_string()
    } else {
        tag
    }
}

/// A single structured log event.
///
/// Events are assigned a unique id and a UTC capture timestamp at creation
/// and are immutable afterwards. Field merges are last-write-wins, so
/// applying ambient context before per-call fields gives per-call fields
/// precedence on key collision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// Unique event id, generated at creation
    pub id: Uuid,

    /// Capture time, UTC
    pub timestamp: DateTime<Utc>,

    /// Severity level
    pub level: LogLevel,

    /// Log message content
    pub message: String,

    /// Structured data merged from ambient context and per-call fields
    pub fields: Fields,

    /// Optional captured exception chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionRecord>,
}

impl LogEvent {
    /// Create a new event with the given level and message.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
            fields: Fields::new(),
            exception: None,
        }
    }

    /// Overlay structured fields onto the event, last write wins.
    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Set a single structured field.
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Attach an error and its cause chain to the event.
    pub fn with_exception(mut self, err: &(dyn Error + 'static)) -> Self {
        self.exception = Some(ExceptionRecord::from_error(err));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[derive(Debug)]
    struct LeafError;

    impl std::fmt::Display for LeafError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "leaf failure")
        }
    }

    impl Error for LeafError {}

    #[derive(Debug)]
    struct WrapError {
        inner: LeafError,
    }

    impl std::fmt::Display for WrapError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "wrapped failure")
        }
    }

    impl Error for WrapError {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.inner)
        }
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Fatal);
    }

    #[test]
    fn test_level_display_roundtrip() {
        for level in LogLevel::all() {
            let parsed = LogLevel::from_str(&level.to_string()).unwrap();
            assert_eq!(parsed, *level);
        }
    }

    #[test]
    fn test_level_aliases_preserve_order() {
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("warn").unwrap(), LogLevel::Warning);
        assert_eq!(LogLevel::from_str("CRITICAL").unwrap(), LogLevel::Fatal);
        assert!(LogLevel::from_str("verbose").is_err());
    }

    #[test]
    fn test_level_from_tracing() {
        assert_eq!(LogLevel::from(tracing::Level::TRACE), LogLevel::Debug);
        assert_eq!(LogLevel::from(tracing::Level::INFO), LogLevel::Info);
        assert_eq!(LogLevel::from(tracing::Level::WARN), LogLevel::Warning);
        assert_eq!(LogLevel::from(tracing::Level::ERROR), LogLevel::Error);
    }

    #[test]
    fn test_level_serializes_lowercase() {
        assert_eq!(json!(LogLevel::Warning), json!("warning"));
        assert_eq!(json!(LogLevel::Fatal), json!("fatal"));
    }

    #[test]
    fn test_event_ids_unique() {
        let a = LogEvent::new(LogLevel::Info, "first");
        let b = LogEvent::new(LogLevel::Info, "second");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_field_merge_last_write_wins() {
        let ambient = Fields::from([
            ("service".to_string(), json!("api")),
            ("region".to_string(), json!("eu-west")),
        ]);
        let per_call = Fields::from([("region".to_string(), json!("us-east"))]);

        let event = LogEvent::new(LogLevel::Info, "request handled")
            .with_fields(ambient)
            .with_fields(per_call);

        assert_eq!(event.fields["service"], json!("api"));
        assert_eq!(event.fields["region"], json!("us-east"));
    }

    #[test]
    fn test_exception_chain_depth_matches_cause_chain() {
        let err = WrapError { inner: LeafError };
        let record = ExceptionRecord::from_error(&err);

        assert_eq!(record.depth(), 2);
        assert_eq!(record.message, "wrapped failure");
        assert_eq!(record.kind, "WrapError");

        let inner = record.inner.as_deref().unwrap();
        assert_eq!(inner.message, "leaf failure");
        assert_eq!(inner.kind, "LeafError");
        assert!(inner.inner.is_none());
    }

    #[test]
    fn test_exception_serializes_type_tag() {
        let err = LeafError;
        let event = LogEvent::new(LogLevel::Error, "boom").with_exception(&err);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["exception"]["type"], json!("LeafError"));
        assert_eq!(value["exception"]["message"], json!("leaf failure"));
        assert!(value["exception"].get("inner").is_none());
    }

    #[test]
    fn test_event_without_exception_omits_field() {
        let event = LogEvent::new(LogLevel::Debug, "quiet");
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("exception").is_none());
        assert!(value.get("id").is_some());
        assert!(value.get("timestamp").is_some());
    }
}
