//! Host log forwarding.
//!
//! `core_runtime::logging` mirrors filtered `tracing` events into a
//! [`LoggerSink`] so a host can route engine logs into its own pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// One forwarded event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Module path of the emitting code, e.g. `core_sync::coordinator`
    pub target: String,
    pub message: String,
    /// Structured fields, values already redacted where required
    pub fields: BTreeMap<String, String>,
    /// Name of the innermost span, e.g. `sync_source`
    pub span: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: BTreeMap::new(),
            span: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Receives engine log events.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::logging::{LogEntry, LogLevel, LoggerSink};
///
/// async fn report(sink: &dyn LoggerSink) {
///     let entry = LogEntry::new(LogLevel::Warn, "core_sync", "Source rolled back")
///         .with_field("source_id", "3");
///     sink.log(entry).await.ok();
/// }
/// ```
#[async_trait::async_trait]
pub trait LoggerSink: Send + Sync {
    async fn log(&self, entry: LogEntry) -> Result<()>;

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Events below this level are not forwarded.
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}
