//! # Logging
//!
//! `tracing-subscriber` bootstrap for hosts embedding the sync engine.
//!
//! Our crates log at the configured level and `sqlx` at `warn`, unless a
//! custom `EnvFilter` directive string is given. Events that pass the filter
//! are written to stdout in the chosen [`LogFormat`] and, when a
//! [`LoggerSink`] is configured, mirrored to it as [`LogEntry`] values with
//! credential-like fields redacted.
//!
//! ```ignore
//! use bridge_traits::LogLevel;
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_level(LogLevel::Debug),
//! )?;
//! tracing::info!(source_id = 1, "Sync requested");
//! ```

use crate::error::{Error, Result};

use bridge_traits::{LogEntry, LogLevel, LoggerSink};
use core_async::runtime;

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::format::FmtSpan,
    layer::{Context, SubscriberExt},
    registry::{LookupSpan, Registry},
    util::SubscriberInitExt,
    Layer,
};

/// Targets logged at the configured level by the default filter
const ENGINE_TARGETS: [&str; 5] = [
    "library_sync",
    "core_runtime",
    "core_library",
    "core_sync",
    "bridge_desktop",
];

/// Field names whose values never leave the process unredacted
const SENSITIVE_FIELDS: [&str; 5] = ["password", "token", "secret", "credential", "authorization"];

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human readable
    Pretty,
    /// One JSON object per event
    Json,
    /// Single line per event
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// `EnvFilter` directives replacing the default per-crate filter
    pub filter: Option<String>,
    pub sink: Option<Arc<dyn LoggerSink>>,
    /// Redact sensitive field values forwarded to the sink
    pub redact: bool,
    /// Log span enter/exit (the coordinator instruments each source)
    pub span_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            sink: None,
            redact: true,
            span_events: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_redaction(mut self, redact: bool) -> Self {
        self.redact = redact;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// `Error::Config` if the filter does not parse or a global subscriber is
/// already installed.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let output: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_span_events(span_events)
            .with_writer(io::stdout)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_events(span_events)
            .with_writer(io::stdout)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_span_events(span_events)
            .with_writer(io::stdout)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .with(SinkLayer::new(config.sink.clone(), config.redact))
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {e}")))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directives = match &config.filter {
        Some(custom) => custom.clone(),
        None => {
            let level = config.level.as_str();
            let mut directives: Vec<String> = ENGINE_TARGETS
                .iter()
                .map(|target| format!("{target}={level}"))
                .collect();
            directives.push("sqlx=warn".to_string());
            directives.join(",")
        }
    };

    EnvFilter::try_new(&directives)
        .map_err(|e| Error::Config(format!("Invalid log filter '{directives}': {e}")))
}

/// Mirrors events into a [`LoggerSink`].
struct SinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
    redact: bool,
}

impl SinkLayer {
    fn new(sink: Option<Arc<dyn LoggerSink>>, redact: bool) -> Self {
        Self { sink, redact }
    }
}

impl<S> Layer<S> for SinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = &self.sink else {
            return;
        };

        let metadata = event.metadata();
        let level = log_level(*metadata.level());
        if level < sink.min_level() {
            return;
        }

        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);

        let mut entry = LogEntry::new(
            level,
            metadata.target(),
            visitor.message.unwrap_or_else(|| metadata.name().to_string()),
        );
        for (key, value) in visitor.fields {
            let value = if self.redact {
                redact_field(&key, value)
            } else {
                value
            };
            entry.fields.insert(key, value);
        }
        entry.span = ctx.lookup_current().map(|span| span.name().to_string());

        let sink = Arc::clone(sink);
        // Never block a runtime worker on the host sink
        if let Ok(handle) = runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = sink.log(entry).await {
                    eprintln!("log sink error: {e}");
                }
            });
        } else if let Err(e) = runtime::block_on(async move { sink.log(entry).await }) {
            eprintln!("log sink error: {e}");
        }
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: BTreeMap<String, String>,
}

impl FieldCollector {
    fn insert(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{value:?}"));
    }
}

fn log_level(level: tracing::Level) -> LogLevel {
    match level {
        tracing::Level::TRACE => LogLevel::Trace,
        tracing::Level::DEBUG => LogLevel::Debug,
        tracing::Level::INFO => LogLevel::Info,
        tracing::Level::WARN => LogLevel::Warn,
        tracing::Level::ERROR => LogLevel::Error,
    }
}

/// Replace the value of a credential-like field.
///
/// Source connection strings may carry credentials in the URL userinfo
/// (`user:secret@host`); the userinfo part is masked as well.
pub fn redact_field(name: &str, value: String) -> String {
    let name = name.to_ascii_lowercase();
    if SENSITIVE_FIELDS.iter().any(|s| name.contains(s)) {
        return REDACTED.to_string();
    }

    match value.split_once("://") {
        Some((scheme, rest)) => match rest.split_once('@') {
            Some((_, host)) => format!("{scheme}://{REDACTED}@{host}"),
            None => value,
        },
        None => value,
    }
}
