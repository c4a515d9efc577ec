//! Named logger handle: builds events and routes them to the transport.
//!
//! A logger snapshots its configuration at construction time. Later
//! registry-level reconfiguration affects only loggers created afterwards;
//! existing handles keep shipping with the settings they were built with.

use std::error::Error;
use std::sync::{Arc, RwLock};

use reqwest::Method;
use tracing::{debug, warn};

use crate::batcher::Batcher;
use crate::config::{Config, ConfigError, DEFAULT_NAMESPACE};
use crate::event::{Fields, LogEvent, LogLevel};
use crate::transport::{Transport, TransportError};

/// A named producer of log events.
///
/// Every event carries the logger's ambient context (lowest precedence),
/// then per-call fields, then an optional exception chain. How an event
/// leaves the process depends on the configuration snapshot:
///
/// - async off: the caller awaits the delivery attempt, retries included,
///   and receives any transport error;
/// - async on, batching off: a single-event send is spawned and the caller
///   never observes the outcome;
/// - async on, batching on: the event joins the per-logger batch
///   accumulator.
///
/// Failures on the asynchronous paths never reach the caller; they are
/// reported through `tracing` only.
pub struct Logger {
    /// Registry key, immutable after creation
    name: String,

    /// Configuration snapshot taken at construction
    config: Config,

    transport: Arc<Transport>,

    /// Ambient context, replaced wholesale by `set_context`
    context: RwLock<Fields>,

    /// Present only when batching is active
    batcher: Option<Batcher>,

    /// Request path for single-event sends
    event_path: String,
}

impl Logger {
    /// Create a logger with its own configuration snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the name is empty or the configuration is
    /// invalid.
    pub fn new(name: impl Into<String>, config: Config) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::new("logger name must not be empty"));
        }

        let transport = Arc::new(Transport::new(&config)?);

        let event_path = event_path(&config.namespace, &name);
        let batch_path = format!("{}/batch", event_path);

        let batcher = if config.batching_active() {
            Some(Batcher::new(&config, Arc::clone(&transport), batch_path))
        } else {
            None
        };

        Ok(Self {
            name,
            config,
            transport,
            context: RwLock::new(Fields::new()),
            batcher,
            event_path,
        })
    }

    /// Log a message at the given level.
    ///
    /// Builds the event from ambient context, then `fields` (which win on
    /// key collision), then the optional exception chain, and routes it
    /// per the dispatch policy above.
    ///
    /// # Errors
    ///
    /// Only when asynchronous sending is disabled; the asynchronous paths
    /// always return `Ok(())`.
    pub async fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        fields: Option<Fields>,
        exception: Option<&(dyn Error + Send + Sync + 'static)>,
    ) -> Result<(), TransportError> {
        let event = self.build_event(level, message.into(), fields, exception);

        if !self.config.async_enabled {
            return self.send_single(&event).await;
        }

        if let Some(batcher) = &self.batcher {
            batcher.enqueue(event);
            return Ok(());
        }

        // Async without batching: one spawned send per event
        let transport = Arc::clone(&self.transport);
        let path = self.event_path.clone();
        let debug_enabled = self.config.debug_enabled;
        let name = self.name.clone();

        tokio::spawn(async move {
            match serde_json::to_string(&event) {
                Ok(body) => {
                    if let Err(e) = transport.send(Method::POST, &path, Some(body)).await {
                        report_send_failure(debug_enabled, &name, &e);
                    }
                }
                Err(e) => {
                    let err = TransportError::Serialize(e.to_string());
                    report_send_failure(debug_enabled, &name, &err);
                }
            }
        });

        Ok(())
    }

    /// Log a debug message.
    pub async fn debug(
        &self,
        message: impl Into<String>,
        fields: Option<Fields>,
        exception: Option<&(dyn Error + Send + Sync + 'static)>,
    ) -> Result<(), TransportError> {
        self.log(LogLevel::Debug, message, fields, exception).await
    }

    /// Log an info message.
    pub async fn info(
        &self,
        message: impl Into<String>,
        fields: Option<Fields>,
        exception: Option<&(dyn Error + Send + Sync + 'static)>,
    ) -> Result<(), TransportError> {
        self.log(LogLevel::Info, message, fields, exception).await
    }

    /// Log a warning message.
    pub async fn warning(
        &self,
        message: impl Into<String>,
        fields: Option<Fields>,
        exception: Option<&(dyn Error + Send + Sync + 'static)>,
    ) -> Result<(), TransportError> {
        self.log(LogLevel::Warning, message, fields, exception).await
    }

    /// Log an error message.
    pub async fn error(
        &self,
        message: impl Into<String>,
        fields: Option<Fields>,
        exception: Option<&(dyn Error + Send + Sync + 'static)>,
    ) -> Result<(), TransportError> {
        self.log(LogLevel::Error, message, fields, exception).await
    }

    /// Log a fatal message.
    pub async fn fatal(
        &self,
        message: impl Into<String>,
        fields: Option<Fields>,
        exception: Option<&(dyn Error + Send + Sync + 'static)>,
    ) -> Result<(), TransportError> {
        self.log(LogLevel::Fatal, message, fields, exception).await
    }

    /// Replace the ambient context wholesale. Previous keys are gone.
    pub fn set_context(&self, context: Fields) {
        let mut guard = match self.context.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = context;
    }

    /// Force the batch accumulator to drain.
    ///
    /// Draining is synchronous; the resulting send completes on its own
    /// task. A no-op when batching is inactive or nothing is pending.
    pub fn flush(&self) {
        if let Some(batcher) = &self.batcher {
            batcher.flush();
        }
    }

    /// Get the logger's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration snapshot this logger was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Snapshot of the current ambient context.
    pub fn context(&self) -> Fields {
        match self.context.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of events waiting in the batch accumulator.
    pub fn pending_events(&self) -> usize {
        self.batcher.as_ref().map(Batcher::pending).unwrap_or(0)
    }

    /// Build the outgoing event: ambient context first, per-call fields
    /// override, then the exception chain.
    fn build_event(
        &self,
        level: LogLevel,
        message: String,
        fields: Option<Fields>,
        exception: Option<&(dyn Error + Send + Sync + 'static)>,
    ) -> LogEvent {
        let ambient = self.context();

        let mut event = LogEvent::new(level, message).with_fields(ambient);

        if let Some(fields) = fields {
            event = event.with_fields(fields);
        }

        if let Some(err) = exception {
            event = event.with_exception(err);
        }

        event
    }

    /// Serialize and deliver one event in-line, surfacing the outcome.
    async fn send_single(&self, event: &LogEvent) -> Result<(), TransportError> {
        let body =
            serde_json::to_string(event).map_err(|e| TransportError::Serialize(e.to_string()))?;

        self.transport
            .send(Method::POST, &self.event_path, Some(body))
            .await?;

        Ok(())
    }
}

/// Request path for a single event: `[/{namespace}]/logs/{name}`, with
/// the default namespace elided and the name percent-encoded.
fn event_path(namespace: &str, name: &str) -> String {
    let encoded = urlencoding::encode(name);

    if namespace.is_empty() || namespace == DEFAULT_NAMESPACE {
        format!("/logs/{}", encoded)
    } else {
        format!("/{}/logs/{}", namespace, encoded)
    }
}

/// Diagnostic for a swallowed asynchronous delivery failure.
fn report_send_failure(debug_enabled: bool, logger: &str, err: &TransportError) {
    if debug_enabled {
        warn!(logger, error = %err, "failed to ship log event");
    } else {
        debug!(logger, error = %err, "failed to ship log event");
    }
}
