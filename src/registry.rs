//! Logger registry: one logger per name, shared context, shared config.
//!
//! The registry is an explicit object owned by the application rather
//! than ambient process-wide state; construct one at startup, inject it
//! where loggers are needed, and `reset` it between tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::{Config, ConfigError};
use crate::event::Fields;
use crate::logger::Logger;

/// Process-wide cache of loggers keyed by name.
///
/// Loggers are created on first request and live for the registry's
/// lifetime; concurrent first access for the same name yields exactly one
/// instance. Each logger snapshots the registry configuration current at
/// its creation; [`Registry::configure`] affects only loggers created
/// afterwards.
///
/// # Example
///
/// ```no_run
/// use log_shipper::{Config, Registry};
///
/// #[tokio::main]
/// async fn main() {
///     let registry = Registry::new(Config::default()).expect("valid config");
///
///     let logger = registry.get_logger("checkout").expect("create logger");
///     logger.info("order placed", None, None).await.ok();
///
///     registry.flush_all();
/// }
/// ```
pub struct Registry {
    /// Snapshot handed to loggers created from now on
    config: RwLock<Config>,

    /// Name to logger map; at most one logger per name
    loggers: RwLock<HashMap<String, Arc<Logger>>>,

    /// Context applied to every current and future logger
    global_context: RwLock<Fields>,
}

impl Registry {
    /// Create a registry whose loggers will use `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            config: RwLock::new(config),
            loggers: RwLock::new(HashMap::new()),
            global_context: RwLock::new(Fields::new()),
        })
    }

    /// Get the logger registered under `name`, creating it on first use.
    ///
    /// Creation applies the current configuration snapshot and global
    /// context. Safe under concurrent first access: exactly one instance
    /// survives and every caller receives it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a new logger cannot be constructed.
    pub fn get_logger(&self, name: &str) -> Result<Arc<Logger>, ConfigError> {
        if let Some(logger) = read(&self.loggers).get(name) {
            return Ok(Arc::clone(logger));
        }

        let mut loggers = write(&self.loggers);

        // Check again in case another caller created the logger
        if let Some(logger) = loggers.get(name) {
            return Ok(Arc::clone(logger));
        }

        let config = read(&self.config).clone();
        let logger = Logger::new(name, config)?;

        let global_context = read(&self.global_context).clone();
        if !global_context.is_empty() {
            logger.set_context(global_context);
        }

        let logger = Arc::new(logger);
        loggers.insert(name.to_string(), Arc::clone(&logger));

        Ok(logger)
    }

    /// Replace the global ambient context.
    ///
    /// The same mapping is pushed by value into every registered logger,
    /// and future loggers pick it up at creation time.
    pub fn set_global_context(&self, context: Fields) {
        *write(&self.global_context) = context.clone();

        for logger in read(&self.loggers).values() {
            logger.set_context(context.clone());
        }
    }

    /// Flush every registered logger's pending batch.
    pub fn flush_all(&self) {
        for logger in read(&self.loggers).values() {
            logger.flush();
        }
    }

    /// Replace the configuration used for loggers created from now on.
    ///
    /// Existing loggers keep their construction-time snapshot; this is
    /// documented behavior, not an accident. Tear down and re-request a
    /// logger (or use a fresh registry) to pick up new settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the new configuration is invalid.
    pub fn configure(&self, config: Config) -> Result<(), ConfigError> {
        config.validate()?;
        *write(&self.config) = config;
        Ok(())
    }

    /// Drop all loggers and clear the global context, for test isolation.
    pub fn reset(&self) {
        write(&self.loggers).clear();
        write(&self.global_context).clear();
    }

    /// Number of registered loggers.
    pub fn len(&self) -> usize {
        read(&self.loggers).len()
    }

    /// Check if no loggers are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            config: RwLock::new(Config::default()),
            loggers: RwLock::new(HashMap::new()),
            global_context: RwLock::new(Fields::new()),
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
