//! Configuration for the log shipper.
//!
//! Configuration is an explicit, validated struct resolved once and
//! snapshotted into each logger at construction time. Settings can be
//! built directly, taken from defaults, or loaded from environment
//! variables.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Default collector endpoint
const DEFAULT_ENDPOINT: &str = "http://localhost:3030";

/// Default tenant namespace; elided from request paths
pub(crate) const DEFAULT_NAMESPACE: &str = "default";

/// Default batch size (number of events per batch)
const DEFAULT_BATCH_SIZE: usize = 100;

/// Default batch flush interval in seconds
const DEFAULT_BATCH_INTERVAL_SECS: u64 = 5;

/// Default maximum retry attempts for failed sends
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential retry backoff
const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;

/// Default HTTP request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default bound on concurrent collector connections
const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Maximum allowed batch size to prevent memory issues
const MAX_BATCH_SIZE: usize = 10_000;

/// Minimum batch interval to prevent overwhelming the collector
const MIN_BATCH_INTERVAL_SECS: u64 = 1;

/// Maximum batch interval to ensure reasonable data freshness
const MAX_BATCH_INTERVAL_SECS: u64 = 300;

/// Configuration snapshot for the shipping engine.
///
/// All settings can be configured via environment variables:
/// - `LOG_SHIPPER_ENDPOINT`: collector base URL (default: http://localhost:3030)
/// - `LOG_SHIPPER_NAMESPACE`: tenant namespace (default: default)
/// - `LOG_SHIPPER_API_KEY`: API key sent in the `x-api-key` header
/// - `LOG_SHIPPER_ASYNC`: asynchronous sending on/off (default: true)
/// - `LOG_SHIPPER_BATCHING`: batching on/off (default: true)
/// - `LOG_SHIPPER_BATCH_SIZE`: events per batch (default: 100)
/// - `LOG_SHIPPER_BATCH_INTERVAL_SECS`: seconds between timer flushes (default: 5)
/// - `LOG_SHIPPER_MAX_RETRIES`: max retry attempts (default: 3)
/// - `LOG_SHIPPER_RETRY_BACKOFF_MS`: backoff base in milliseconds (default: 1000)
/// - `LOG_SHIPPER_REQUEST_TIMEOUT_SECS`: HTTP request timeout (default: 30)
/// - `LOG_SHIPPER_MAX_CONNECTIONS`: concurrent connection bound (default: 10)
/// - `LOG_SHIPPER_DEBUG`: diagnostic reporting of swallowed failures (default: false)
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the collector
    pub endpoint: String,

    /// Tenant namespace; the default namespace is elided from request paths
    pub namespace: String,

    /// API key credential; empty means unauthenticated
    pub api_key: String,

    /// Whether sends happen off the caller's path
    pub async_enabled: bool,

    /// Whether events are grouped into batches
    pub batching_enabled: bool,

    /// Number of events that triggers an immediate batch flush
    pub batch_size: usize,

    /// Interval between timer-driven batch flushes
    pub batch_interval: Duration,

    /// Maximum retry attempts after the first failed try
    pub max_retries: u32,

    /// Base delay for exponential retry backoff
    pub retry_backoff: Duration,

    /// HTTP request timeout
    pub request_timeout: Duration,

    /// Bound on concurrent collector connections
    pub max_connections: usize,

    /// Extra headers attached to every request
    pub headers: HashMap<String, String>,

    /// Whether swallowed delivery failures are surfaced at warn level
    pub debug_enabled: bool,
}

/// Error type for malformed configuration.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "Configuration error for {}: {}", var, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            env_var: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Missing variables fall back to defaults; present ones are parsed
    /// and range-checked.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a numeric variable fails to parse or falls
    /// outside its allowed range, or if the resulting configuration fails
    /// validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = env::var("LOG_SHIPPER_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();

        let namespace =
            env::var("LOG_SHIPPER_NAMESPACE").unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());

        let api_key = env::var("LOG_SHIPPER_API_KEY").unwrap_or_default();

        let batch_size = Self::parse_batch_size()?;
        let batch_interval = Duration::from_secs(Self::parse_batch_interval()?);

        let async_enabled = parse_bool_env("LOG_SHIPPER_ASYNC").unwrap_or(true);
        let batching_enabled = parse_bool_env("LOG_SHIPPER_BATCHING").unwrap_or(true);
        let debug_enabled = parse_bool_env("LOG_SHIPPER_DEBUG").unwrap_or(false);

        let max_retries: u32 = env::var("LOG_SHIPPER_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);

        let retry_backoff_ms: u64 = env::var("LOG_SHIPPER_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RETRY_BACKOFF_MS);

        let request_timeout_secs: u64 = env::var("LOG_SHIPPER_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let max_connections: usize = env::var("LOG_SHIPPER_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);

        let config = Self {
            endpoint,
            namespace,
            api_key,
            async_enabled,
            batching_enabled,
            batch_size,
            batch_interval,
            max_retries,
            retry_backoff: Duration::from_millis(retry_backoff_ms),
            request_timeout: Duration::from_secs(request_timeout_secs),
            max_connections,
            headers: HashMap::new(),
            debug_enabled,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the engine cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::new("endpoint must not be empty"));
        }

        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ConfigError::new(format!(
                "endpoint '{}' must be an http or https URL",
                self.endpoint
            )));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::new("batch size must be greater than 0"));
        }

        if self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::new(format!(
                "batch size {} exceeds maximum allowed ({})",
                self.batch_size, MAX_BATCH_SIZE
            )));
        }

        if self.batch_interval.is_zero() {
            return Err(ConfigError::new("batch interval must be greater than zero"));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::new("max connections must be greater than 0"));
        }

        Ok(())
    }

    /// Whether events should be routed through the batch accumulator.
    pub(crate) fn batching_active(&self) -> bool {
        self.async_enabled && self.batching_enabled && self.batch_size > 1
    }

    /// Parse batch size from environment variable with validation.
    fn parse_batch_size() -> Result<usize, ConfigError> {
        let env_var = "LOG_SHIPPER_BATCH_SIZE";

        match env::var(env_var) {
            Ok(value) => {
                let batch_size: usize = value.parse().map_err(|_| ConfigError {
                    message: format!("'{}' is not a valid number", value),
                    env_var: Some(env_var.to_string()),
                })?;

                if batch_size == 0 {
                    return Err(ConfigError {
                        message: "batch size must be greater than 0".to_string(),
                        env_var: Some(env_var.to_string()),
                    });
                }

                if batch_size > MAX_BATCH_SIZE {
                    return Err(ConfigError {
                        message: format!(
                            "batch size {} exceeds maximum allowed ({})",
                            batch_size, MAX_BATCH_SIZE
                        ),
                        env_var: Some(env_var.to_string()),
                    });
                }

                Ok(batch_size)
            }
            Err(_) => Ok(DEFAULT_BATCH_SIZE),
        }
    }

    /// Parse batch interval from environment variable with validation.
    fn parse_batch_interval() -> Result<u64, ConfigError> {
        let env_var = "LOG_SHIPPER_BATCH_INTERVAL_SECS";

        match env::var(env_var) {
            Ok(value) => {
                let interval: u64 = value.parse().map_err(|_| ConfigError {
                    message: format!("'{}' is not a valid number", value),
                    env_var: Some(env_var.to_string()),
                })?;

                if interval < MIN_BATCH_INTERVAL_SECS {
                    return Err(ConfigError {
                        message: format!(
                            "batch interval {} is below minimum ({}s)",
                            interval, MIN_BATCH_INTERVAL_SECS
                        ),
                        env_var: Some(env_var.to_string()),
                    });
                }

                if interval > MAX_BATCH_INTERVAL_SECS {
                    return Err(ConfigError {
                        message: format!(
                            "batch interval {} exceeds maximum ({}s)",
                            interval, MAX_BATCH_INTERVAL_SECS
                        ),
                        env_var: Some(env_var.to_string()),
                    });
                }

                Ok(interval)
            }
            Err(_) => Ok(DEFAULT_BATCH_INTERVAL_SECS),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            api_key: String::new(),
            async_enabled: true,
            batching_enabled: true,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_interval: Duration::from_secs(DEFAULT_BATCH_INTERVAL_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            headers: HashMap::new(),
            debug_enabled: false,
        }
    }
}

/// Parse a boolean environment variable, accepting 1/0 and true/false.
fn parse_bool_env(env_var: &str) -> Option<bool> {
    match env::var(env_var).ok()?.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    // Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let original = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                original,
            }
        }

        fn remove(key: &str) -> Self {
            let original = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                original,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.original {
                Some(val) => env::set_var(&self.key, val),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.endpoint, "http://localhost:3030");
        assert_eq!(config.namespace, "default");
        assert!(config.async_enabled);
        assert!(config.batching_enabled);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.batch_interval, Duration::from_secs(5));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_backoff, Duration::from_millis(1000));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_connections, 10);
        assert!(!config.debug_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_config_from_env_with_defaults() {
        let _guard1 = EnvGuard::remove("LOG_SHIPPER_ENDPOINT");
        let _guard2 = EnvGuard::remove("LOG_SHIPPER_BATCH_SIZE");
        let _guard3 = EnvGuard::remove("LOG_SHIPPER_BATCH_INTERVAL_SECS");

        let config = Config::from_env().expect("Should load with defaults");
        assert_eq!(config.endpoint, "http://localhost:3030");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.batch_interval, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        let _guard1 = EnvGuard::set("LOG_SHIPPER_ENDPOINT", "http://collector:9000/");
        let _guard2 = EnvGuard::set("LOG_SHIPPER_NAMESPACE", "tenant-a");
        let _guard3 = EnvGuard::set("LOG_SHIPPER_BATCH_SIZE", "200");
        let _guard4 = EnvGuard::set("LOG_SHIPPER_BATCH_INTERVAL_SECS", "10");
        let _guard5 = EnvGuard::set("LOG_SHIPPER_ASYNC", "false");

        let config = Config::from_env().expect("Should load custom values");
        assert_eq!(config.endpoint, "http://collector:9000"); // Trailing slash removed
        assert_eq!(config.namespace, "tenant-a");
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.batch_interval, Duration::from_secs(10));
        assert!(!config.async_enabled);
    }

    #[test]
    #[serial]
    fn test_invalid_batch_size() {
        let _guard = EnvGuard::set("LOG_SHIPPER_BATCH_SIZE", "not_a_number");

        let result = Config::from_env();
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.message.contains("not a valid number"));
    }

    #[test]
    #[serial]
    fn test_zero_batch_size() {
        let _guard = EnvGuard::set("LOG_SHIPPER_BATCH_SIZE", "0");

        let result = Config::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().message.contains("greater than 0"));
    }

    #[test]
    #[serial]
    fn test_batch_interval_out_of_range() {
        {
            let _low = EnvGuard::set("LOG_SHIPPER_BATCH_INTERVAL_SECS", "0");
            assert!(Config::from_env().is_err());
        }

        let _high = EnvGuard::set("LOG_SHIPPER_BATCH_INTERVAL_SECS", "999");
        let err = Config::from_env().unwrap_err();
        assert!(err.message.contains("exceeds maximum"));
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let config = Config {
            endpoint: "collector:9000".to_string(),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.message.contains("http"));

        let config = Config {
            endpoint: String::new(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_connections() {
        let config = Config {
            max_connections: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_batching_active() {
        let config = Config::default();
        assert!(config.batching_active());

        let config = Config {
            batch_size: 1,
            ..Config::default()
        };
        assert!(!config.batching_active());

        let config = Config {
            async_enabled: false,
            ..Config::default()
        };
        assert!(!config.batching_active());

        let config = Config {
            batching_enabled: false,
            ..Config::default()
        };
        assert!(!config.batching_active());
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError {
            message: "test error".to_string(),
            env_var: Some("TEST_VAR".to_string()),
        };
        assert_eq!(
            format!("{}", error),
            "Configuration error for TEST_VAR: test error"
        );

        let error_no_var = ConfigError::new("general error");
        assert_eq!(
            format!("{}", error_no_var),
            "Configuration error: general error"
        );
    }
}
