//! Log Shipper Library
//!
//! This library ships application telemetry to a remote collector:
//!
//! - **config**: validated configuration snapshot, loadable from the environment
//! - **event**: leveled structured log events and exception chains
//! - **transport**: retrying HTTP delivery with exponential backoff
//! - **batcher**: per-logger size- and time-triggered batch accumulation
//! - **logger**: named logging handle with ambient context
//! - **producer**: the interface bridging shims feed events through
//! - **registry**: one logger per name, shared context and configuration
//!
//! # Example
//!
//! ```no_run
//! use log_shipper::{Config, Fields, Registry};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config {
//!         endpoint: "https://collector.example.com".to_string(),
//!         api_key: "secret".to_string(),
//!         ..Config::default()
//!     };
//!
//!     let registry = Registry::new(config).expect("valid config");
//!     registry.set_global_context(Fields::from([
//!         ("service".to_string(), json!("checkout")),
//!     ]));
//!
//!     let logger = registry.get_logger("orders").expect("create logger");
//!     logger
//!         .info("order placed", Some(Fields::from([
//!             ("order_id".to_string(), json!("ord-1942")),
//!         ])), None)
//!         .await
//!         .ok();
//!
//!     // Drain whatever is still buffered before shutdown
//!     registry.flush_all();
//! }
//! ```

// Module declarations
pub mod batcher;
pub mod config;
pub mod event;
pub mod logger;
pub mod producer;
pub mod registry;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use batcher::{Batcher, BatcherStats, FlushTrigger};
pub use config::{Config, ConfigError};
pub use event::{ExceptionRecord, Fields, LogEvent, LogLevel, ParseLevelError};
pub use logger::Logger;
pub use producer::EventProducer;
pub use registry::Registry;
pub use transport::{Transport, TransportError};
