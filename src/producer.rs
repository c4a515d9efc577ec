//! Producer interface consumed by bridging shims.
//!
//! Third-party logging front-ends feed events into the engine through
//! this trait. An adapter maps its own severity scale onto [`LogLevel`]
//! (the `FromStr` and `From<tracing::Level>` conversions preserve
//! relative ordering) and flattens its structured representation into
//! [`Fields`].

use std::error::Error;

use async_trait::async_trait;

use crate::event::{Fields, LogLevel};
use crate::logger::Logger;
use crate::transport::TransportError;

/// Destination for events produced by a logging front-end.
///
/// **Parameters**
/// - `level`: severity on the five-level scale.
/// - `message`: log message content.
/// - `fields`: flattened structured data, merged over the producer's
///   ambient context.
/// - `exception`: error whose cause chain is captured into the event.
///
/// **Returns**
/// - `Ok(())` once the event has been accepted for delivery. With
///   asynchronous sending enabled this says nothing about the eventual
///   network outcome.
/// - `Err(..)` only when the producer delivers synchronously and the
///   send failed.
#[async_trait]
pub trait EventProducer: Send + Sync {
    async fn log(
        &self,
        level: LogLevel,
        message: &str,
        fields: Option<Fields>,
        exception: Option<&(dyn Error + Send + Sync + 'static)>,
    ) -> Result<(), TransportError>;
}

#[async_trait]
impl EventProducer for Logger {
    async fn log(
        &self,
        level: LogLevel,
        message: &str,
        fields: Option<Fields>,
        exception: Option<&(dyn Error + Send + Sync + 'static)>,
    ) -> Result<(), TransportError> {
        Logger::log(self, level, message, fields, exception).await
    }
}
