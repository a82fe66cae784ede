//! # Core Configuration Module
//!
//! Holds the host capabilities the import core needs.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance. It enforces fail-fast validation so that every required bridge is
//! present before an import starts.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - metadata and caption requests (desktop default: reqwest)
//! - `MessageConnector` - chunk transport connections (desktop default: TCP)
//!
//! ## Optional Dependencies
//!
//! - `EventBus` - import progress events
//!
//! When the `desktop-shims` feature is enabled, desktop defaults are injected
//! automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_runtime::events::EventBus;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .http_client(Arc::new(MyHttpClient))
//!     .message_connector(Arc::new(MyConnector))
//!     .event_bus(EventBus::default())
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::{CoreEvent, EventBus};
use bridge_traits::{HttpClient, MessageConnector};
use std::sync::Arc;

/// Core configuration for the import core.
#[derive(Clone)]
pub struct CoreConfig {
    /// HTTP client for metadata and caption requests
    pub http_client: Arc<dyn HttpClient>,

    /// Opens chunk transport connections to the recording server
    pub message_connector: Arc<dyn MessageConnector>,

    /// Bus that receives import events (optional)
    pub event_bus: Option<EventBus>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("http_client", &"HttpClient { ... }")
            .field("message_connector", &"MessageConnector { ... }")
            .field("event_bus", &self.event_bus)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Publishes `event` when a bus is configured. Having no subscribers is
    /// not an error.
    pub fn emit(&self, event: CoreEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(event);
        }
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for recording metadata and captions. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default ReqwestHttpClient. \
                 Other hosts: inject a platform HTTP client."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn message_connector_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "MessageConnector".to_string(),
        message: "MessageConnector implementation is required to stream recorded audio. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default WebSocketMessageConnector. \
                 Other hosts: inject a platform WebSocket connector."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new().map_err(|e| {
        Error::Internal(format!("Failed to initialize default HttpClient: {}", e))
    })?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_message_connector() -> Result<Arc<dyn MessageConnector>> {
    use bridge_desktop::WebSocketMessageConnector;

    Ok(Arc::new(WebSocketMessageConnector::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_message_connector() -> Result<Arc<dyn MessageConnector>> {
    Err(message_connector_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    http_client: Option<Arc<dyn HttpClient>>,
    message_connector: Option<Arc<dyn MessageConnector>>,
    event_bus: Option<EventBus>,
}

impl CoreConfigBuilder {
    /// Sets the HTTP client implementation.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the connector used to open chunk transport connections.
    pub fn message_connector(mut self, connector: Arc<dyn MessageConnector>) -> Self {
        self.message_connector = Some(connector);
        self
    }

    /// Sets the bus that receives import events.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityMissing`] when a required bridge is neither
    /// injected nor available as a desktop default.
    pub fn build(self) -> Result<CoreConfig> {
        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let message_connector = match self.message_connector {
            Some(connector) => connector,
            None => provide_default_message_connector()?,
        };

        Ok(CoreConfig {
            http_client,
            message_connector,
            event_bus: self.event_bus,
        })
    }
}
