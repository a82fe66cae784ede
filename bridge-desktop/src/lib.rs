//! # Desktop Bridge Implementations
//!
//! Default implementations of the bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, with retry and exponential backoff
//! - `MessageConnector` over binary WebSocket frames (`wss://{host}/ws`)
//!   using `tokio-tungstenite`, the transport recording servers speak
//! - `MessageConnector` using a Tokio `TcpStream`, each message carried as a
//!   little-endian `u32` length prefix followed by the message bytes, for
//!   relays and local tooling
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, WebSocketMessageConnector};
//! use std::sync::Arc;
//!
//! let http_client = Arc::new(ReqwestHttpClient::new()?);
//! let connector = Arc::new(WebSocketMessageConnector::new());
//! ```

mod http;
mod tcp;
mod ws;

pub use http::ReqwestHttpClient;
pub use tcp::{TcpMessageConnector, DEFAULT_MAX_MESSAGE_BYTES};
pub use ws::WebSocketMessageConnector;
