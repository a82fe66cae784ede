//! # Host Bridge Traits
//!
//! Capability traits the import core requires from its host.
//!
//! ## Overview
//!
//! The import core never opens sockets or issues HTTP requests itself. It
//! talks to the recording server through the traits defined here, and each
//! host ships concrete adapters for them (see `bridge-desktop`).
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP requests for the recording
//!   metadata and caption documents
//! - [`MessageConnector`](connection::MessageConnector) - Opens a bidirectional,
//!   message-oriented binary connection used by the chunk transport
//!
//! ### Utilities
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform-specific failures into it and keep messages
//! actionable (host, status code, underlying cause).
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync` (or `Send` for per-connection halves) so
//! adapters can be shared across the scheduler's concurrent jobs.

pub mod connection;
pub mod error;
pub mod http;
pub mod time;

pub use error::BridgeError;

pub use connection::{MessageChannel, MessageConnector, MessageSink, MessageSource};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use time::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
