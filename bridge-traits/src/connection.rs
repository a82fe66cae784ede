//! Message Connection Abstraction
//!
//! A bidirectional, message-oriented binary connection. Each call to
//! [`MessageSink::send`] delivers exactly one message to the peer and each
//! successful [`MessageSource::recv`] yields exactly one message sent by the
//! peer, with message boundaries preserved by the implementation (WebSocket
//! frames, length-prefixed TCP frames, in-memory queues in tests).
//!
//! The connection is split into independent halves right after connecting so
//! that a background task can drain inbound messages while the owner keeps
//! sending.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Outbound half of a message connection.
#[async_trait]
pub trait MessageSink: Send {
    /// Send one binary message.
    async fn send(&mut self, message: Bytes) -> Result<()>;

    /// Close the connection. Closing an already closed sink is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// Inbound half of a message connection.
#[async_trait]
pub trait MessageSource: Send {
    /// Receive the next binary message.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection cleanly.
    async fn recv(&mut self) -> Result<Option<Bytes>>;
}

/// A freshly opened connection, split into its two halves.
pub struct MessageChannel {
    pub sink: Box<dyn MessageSink>,
    pub source: Box<dyn MessageSource>,
}

impl MessageChannel {
    pub fn new(sink: Box<dyn MessageSink>, source: Box<dyn MessageSource>) -> Self {
        Self { sink, source }
    }
}

impl std::fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageChannel").finish_non_exhaustive()
    }
}

/// Opens message connections to a recording server.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::connection::MessageConnector;
///
/// async fn login(connector: &dyn MessageConnector, frame: Bytes) -> Result<()> {
///     let mut channel = connector.connect("rec.example.com").await?;
///     channel.sink.send(frame).await?;
///     let ack = channel.source.recv().await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait MessageConnector: Send + Sync {
    /// Connect to `host` and return the split connection.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ConnectionFailed`](crate::BridgeError::ConnectionFailed)
    /// when the host cannot be reached.
    async fn connect(&self, host: &str) -> Result<MessageChannel>;
}
