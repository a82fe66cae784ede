//! Length-prefixed TCP message connection
//!
//! Carries each message as a little-endian `u32` length followed by the
//! message bytes, preserving the boundaries the recording protocol relies on.

use async_trait::async_trait;
use bridge_traits::{
    connection::{MessageChannel, MessageConnector, MessageSink, MessageSource},
    error::{BridgeError, Result},
};
use bytes::Bytes;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, warn};

/// Largest message accepted from a peer.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

const DEFAULT_PORT: u16 = 36678;

type FramedTcp = Framed<TcpStream, LengthDelimitedCodec>;

/// Tokio TCP implementation of [`MessageConnector`].
#[derive(Debug, Clone)]
pub struct TcpMessageConnector {
    default_port: u16,
    max_message_bytes: usize,
}

impl TcpMessageConnector {
    pub fn new() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    /// Port used when the host string carries none.
    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    pub fn with_max_message_bytes(mut self, max: usize) -> Self {
        self.max_message_bytes = max;
        self
    }

    fn address_for(&self, host: &str) -> String {
        if host.rsplit_once(':').map_or(false, |(_, port)| port.parse::<u16>().is_ok()) {
            host.to_string()
        } else {
            format!("{}:{}", host, self.default_port)
        }
    }

    fn codec(&self) -> LengthDelimitedCodec {
        LengthDelimitedCodec::builder()
            .little_endian()
            .length_field_length(4)
            .max_frame_length(self.max_message_bytes)
            .new_codec()
    }
}

impl Default for TcpMessageConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageConnector for TcpMessageConnector {
    async fn connect(&self, host: &str) -> Result<MessageChannel> {
        let address = self.address_for(host);
        debug!(address = %address, "Opening TCP message connection");

        let stream = TcpStream::connect(&address)
            .await
            .map_err(|e| BridgeError::ConnectionFailed(format!("{}: {}", address, e)))?;
        stream.set_nodelay(true)?;

        let (sink, source) = Framed::new(stream, self.codec()).split();

        Ok(MessageChannel::new(
            Box::new(TcpMessageSink {
                inner: sink,
                closed: false,
            }),
            Box::new(TcpMessageSource { inner: source }),
        ))
    }
}

struct TcpMessageSink {
    inner: SplitSink<FramedTcp, Bytes>,
    closed: bool,
}

#[async_trait]
impl MessageSink for TcpMessageSink {
    async fn send(&mut self, message: Bytes) -> Result<()> {
        if self.closed {
            return Err(BridgeError::ConnectionClosed(
                "send on closed connection".to_string(),
            ));
        }
        self.inner.send(message).await.map_err(BridgeError::from)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Err(e) = self.inner.close().await {
            warn!(error = %e, "Error while closing TCP message connection");
        }
        Ok(())
    }
}

struct TcpMessageSource {
    inner: SplitStream<FramedTcp>,
}

#[async_trait]
impl MessageSource for TcpMessageSource {
    async fn recv(&mut self) -> Result<Option<Bytes>> {
        match self.inner.next().await {
            Some(Ok(frame)) => Ok(Some(frame.freeze())),
            Some(Err(e)) => Err(BridgeError::from(e)),
            None => Ok(None),
        }
    }
}
