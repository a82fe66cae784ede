//! WebSocket message connection
//!
//! Recording servers accept binary WebSocket messages on `/ws`. Each binary
//! frame is one protocol message; text, ping and pong frames are skipped.

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
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{protocol::WebSocketConfig, Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, trace, warn};

use crate::tcp::DEFAULT_MAX_MESSAGE_BYTES;

const DEFAULT_SCHEME: &str = "wss";
const DEFAULT_PATH: &str = "/ws";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// `tokio-tungstenite` implementation of [`MessageConnector`].
///
/// Connects to `wss://{host}/ws` unless configured otherwise.
#[derive(Debug, Clone)]
pub struct WebSocketMessageConnector {
    scheme: String,
    path: String,
    max_message_bytes: usize,
}

impl WebSocketMessageConnector {
    pub fn new() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            path: DEFAULT_PATH.to_string(),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    /// Use `ws` or `wss`.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_max_message_bytes(mut self, max: usize) -> Self {
        self.max_message_bytes = max;
        self
    }

    fn url_for(&self, host: &str) -> String {
        format!("{}://{}{}", self.scheme, host, self.path)
    }

    fn config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_bytes);
        config.max_frame_size = Some(self.max_message_bytes);
        config
    }
}

impl Default for WebSocketMessageConnector {
    fn default() -> Self {
        Self::new()
    }
}

fn map_ws_error(error: WsError) -> BridgeError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            BridgeError::ConnectionClosed("websocket closed".to_string())
        }
        WsError::Io(e) => BridgeError::Io(e),
        other => BridgeError::OperationFailed(format!("websocket error: {}", other)),
    }
}

#[async_trait]
impl MessageConnector for WebSocketMessageConnector {
    async fn connect(&self, host: &str) -> Result<MessageChannel> {
        let url = self.url_for(host);
        debug!(url = %url, "Opening WebSocket message connection");

        let (socket, _response) = connect_async_with_config(url.as_str(), Some(self.config()), true)
            .await
            .map_err(|e| BridgeError::ConnectionFailed(format!("{}: {}", url, e)))?;

        let (sink, source) = socket.split();

        Ok(MessageChannel::new(
            Box::new(WsMessageSink {
                inner: sink,
                closed: false,
            }),
            Box::new(WsMessageSource { inner: source }),
        ))
    }
}

struct WsMessageSink {
    inner: SplitSink<Socket, Message>,
    closed: bool,
}

#[async_trait]
impl MessageSink for WsMessageSink {
    async fn send(&mut self, message: Bytes) -> Result<()> {
        if self.closed {
            return Err(BridgeError::ConnectionClosed(
                "send on closed connection".to_string(),
            ));
        }
        self.inner
            .send(Message::Binary(message.to_vec()))
            .await
            .map_err(map_ws_error)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Err(e) = self.inner.close().await {
            warn!(error = %e, "Error while closing WebSocket message connection");
        }
        Ok(())
    }
}

struct WsMessageSource {
    inner: SplitStream<Socket>,
}

#[async_trait]
impl MessageSource for WsMessageSource {
    async fn recv(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(Bytes::from(data))),
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Peer closed WebSocket connection");
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    trace!(message = ?other, "Skipping non-binary frame");
                }
                Some(Err(WsError::ConnectionClosed)) | None => return Ok(None),
                Some(Err(e)) => return Err(map_ws_error(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn test_url_for() {
        let connector = WebSocketMessageConnector::new();
        assert_eq!(connector.url_for("rec.example"), "wss://rec.example/ws");

        let connector = WebSocketMessageConnector::new()
            .with_scheme("ws")
            .with_path("/socket");
        assert_eq!(
            connector.url_for("127.0.0.1:9"),
            "ws://127.0.0.1:9/socket"
        );
    }

    #[tokio::test]
    async fn test_binary_messages_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(socket).await.unwrap();

            let login = match ws.next().await.unwrap().unwrap() {
                Message::Binary(data) => data,
                other => panic!("unexpected message: {:?}", other),
            };

            ws.send(Message::Binary(b"ab".to_vec())).await.unwrap();
            ws.send(Message::Text("ignored".to_string())).await.unwrap();
            ws.send(Message::Binary(b"cdef".to_vec())).await.unwrap();
            ws.close(None).await.unwrap();
            login
        });

        let connector = WebSocketMessageConnector::new().with_scheme("ws");
        let mut channel = connector
            .connect(&format!("127.0.0.1:{}", port))
            .await
            .unwrap();
        channel
            .sink
            .send(Bytes::from_static(b"hello"))
            .await
            .unwrap();

        assert_eq!(
            channel.source.recv().await.unwrap(),
            Some(Bytes::from_static(b"ab"))
        );
        assert_eq!(
            channel.source.recv().await.unwrap(),
            Some(Bytes::from_static(b"cdef"))
        );
        assert_eq!(channel.source.recv().await.unwrap(), None);

        assert_eq!(server.await.unwrap(), b"hello".to_vec());

        channel.sink.close().await.unwrap();
        assert!(channel.sink.send(Bytes::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = WebSocketMessageConnector::new()
            .with_scheme("ws")
            .connect(&format!("127.0.0.1:{}", port))
            .await;
        assert!(matches!(result, Err(BridgeError::ConnectionFailed(_))));
    }
}
