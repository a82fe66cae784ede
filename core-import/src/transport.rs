//! # Chunk Transport
//!
//! One streaming session per track. The transport logs in, then turns the
//! server's sequenced chunks into a pull-based byte stream, acknowledging
//! every chunk before its payload is handed out.
//!
//! A background reader task drains the connection into an unbounded queue,
//! so data that arrives before the consumer pulls is never lost. Pulls return
//! a queued message immediately or wait for the next one.

use crate::error::{ImportError, Result};
use crate::metadata::Session;
use crate::protocol::{encode_ack, Chunk, LoginFrame};
use bridge_traits::connection::{MessageChannel, MessageConnector, MessageSink, MessageSource};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, instrument, trace, warn};

/// Pull-based sequence of chunk payloads for one track.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// An open chunk session with the recording server.
pub struct ChunkTransport {
    sink: Box<dyn MessageSink>,
    inbound: mpsc::UnboundedReceiver<Result<Bytes>>,
    _reader: AbortOnDropHandle<()>,
    chunk_timeout: Option<Duration>,
    chunks: u64,
    finished: bool,
}

impl ChunkTransport {
    /// Connect to the session's server and request one track.
    #[instrument(skip(connector, session), fields(host = %session.host))]
    pub async fn open(
        connector: &dyn MessageConnector,
        session: &Session,
        command: u32,
        track_index: u32,
    ) -> Result<Self> {
        let MessageChannel { mut sink, source } = connector.connect(&session.host).await?;

        let login = LoginFrame {
            command,
            session_id: session.id,
            session_key: session.key,
            track_index,
        };
        sink.send(login.encode()).await?;
        debug!(command, track_index, "Sent login frame");

        let (tx, inbound) = mpsc::unbounded_channel();
        let reader = AbortOnDropHandle::new(tokio::spawn(read_messages(source, tx)));

        Ok(Self {
            sink,
            inbound,
            _reader: reader,
            chunk_timeout: None,
            chunks: 0,
            finished: false,
        })
    }

    /// Fail a pull that waits longer than `timeout` for the next chunk.
    pub fn with_chunk_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    /// Number of chunks received and acknowledged so far.
    pub fn chunks_received(&self) -> u64 {
        self.chunks
    }

    /// Next payload, or `None` once the end-of-stream chunk was received.
    ///
    /// Every chunk is acknowledged before this returns. The end-of-stream
    /// chunk is acknowledged too, then the connection is closed.
    pub async fn next_payload(&mut self) -> Result<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }

        match self.pull().await {
            Ok(payload) => Ok(payload),
            Err(e) => {
                self.finished = true;
                if let Err(close_err) = self.sink.close().await {
                    trace!(error = %close_err, "Close after failure");
                }
                Err(e)
            }
        }
    }

    async fn pull(&mut self) -> Result<Option<Bytes>> {
        let message = self.receive().await?;
        let chunk = Chunk::parse(message)?;

        self.sink.send(encode_ack(chunk.sequence())).await?;
        self.chunks += 1;

        match chunk {
            Chunk::Data { sequence, payload } => {
                trace!(sequence, len = payload.len(), "Chunk acknowledged");
                Ok(Some(payload))
            }
            Chunk::End { sequence } => {
                debug!(sequence, chunks = self.chunks, "End of stream");
                self.finished = true;
                self.sink.close().await?;
                Ok(None)
            }
        }
    }

    async fn receive(&mut self) -> Result<Bytes> {
        let next = match self.chunk_timeout {
            Some(limit) => tokio::time::timeout(limit, self.inbound.recv())
                .await
                .map_err(|_| ImportError::Timeout(limit))?,
            None => self.inbound.recv().await,
        };

        next.unwrap_or_else(|| {
            Err(ImportError::ConnectionClosed(
                "connection reader stopped".to_string(),
            ))
        })
    }

    /// Consume the transport as a byte stream. The stream ends cleanly at the
    /// end-of-stream chunk and ends after the first error otherwise.
    pub fn into_byte_stream(self) -> ByteStream {
        stream::unfold(self, |mut transport| async move {
            match transport.next_payload().await {
                Ok(Some(payload)) => Some((Ok(payload), transport)),
                Ok(None) => None,
                Err(e) => Some((Err(e), transport)),
            }
        })
        .boxed()
    }
}

async fn read_messages(
    mut source: Box<dyn MessageSource>,
    tx: mpsc::UnboundedSender<Result<Bytes>>,
) {
    let mut first = true;

    loop {
        let message = match source.recv().await {
            Ok(Some(message)) => message,
            Ok(None) => {
                let _ = tx.send(Err(ImportError::ConnectionClosed(
                    "server closed the connection before the end of stream".to_string(),
                )));
                return;
            }
            Err(e) => {
                warn!(error = %e, "Connection failed while reading");
                let _ = tx.send(Err(e.into()));
                return;
            }
        };

        if first {
            // Login acknowledgement; its content is not checked.
            first = false;
            trace!(len = message.len(), "Discarded login acknowledgement");
            continue;
        }

        if tx.send(Ok(message)).is_err() {
            return;
        }
    }
}
