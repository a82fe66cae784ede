//! # Decode Pipeline
//!
//! Turns a track's compressed byte stream into a lazy stream of packed
//! frames.
//!
//! ## Architecture
//!
//! ```text
//!  ByteStream ──feeder task──> bounded byte channel ──> ChannelMediaSource
//!                                                           │
//!                                     spawn_blocking: probe, demux, decode
//!                                     (symphonia codecs + libopus), filter
//!                                                           │
//!  DecodedStream <──unfold── bounded frame channel <────────┘
//! ```
//!
//! Symphonia reads synchronously, so the decoder runs on a blocking worker
//! thread and only that thread waits for network input. Observer callbacks
//! fire on the consuming side, in frame order.

use super::filter::FormatFilter;
use super::frame::{DecodedFrame, TrackFormat};
use super::media_source::ChannelMediaSource;
use super::opus_codec::codec_registry;
use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::transport::ByteStream;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, warn, Span};

/// Lazy, forward-only sequence of decoded frames.
pub type DecodedStream = BoxStream<'static, Result<DecodedFrame>>;

/// Out-of-band notifications from a running pipeline.
pub trait PipelineObserver: Send + Sync {
    /// Called once, before the first frame is yielded.
    fn format_discovered(&self, format: &TrackFormat);

    /// Called for every yielded frame with its duration in seconds, measured
    /// at the sample rate of the discovered track format.
    fn frames_decoded(&self, seconds: f64);
}

/// Observer that ignores every notification.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn format_discovered(&self, _format: &TrackFormat) {}

    fn frames_decoded(&self, _seconds: f64) {}
}

enum PipelineMessage {
    Format(TrackFormat),
    Frame(DecodedFrame),
}

type MessageSender = mpsc::Sender<Result<PipelineMessage>>;

/// Factory for per-track decode pipelines.
#[derive(Debug, Clone)]
pub struct DecodePipeline {
    prime_bytes: usize,
    byte_channel_capacity: usize,
    frame_channel_capacity: usize,
    max_consecutive_errors: usize,
}

impl DecodePipeline {
    pub fn new(config: &ImportConfig) -> Self {
        Self {
            prime_bytes: config.prime_bytes,
            byte_channel_capacity: config.byte_channel_capacity,
            frame_channel_capacity: config.frame_channel_capacity,
            max_consecutive_errors: config.max_consecutive_decode_errors,
        }
    }

    /// Start decoding `bytes`.
    ///
    /// Buffers roughly `prime_bytes` before probing the container. A stream
    /// that ends before delivering any byte produces an empty sequence.
    /// Cancelling `cancel` ends the sequence with [`ImportError::Cancelled`].
    pub async fn open(
        &self,
        mut bytes: ByteStream,
        observer: Arc<dyn PipelineObserver>,
        cancel: CancellationToken,
    ) -> Result<DecodedStream> {
        let (primed, ended) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ImportError::Cancelled),
            primed = prime(&mut bytes, self.prime_bytes) => primed?,
        };

        let primed_len: usize = primed.iter().map(Bytes::len).sum();
        if primed_len == 0 && ended {
            debug!("Byte stream ended before any data, nothing to decode");
            return Ok(stream::empty().boxed());
        }
        debug!(primed_len, ended, "Primed decode pipeline");

        let (byte_tx, byte_rx) = mpsc::channel::<Bytes>(self.byte_channel_capacity);
        let (frame_tx, frame_rx) = mpsc::channel(self.frame_channel_capacity);

        let feeder = if ended {
            drop(byte_tx);
            None
        } else {
            Some(AbortOnDropHandle::new(tokio::spawn(feed(
                bytes,
                byte_tx,
                frame_tx.clone(),
                cancel,
            ))))
        };

        let source = ChannelMediaSource::new(primed, byte_rx);
        let max_errors = self.max_consecutive_errors;
        let span = Span::current();
        let decoder = tokio::task::spawn_blocking(move || {
            span.in_scope(|| run_decoder(source, frame_tx, max_errors))
        });

        let receiver = FrameReceiver {
            rx: frame_rx,
            observer,
            format: None,
            decoder: Some(decoder),
            _feeder: feeder,
        };

        Ok(stream::unfold(receiver, |mut receiver| async move {
            let item = receiver.next_frame().await?;
            Some((item, receiver))
        })
        .boxed())
    }
}

async fn prime(bytes: &mut ByteStream, prime_bytes: usize) -> Result<(Vec<Bytes>, bool)> {
    let mut primed = Vec::new();
    let mut total = 0;

    while total < prime_bytes {
        match bytes.next().await {
            Some(chunk) => {
                let chunk = chunk?;
                total += chunk.len();
                primed.push(chunk);
            }
            None => return Ok((primed, true)),
        }
    }

    Ok((primed, false))
}

async fn feed(
    mut bytes: ByteStream,
    byte_tx: mpsc::Sender<Bytes>,
    frame_tx: MessageSender,
    cancel: CancellationToken,
) {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ImportError::Cancelled),
        result = pump(&mut bytes, &byte_tx) => result,
    };

    // The error goes out before end of input so it precedes anything the
    // decoder reports about the truncated stream.
    if let Err(e) = result {
        debug!(error = %e, "Byte stream failed");
        let _ = frame_tx.send(Err(e)).await;
    }

    drop(byte_tx);
}

async fn pump(bytes: &mut ByteStream, byte_tx: &mpsc::Sender<Bytes>) -> Result<()> {
    while let Some(chunk) = bytes.next().await {
        if byte_tx.send(chunk?).await.is_err() {
            // Decoder stopped reading.
            break;
        }
    }
    Ok(())
}

struct FrameReceiver {
    rx: mpsc::Receiver<Result<PipelineMessage>>,
    observer: Arc<dyn PipelineObserver>,
    format: Option<TrackFormat>,
    decoder: Option<JoinHandle<()>>,
    _feeder: Option<AbortOnDropHandle<()>>,
}

impl FrameReceiver {
    async fn next_frame(&mut self) -> Option<Result<DecodedFrame>> {
        loop {
            match self.rx.recv().await {
                Some(Ok(PipelineMessage::Format(format))) => {
                    self.observer.format_discovered(&format);
                    self.format = Some(format);
                }
                Some(Ok(PipelineMessage::Frame(frame))) => {
                    // Progress is counted in track time.
                    let seconds = match &self.format {
                        Some(format) => format.seconds_for(frame.frames),
                        None => frame.duration_secs(),
                    };
                    self.observer.frames_decoded(seconds);
                    return Some(Ok(frame));
                }
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    let decoder = self.decoder.take()?;
                    return match decoder.await {
                        Ok(()) => None,
                        Err(e) => Some(Err(ImportError::Internal(format!(
                            "decoder thread failed: {}",
                            e
                        )))),
                    };
                }
            }
        }
    }
}

fn run_decoder(source: ChannelMediaSource, tx: MessageSender, max_errors: usize) {
    if let Err(e) = decode_all(source, &tx, max_errors) {
        error!(error = %e, "Decoding failed");
        let _ = tx.blocking_send(Err(e));
    }
}

fn decode_all(source: ChannelMediaSource, tx: &MessageSender, max_errors: usize) -> Result<()> {
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ImportError::InvalidFormat(format!("Failed to probe container: {}", e)))?;
    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ImportError::InvalidFormat("No decodable audio stream".to_string()))?;
    let track_id = track.id;

    let mut decoder = codec_registry()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| ImportError::InvalidFormat(format!("Unsupported codec: {}", e)))?;

    debug!(track_id, codec = ?track.codec_params.codec, "Decoder ready");

    let mut filter = FormatFilter::new();
    let mut consecutive_errors = 0;

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("End of input reached");
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                return Err(ImportError::Decoder(
                    "Track list changed, reset required".to_string(),
                ));
            }
            Err(SymphoniaError::IoError(e)) => {
                consecutive_errors += 1;
                warn!(
                    "I/O error reading packet (attempt {}/{}): {}",
                    consecutive_errors, max_errors, e
                );
                if consecutive_errors >= max_errors {
                    return Err(ImportError::CorruptedStream(format!(
                        "Stream I/O failure after {} attempts: {}",
                        max_errors, e
                    )));
                }
                continue;
            }
            Err(e) => {
                return Err(ImportError::Decoder(format!("Failed to read packet: {}", e)));
            }
        };

        while !reader.metadata().is_latest() {
            reader.metadata().pop();
        }

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                consecutive_errors = 0;

                let Some(filtered) = filter.push(decoded) else {
                    continue;
                };

                if let Some(format) = filtered.discovered {
                    if tx.blocking_send(Ok(PipelineMessage::Format(format))).is_err() {
                        return Ok(());
                    }
                }

                if tx
                    .blocking_send(Ok(PipelineMessage::Frame(filtered.frame)))
                    .is_err()
                {
                    debug!("Frame consumer dropped, stopping decoder");
                    return Ok(());
                }
            }
            Err(SymphoniaError::IoError(e)) => {
                consecutive_errors += 1;
                warn!(
                    "Skipping corrupted packet (I/O error, attempt {}/{}): {}",
                    consecutive_errors, max_errors, e
                );
                if consecutive_errors >= max_errors {
                    return Err(ImportError::CorruptedStream(format!(
                        "Stream corruption after {} failed packets",
                        max_errors
                    )));
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                consecutive_errors += 1;
                warn!(
                    "Skipping packet with decode error (attempt {}/{}): {}",
                    consecutive_errors, max_errors, e
                );
                if consecutive_errors >= max_errors {
                    return Err(ImportError::CorruptedStream(format!(
                        "Decoder failure after {} failed packets: {}",
                        max_errors, e
                    )));
                }
            }
            Err(e) => {
                return Err(ImportError::Decoder(format!("Failed to decode packet: {}", e)));
            }
        }
    }

    let _ = decoder.finalize();
    Ok(())
}
