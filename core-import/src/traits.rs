//! Collaborator traits: the project that receives imported tracks and the
//! hook that displays progress.
//!
//! Storage, editing and rendering live in the host. The importer only needs
//! to create tracks, stream frames or caption lines into them, and hand out
//! progress text.

use crate::decoder::{DecodedFrame, TrackFormat};
use crate::error::Result;
use crate::metadata::CaptionLine;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Frames handed to an audio track, in production order.
pub type FrameStream = BoxStream<'static, DecodedFrame>;

/// Destination audio track.
#[async_trait]
pub trait AudioTrackSink: Send + Sync {
    fn name(&self) -> &str;

    /// Called once, before the first frame is appended.
    fn set_format(&self, format: TrackFormat);

    /// Consume `frames` until it ends. The stream is forward-only.
    async fn append(&self, frames: FrameStream) -> Result<()>;
}

/// Destination caption track.
#[async_trait]
pub trait CaptionTrackSink: Send + Sync {
    fn name(&self) -> &str;

    /// Append a batch of caption lines as received from the server.
    async fn append_raw(&self, lines: Vec<CaptionLine>) -> Result<()>;
}

/// Project that imported tracks are created in.
#[async_trait]
pub trait Project: Send + Sync {
    fn name(&self) -> &str;

    async fn new_audio_track(&self, name: &str) -> Result<Arc<dyn AudioTrackSink>>;

    async fn new_caption_track(&self, name: &str) -> Result<Arc<dyn CaptionTrackSink>>;
}

/// Receives the human-readable progress text whenever it changes.
pub trait StatusRenderer: Send + Sync {
    fn render(&self, text: &str);
}

impl<F> StatusRenderer for F
where
    F: Fn(&str) + Send + Sync,
{
    fn render(&self, text: &str) {
        self(text)
    }
}
