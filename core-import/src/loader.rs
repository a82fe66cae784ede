//! # Track Loader
//!
//! Loads one track: opens the chunk transport, decodes it and streams the
//! frames into the track's sink while keeping the status board current.

use crate::config::ImportConfig;
use crate::decoder::{DecodePipeline, PipelineObserver, TrackFormat};
use crate::error::{ImportError, Result};
use crate::metadata::Session;
use crate::scheduler::{Job, JobRunner};
use crate::status::StatusBoard;
use crate::traits::{AudioTrackSink, StatusRenderer};
use crate::transport::ChunkTransport;
use async_trait::async_trait;
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, ImportEvent};
use futures::{future, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// [`JobRunner`] that loads audio tracks from one recording session.
pub struct TrackLoader {
    core: CoreConfig,
    session: Session,
    pipeline: DecodePipeline,
    chunk_timeout: Option<Duration>,
    status: StatusBoard,
    renderer: Arc<dyn StatusRenderer>,
}

impl TrackLoader {
    pub fn new(
        core: CoreConfig,
        session: Session,
        config: &ImportConfig,
        status: StatusBoard,
        renderer: Arc<dyn StatusRenderer>,
    ) -> Self {
        Self {
            core,
            session,
            pipeline: DecodePipeline::new(config),
            chunk_timeout: config.chunk_timeout,
            status,
            renderer,
        }
    }

    fn render(&self) {
        self.renderer.render(&self.status.render_text());
    }

    async fn load(&self, job: &Job, cancel: CancellationToken) -> Result<()> {
        let connector = self.core.message_connector.as_ref();
        let transport = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ImportError::Cancelled),
            transport = ChunkTransport::open(
                connector,
                &self.session,
                job.kind.command(),
                job.track_index,
            ) => transport?,
        };
        let transport = transport.with_chunk_timeout(self.chunk_timeout);

        self.status.start(job.status_slot);
        self.render();

        let observer = Arc::new(LoaderObserver {
            track: job.track.clone(),
            slot: job.status_slot,
            status: self.status.clone(),
            renderer: self.renderer.clone(),
            core: self.core.clone(),
        });

        let frames = self
            .pipeline
            .open(transport.into_byte_stream(), observer, cancel)
            .await?;

        // The sink sees a plain frame stream; the first error ends it and is
        // reported after the sink returns.
        let failure = Arc::new(Mutex::new(None));
        let failure_slot = failure.clone();
        let frames = frames
            .scan((), move |_, item| {
                future::ready(match item {
                    Ok(frame) => Some(frame),
                    Err(e) => {
                        *failure_slot.lock() = Some(e);
                        None
                    }
                })
            })
            .boxed();

        job.track.append(frames).await?;

        // Bind before returning so the guard drops ahead of `failure`.
        let error = failure.lock().take();
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl JobRunner for TrackLoader {
    #[instrument(
        skip(self, job, cancel),
        fields(track = %job.name(), index = job.track_index, slot = job.status_slot)
    )]
    async fn run(&self, job: Job, cancel: CancellationToken) -> Result<()> {
        let result = self.load(&job, cancel).await;
        let track = job.name().to_string();

        match &result {
            Ok(()) => {
                info!("Track loaded");
                self.status.finish(job.status_slot);
                self.core
                    .emit(CoreEvent::Import(ImportEvent::TrackFinished { track }));
            }
            Err(e) => {
                warn!(error = %e, "Track failed to load");
                self.status.fail(job.status_slot, e.to_string());
                self.core.emit(CoreEvent::Import(ImportEvent::TrackFailed {
                    track,
                    message: e.to_string(),
                }));
            }
        }

        self.render();
        result
    }
}

struct LoaderObserver {
    track: Arc<dyn AudioTrackSink>,
    slot: usize,
    status: StatusBoard,
    renderer: Arc<dyn StatusRenderer>,
    core: CoreConfig,
}

impl PipelineObserver for LoaderObserver {
    fn format_discovered(&self, format: &TrackFormat) {
        debug!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            sample_format = ?format.sample_format,
            "Track format discovered"
        );
        self.track.set_format(*format);
    }

    fn frames_decoded(&self, seconds: f64) {
        let Some(total) = self.status.advance(self.slot, seconds) else {
            return;
        };
        self.renderer.render(&self.status.render_text());
        self.core.emit(CoreEvent::Import(ImportEvent::TrackProgress {
            track: self.track.name().to_string(),
            seconds: total,
        }));
    }
}
