//! # Caption Loader
//!
//! Loads transcription captions after all audio has been imported. Each
//! caption track is fetched whole, empty lines are dropped and the rest is
//! committed in fixed-size batches.

use crate::metadata::{CaptionLine, RecordingMetadataClient, Session};
use crate::status::caption_progress_text;
use crate::traits::{CaptionTrackSink, StatusRenderer};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, ImportEvent};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Caption track to fill from one recorded track.
#[derive(Clone)]
pub struct CaptionJob {
    /// Server-side track index, 1-based.
    pub track_index: u32,
    pub track: Arc<dyn CaptionTrackSink>,
}

/// Result of loading one caption track.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionOutcome {
    pub name: String,
    pub track_index: u32,
    /// Lines committed to the track.
    pub lines: usize,
    pub batches: usize,
    /// Set when the track rejected a batch or the import was cancelled.
    pub error: Option<String>,
}

/// Drop empty lines and split the rest into windows of `batch_size`.
pub fn batch_lines(lines: Vec<CaptionLine>, batch_size: usize) -> Vec<Vec<CaptionLine>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::new();
    let mut current = Vec::with_capacity(batch_size);

    for line in lines.into_iter().filter(|line| !line.is_empty()) {
        current.push(line);
        if current.len() == batch_size {
            batches.push(std::mem::replace(
                &mut current,
                Vec::with_capacity(batch_size),
            ));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

pub struct CaptionLoader {
    metadata: RecordingMetadataClient,
    batch_size: usize,
    renderer: Arc<dyn StatusRenderer>,
    core: CoreConfig,
}

impl CaptionLoader {
    pub fn new(
        metadata: RecordingMetadataClient,
        batch_size: usize,
        renderer: Arc<dyn StatusRenderer>,
        core: CoreConfig,
    ) -> Self {
        Self {
            metadata,
            batch_size,
            renderer,
            core,
        }
    }

    /// Load every caption job in order. Fetch failures leave a track empty;
    /// they never fail the import.
    #[instrument(skip_all, fields(jobs = jobs.len()))]
    pub async fn load(
        &self,
        session: &Session,
        jobs: Vec<CaptionJob>,
        cancel: CancellationToken,
    ) -> Vec<CaptionOutcome> {
        let mut outcomes = Vec::with_capacity(jobs.len());

        for job in jobs {
            let outcome = if cancel.is_cancelled() {
                CaptionOutcome {
                    name: job.track.name().to_string(),
                    track_index: job.track_index,
                    lines: 0,
                    batches: 0,
                    error: Some("cancelled".to_string()),
                }
            } else {
                self.load_one(session, &job, &cancel).await
            };
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn load_one(
        &self,
        session: &Session,
        job: &CaptionJob,
        cancel: &CancellationToken,
    ) -> CaptionOutcome {
        let name = job.track.name().to_string();
        let mut outcome = CaptionOutcome {
            name: name.clone(),
            track_index: job.track_index,
            lines: 0,
            batches: 0,
            error: None,
        };

        let lines = self.metadata.fetch_captions(session, job.track_index).await;
        let batches = batch_lines(lines, self.batch_size);
        debug!(track = %name, batches = batches.len(), "Committing captions");

        for batch in batches {
            if cancel.is_cancelled() {
                outcome.error = Some("cancelled".to_string());
                break;
            }

            let start = batch
                .first()
                .and_then(|line| line.first())
                .map(|word| word.start)
                .unwrap_or(0.0);
            self.renderer.render(&caption_progress_text(&name, start));

            let count = batch.len();
            if let Err(e) = job.track.append_raw(batch).await {
                warn!(track = %name, error = %e, "Caption track rejected a batch");
                outcome.error = Some(e.to_string());
                break;
            }
            outcome.lines += count;
            outcome.batches += 1;
        }

        info!(track = %name, lines = outcome.lines, "Captions loaded");
        self.core.emit(CoreEvent::Import(ImportEvent::CaptionsLoaded {
            track: name,
            lines: outcome.lines,
        }));
        outcome
    }
}
