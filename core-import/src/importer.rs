//! # Recording Importer
//!
//! Top-level import flow for one recording session:
//!
//! 1. Fetch the recording info (fatal on failure)
//! 2. Create one audio track per speaker and per sound effect, plus caption
//!    tracks when the recording was transcribed
//! 3. Load all audio tracks through the [`Scheduler`]
//! 4. Load captions
//! 5. Report per-track outcomes

use crate::captions::{CaptionJob, CaptionLoader, CaptionOutcome};
use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::loader::TrackLoader;
use crate::metadata::{RecordingInfo, RecordingMetadataClient, Session};
use crate::scheduler::{Job, JobKind, JobOutcome, Scheduler};
use crate::status::{StatusBoard, StatusEntry, LOADING_HEADER};
use crate::traits::{Project, StatusRenderer};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, ImportEvent};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Summary of a finished import.
#[derive(Debug)]
pub struct ImportReport {
    pub project_name: String,
    /// Audio job outcomes, ordered by status slot.
    pub jobs: Vec<JobOutcome>,
    pub captions: Vec<CaptionOutcome>,
    /// Final state of every status entry.
    pub status: Vec<StatusEntry>,
    /// Last progress text handed to the renderer.
    pub status_text: String,
}

impl ImportReport {
    pub fn succeeded(&self) -> usize {
        self.jobs.iter().filter(|job| job.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.jobs.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn caption_lines(&self) -> usize {
        self.captions.iter().map(|caption| caption.lines).sum()
    }
}

struct ImportPlan {
    jobs: Vec<Job>,
    caption_jobs: Vec<CaptionJob>,
    status: StatusBoard,
}

/// Imports recordings into host projects.
pub struct RecordingImporter {
    core: CoreConfig,
    config: ImportConfig,
    metadata: RecordingMetadataClient,
    renderer: Arc<dyn StatusRenderer>,
}

impl RecordingImporter {
    pub fn new(
        core: CoreConfig,
        config: ImportConfig,
        renderer: Arc<dyn StatusRenderer>,
    ) -> Result<Self> {
        config.validate().map_err(ImportError::InvalidConfig)?;

        let metadata = RecordingMetadataClient::new(core.http_client.clone(), &config.http_scheme);
        Ok(Self {
            core,
            config,
            metadata,
            renderer,
        })
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn metadata_client(&self) -> &RecordingMetadataClient {
        &self.metadata
    }

    /// Import every track of `session` into `project`.
    ///
    /// Only metadata, configuration and track creation failures abort the
    /// import. Track and caption failures are collected in the report.
    #[instrument(skip_all, fields(host = %session.host, project = %project.name()))]
    pub async fn import(
        &self,
        project: &dyn Project,
        session: &Session,
        cancel: CancellationToken,
    ) -> Result<ImportReport> {
        let info = self.metadata.fetch_info(session).await?;
        info!(
            tracks = info.tracks.len(),
            sfx = info.sfx,
            transcription = info.transcription,
            "Recording info fetched"
        );

        let plan = self.plan(project, &info).await?;
        let ImportPlan {
            jobs,
            caption_jobs,
            status,
        } = plan;

        self.core.emit(CoreEvent::Import(ImportEvent::Started {
            project_name: project.name().to_string(),
            audio_tracks: jobs.len(),
            caption_tracks: caption_jobs.len(),
        }));
        self.renderer.render(&status.render_text());

        let scheduler = Scheduler::new(self.config.effective_worker_budget())?;
        let loader = Arc::new(TrackLoader::new(
            self.core.clone(),
            session.clone(),
            &self.config,
            status.clone(),
            self.renderer.clone(),
        ));
        let report = scheduler.run_all(loader, jobs, cancel.clone()).await;

        // Jobs that never ran still need a visible state.
        for outcome in report.failures() {
            let untouched = status
                .progress(outcome.status_slot)
                .map_or(false, |progress| !progress.is_terminal());
            if untouched {
                if let Err(e) = &outcome.result {
                    status.fail(outcome.status_slot, e.to_string());
                }
            }
        }

        self.renderer.render(LOADING_HEADER);
        let caption_loader = CaptionLoader::new(
            self.metadata.clone(),
            self.config.caption_batch_size,
            self.renderer.clone(),
            self.core.clone(),
        );
        let captions = caption_loader.load(session, caption_jobs, cancel).await;

        let status_text = if status.has_failures() {
            status.render_text()
        } else {
            LOADING_HEADER.to_string()
        };
        self.renderer.render(&status_text);

        let import_report = ImportReport {
            project_name: project.name().to_string(),
            jobs: report.outcomes,
            captions,
            status: status.snapshot(),
            status_text,
        };

        if import_report.is_success() {
            info!(tracks = import_report.succeeded(), "Import completed");
        } else {
            warn!(
                succeeded = import_report.succeeded(),
                failed = import_report.failed(),
                "Import completed with failures"
            );
        }
        self.core.emit(CoreEvent::Import(ImportEvent::Completed {
            succeeded: import_report.succeeded(),
            failed: import_report.failed(),
        }));

        Ok(import_report)
    }

    async fn plan(&self, project: &dyn Project, info: &RecordingInfo) -> Result<ImportPlan> {
        let mut jobs = Vec::new();
        let mut caption_jobs = Vec::new();
        let mut names = Vec::new();

        for track in &info.tracks {
            let name = format!("{}-{}", track.index, track.nick);
            let sink = project.new_audio_track(&name).await?;

            if info.transcription {
                let captions = project.new_caption_track(&name).await?;
                caption_jobs.push(CaptionJob {
                    track_index: track.index,
                    track: captions,
                });
            }

            names.push(sink.name().to_string());
            jobs.push(Job::new(
                JobKind::Primary,
                sink,
                track.index,
                (track.index - 1) as usize,
            ));
        }

        let primary_count = info.tracks.len();
        for index in 1..=info.sfx {
            let sink = project.new_audio_track(&format!("SFX-{}", index)).await?;
            names.push(sink.name().to_string());
            jobs.push(Job::new(
                JobKind::Auxiliary,
                sink,
                index,
                primary_count + index as usize - 1,
            ));
        }

        Ok(ImportPlan {
            jobs,
            caption_jobs,
            status: StatusBoard::new(names),
        })
    }
}
