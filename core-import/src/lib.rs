//! # Recording Import Core
//!
//! Pulls the tracks of a remote multi-track recording into a host project.
//!
//! ## Overview
//!
//! - **Chunk transport** ([`transport`]): one binary message connection per
//!   track, login frame, per-chunk acknowledgements, pull-based byte stream
//! - **Decode pipeline** ([`decoder`]): symphonia demux and decode on a
//!   blocking worker, lazily configured packing filter, lazy frame stream
//! - **Track loader** ([`loader`]): transport plus pipeline into a track sink
//!   with live status updates
//! - **Scheduler** ([`scheduler`]): bounded concurrency, primary tracks first
//! - **Caption loader** ([`captions`]): batched caption commits after audio
//! - **Metadata client** ([`metadata`]): recording info and caption documents
//! - **Importer** ([`importer`]): the whole flow for one session
//!
//! ## Usage
//!
//! ```ignore
//! use core_import::{ImportConfig, LaunchParams, RecordingImporter};
//! use core_runtime::config::CoreConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! let params = LaunchParams::from_url(&launch_url)?;
//! let core = CoreConfig::builder().build()?;
//! let importer = RecordingImporter::new(core, ImportConfig::default(), renderer)?;
//!
//! let report = importer
//!     .import(&project, &params.session, CancellationToken::new())
//!     .await?;
//! println!("{}", report.status_text);
//! ```

pub mod captions;
pub mod config;
pub mod decoder;
pub mod error;
pub mod importer;
pub mod loader;
pub mod metadata;
pub mod protocol;
pub mod scheduler;
pub mod status;
pub mod traits;
pub mod transport;

pub use captions::{CaptionJob, CaptionLoader, CaptionOutcome};
pub use config::ImportConfig;
pub use decoder::{DecodePipeline, DecodedFrame, PipelineObserver, SampleFormat, Samples, TrackFormat};
pub use error::{ImportError, Result};
pub use importer::{ImportReport, RecordingImporter};
pub use loader::TrackLoader;
pub use metadata::{CaptionLine, CaptionWord, LaunchParams, RecordingInfo, RecordingMetadataClient, Session};
pub use scheduler::{Job, JobKind, JobOutcome, JobRunner, Scheduler, SchedulerReport};
pub use status::{StatusBoard, StatusEntry, TrackProgress};
pub use traits::{AudioTrackSink, CaptionTrackSink, FrameStream, Project, StatusRenderer};
pub use transport::{ByteStream, ChunkTransport};
