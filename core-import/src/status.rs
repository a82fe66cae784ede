//! # Status Board
//!
//! Per-track progress table shared by the loader jobs, plus the text
//! rendering shown to the user.
//!
//! Each job owns exactly one slot and is the only writer to it. Readers take
//! consistent snapshots under a short lock.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

pub const LOADING_HEADER: &str = "Loading...";
pub const CAPTIONS_HEADER: &str = "Loading captions...";

/// Loading state of one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum TrackProgress {
    NotStarted,
    /// Seconds of audio appended so far. Never decreases.
    Loading(f64),
    Finished,
    Failed(String),
}

impl TrackProgress {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackProgress::Finished | TrackProgress::Failed(_))
    }

    fn describe(&self) -> String {
        match self {
            TrackProgress::NotStarted => "Not yet loading".to_string(),
            TrackProgress::Loading(seconds) => timestamp(*seconds),
            TrackProgress::Finished => "Finished loading".to_string(),
            TrackProgress::Failed(reason) => format!("Failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub name: String,
    pub progress: TrackProgress,
}

/// Shared progress table. Cloning shares the table.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    entries: Arc<Mutex<Vec<StatusEntry>>>,
}

impl StatusBoard {
    /// One `NotStarted` entry per name, in order.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = names
            .into_iter()
            .map(|name| StatusEntry {
                name: name.into(),
                progress: TrackProgress::NotStarted,
            })
            .collect();
        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn update<R>(&self, slot: usize, f: impl FnOnce(&mut StatusEntry) -> R) -> Option<R> {
        let mut entries = self.entries.lock();
        match entries.get_mut(slot) {
            Some(entry) => Some(f(entry)),
            None => {
                warn!(slot, len = entries.len(), "Status slot out of range");
                None
            }
        }
    }

    /// Move a not-started entry to `Loading(0.0)`.
    pub fn start(&self, slot: usize) {
        self.update(slot, |entry| {
            if entry.progress == TrackProgress::NotStarted {
                entry.progress = TrackProgress::Loading(0.0);
            }
        });
    }

    /// Add `seconds` to a loading entry and return the new total.
    pub fn advance(&self, slot: usize, seconds: f64) -> Option<f64> {
        self.update(slot, |entry| {
            let current = match entry.progress {
                TrackProgress::NotStarted => 0.0,
                TrackProgress::Loading(total) => total,
                _ => return None,
            };
            let total = if seconds.is_finite() && seconds > 0.0 {
                current + seconds
            } else {
                current
            };
            entry.progress = TrackProgress::Loading(total);
            Some(total)
        })
        .flatten()
    }

    pub fn finish(&self, slot: usize) {
        self.update(slot, |entry| entry.progress = TrackProgress::Finished);
    }

    pub fn fail(&self, slot: usize, reason: impl Into<String>) {
        let reason = reason.into();
        self.update(slot, |entry| entry.progress = TrackProgress::Failed(reason));
    }

    pub fn name(&self, slot: usize) -> Option<String> {
        self.entries.lock().get(slot).map(|entry| entry.name.clone())
    }

    pub fn progress(&self, slot: usize) -> Option<TrackProgress> {
        self.entries.lock().get(slot).map(|entry| entry.progress.clone())
    }

    pub fn snapshot(&self) -> Vec<StatusEntry> {
        self.entries.lock().clone()
    }

    pub fn has_failures(&self) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|entry| matches!(entry.progress, TrackProgress::Failed(_)))
    }

    /// Progress text: a header line, then `"<name>: <state>"` per entry.
    pub fn render_text(&self) -> String {
        let entries = self.entries.lock();
        let mut lines = Vec::with_capacity(entries.len() + 1);
        lines.push(LOADING_HEADER.to_string());
        lines.extend(
            entries
                .iter()
                .map(|entry| format!("{}: {}", entry.name, entry.progress.describe())),
        );
        lines.join("\n")
    }
}

/// Format seconds as `H:MM:SS.ss`.
pub fn timestamp(seconds: f64) -> String {
    let hundredths = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 100.0).round() as u64
    } else {
        0
    };

    let hours = hundredths / 360_000;
    let minutes = (hundredths / 6_000) % 60;
    let secs = (hundredths / 100) % 60;
    let frac = hundredths % 100;
    format!("{}:{:02}:{:02}.{:02}", hours, minutes, secs, frac)
}

/// Progress text while committing caption lines.
pub fn caption_progress_text(track: &str, start_seconds: f64) -> String {
    format!("{}\n{}: {}", CAPTIONS_HEADER, track, timestamp(start_seconds))
}
