//! # Import Configuration
//!
//! Tuning knobs for a recording import.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for the probed worker budget.
pub const MAX_PROBED_WORKERS: usize = 8;

/// Recording import configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Number of tracks loaded concurrently.
    ///
    /// Default: `None`, meaning the available parallelism capped at 8.
    #[serde(default)]
    pub worker_budget: Option<usize>,

    /// Bytes buffered before the container is probed.
    ///
    /// Default: 1 MiB.
    #[serde(default = "default_prime_bytes")]
    pub prime_bytes: usize,

    /// Caption lines committed per batch.
    ///
    /// Default: 16.
    #[serde(default = "default_caption_batch_size")]
    pub caption_batch_size: usize,

    /// Chunks queued between the transport and the decoder thread.
    #[serde(default = "default_byte_channel_capacity")]
    pub byte_channel_capacity: usize,

    /// Decoded frames queued between the decoder thread and the track sink.
    #[serde(default = "default_frame_channel_capacity")]
    pub frame_channel_capacity: usize,

    /// Scheme used for the metadata and caption documents.
    ///
    /// Default: `https`.
    #[serde(default = "default_http_scheme")]
    pub http_scheme: String,

    /// Longest wait for the next chunk before the track fails.
    ///
    /// Default: `None` (wait forever).
    #[serde(default)]
    pub chunk_timeout: Option<Duration>,

    /// Consecutive undecodable packets tolerated before a track fails.
    ///
    /// Default: 10.
    #[serde(default = "default_max_consecutive_decode_errors")]
    pub max_consecutive_decode_errors: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            worker_budget: None,
            prime_bytes: default_prime_bytes(),
            caption_batch_size: default_caption_batch_size(),
            byte_channel_capacity: default_byte_channel_capacity(),
            frame_channel_capacity: default_frame_channel_capacity(),
            http_scheme: default_http_scheme(),
            chunk_timeout: None,
            max_consecutive_decode_errors: default_max_consecutive_decode_errors(),
        }
    }
}

impl ImportConfig {
    pub fn with_worker_budget(mut self, budget: usize) -> Self {
        self.worker_budget = Some(budget);
        self
    }

    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = Some(timeout);
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_budget == Some(0) {
            return Err("worker_budget must be > 0".to_string());
        }

        if self.prime_bytes == 0 {
            return Err("prime_bytes must be > 0".to_string());
        }

        if self.caption_batch_size == 0 {
            return Err("caption_batch_size must be > 0".to_string());
        }

        if self.byte_channel_capacity == 0 {
            return Err("byte_channel_capacity must be > 0".to_string());
        }

        if self.frame_channel_capacity == 0 {
            return Err("frame_channel_capacity must be > 0".to_string());
        }

        if self.max_consecutive_decode_errors == 0 {
            return Err("max_consecutive_decode_errors must be > 0".to_string());
        }

        if self.chunk_timeout == Some(Duration::ZERO) {
            return Err("chunk_timeout must be > 0 when set".to_string());
        }

        if !matches!(self.http_scheme.as_str(), "http" | "https") {
            return Err(format!("unsupported http_scheme '{}'", self.http_scheme));
        }

        Ok(())
    }

    /// Configured budget, or the platform's parallelism capped at
    /// [`MAX_PROBED_WORKERS`].
    pub fn effective_worker_budget(&self) -> usize {
        match self.worker_budget {
            Some(budget) => budget,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(MAX_PROBED_WORKERS),
        }
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_prime_bytes() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_caption_batch_size() -> usize {
    16
}

fn default_byte_channel_capacity() -> usize {
    64
}

fn default_frame_channel_capacity() -> usize {
    32
}

fn default_http_scheme() -> String {
    "https".to_string()
}

fn default_max_consecutive_decode_errors() -> usize {
    10
}
