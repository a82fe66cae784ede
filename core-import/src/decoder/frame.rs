//! Decoded audio types handed to track sinks.

use serde::{Deserialize, Serialize};

/// Packed (interleaved) sample formats produced by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    F32,
    F64,
}

/// Format of a track, fixed by its first decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
    /// Speaker mask: front-center for mono, otherwise the lowest
    /// `channels` speaker bits.
    pub channel_layout: u64,
}

impl TrackFormat {
    pub fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
            channel_layout: channel_layout_for(channels),
        }
    }

    /// Seconds covered by `frames` samples per channel at the track rate.
    pub fn seconds_for(&self, frames: usize) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f64 / self.sample_rate as f64
    }
}

/// Channel-layout mask for a channel count.
pub fn channel_layout_for(channels: u16) -> u64 {
    match channels {
        1 => 0x4,
        n if n >= 64 => u64::MAX,
        n => (1u64 << n) - 1,
    }
}

/// Interleaved samples in one of the packed formats.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    U8(Vec<u8>),
    S16(Vec<i16>),
    S32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Samples {
    pub fn format(&self) -> SampleFormat {
        match self {
            Samples::U8(_) => SampleFormat::U8,
            Samples::S16(_) => SampleFormat::S16,
            Samples::S32(_) => SampleFormat::S32,
            Samples::F32(_) => SampleFormat::F32,
            Samples::F64(_) => SampleFormat::F64,
        }
    }

    /// Total sample count across all channels.
    pub fn len(&self) -> usize {
        match self {
            Samples::U8(s) => s.len(),
            Samples::S16(s) => s.len(),
            Samples::S32(s) => s.len(),
            Samples::F32(s) => s.len(),
            Samples::F64(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One block of decoded, interleaved PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub samples: Samples,
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per channel.
    pub frames: usize,
}

impl DecodedFrame {
    pub fn sample_format(&self) -> SampleFormat {
        self.samples.format()
    }

    /// Playback length of this frame in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_layout() {
        assert_eq!(channel_layout_for(1), 0x4);
        assert_eq!(channel_layout_for(2), 0x3);
        assert_eq!(channel_layout_for(6), 0x3f);
    }

    #[test]
    fn test_frame_duration() {
        let frame = DecodedFrame {
            samples: Samples::S16(vec![0; 960 * 2]),
            sample_rate: 48_000,
            channels: 2,
            frames: 960,
        };

        assert_eq!(frame.sample_format(), SampleFormat::S16);
        assert!((frame.duration_secs() - 0.02).abs() < 1e-9);
        assert_eq!(frame.samples.len(), 1920);
    }

    #[test]
    fn test_track_rate_measures_progress() {
        let format = TrackFormat::new(48_000, 1, SampleFormat::F32);
        assert!((format.seconds_for(4_800) - 0.1).abs() < 1e-9);
        assert!((format.seconds_for(4_410) - 0.091875).abs() < 1e-9);
        assert_eq!(TrackFormat::new(0, 1, SampleFormat::F32).seconds_for(10), 0.0);
    }
}
