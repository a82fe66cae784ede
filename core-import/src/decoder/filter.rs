//! # Format Filter
//!
//! Converts decoder output (planar, any sample type) into packed frames of
//! the matching packed sample type. The filter is configured lazily from the
//! first non-empty decoded buffer; that buffer also fixes the track format.

use super::frame::{DecodedFrame, SampleFormat, Samples, TrackFormat};
use symphonia::core::audio::{AudioBufferRef, SampleBuffer, SignalSpec};
use tracing::{debug, warn};

/// Packed counterpart of a decoder sample type. Formats without an exact
/// packed counterpart widen to the next packed type.
pub fn packed_format_for(buffer: &AudioBufferRef<'_>) -> SampleFormat {
    match buffer {
        AudioBufferRef::U8(_) | AudioBufferRef::S8(_) => SampleFormat::U8,
        AudioBufferRef::U16(_) | AudioBufferRef::S16(_) => SampleFormat::S16,
        AudioBufferRef::U24(_)
        | AudioBufferRef::S24(_)
        | AudioBufferRef::U32(_)
        | AudioBufferRef::S32(_) => SampleFormat::S32,
        AudioBufferRef::F32(_) => SampleFormat::F32,
        AudioBufferRef::F64(_) => SampleFormat::F64,
    }
}

enum PackedBuffer {
    U8(SampleBuffer<u8>),
    S16(SampleBuffer<i16>),
    S32(SampleBuffer<i32>),
    F32(SampleBuffer<f32>),
    F64(SampleBuffer<f64>),
}

impl PackedBuffer {
    fn new(format: SampleFormat, capacity: u64, spec: SignalSpec) -> Self {
        match format {
            SampleFormat::U8 => PackedBuffer::U8(SampleBuffer::new(capacity, spec)),
            SampleFormat::S16 => PackedBuffer::S16(SampleBuffer::new(capacity, spec)),
            SampleFormat::S32 => PackedBuffer::S32(SampleBuffer::new(capacity, spec)),
            SampleFormat::F32 => PackedBuffer::F32(SampleBuffer::new(capacity, spec)),
            SampleFormat::F64 => PackedBuffer::F64(SampleBuffer::new(capacity, spec)),
        }
    }

    fn pack(&mut self, decoded: AudioBufferRef<'_>) -> Samples {
        match self {
            PackedBuffer::U8(buf) => {
                buf.copy_interleaved_ref(decoded);
                Samples::U8(buf.samples().to_vec())
            }
            PackedBuffer::S16(buf) => {
                buf.copy_interleaved_ref(decoded);
                Samples::S16(buf.samples().to_vec())
            }
            PackedBuffer::S32(buf) => {
                buf.copy_interleaved_ref(decoded);
                Samples::S32(buf.samples().to_vec())
            }
            PackedBuffer::F32(buf) => {
                buf.copy_interleaved_ref(decoded);
                Samples::F32(buf.samples().to_vec())
            }
            PackedBuffer::F64(buf) => {
                buf.copy_interleaved_ref(decoded);
                Samples::F64(buf.samples().to_vec())
            }
        }
    }
}

struct Configured {
    format: TrackFormat,
    spec: SignalSpec,
    capacity: u64,
    buffer: PackedBuffer,
}

enum FilterState {
    Unconfigured,
    Configured(Configured),
}

/// Result of pushing one decoded buffer through the filter.
pub struct Filtered {
    /// Set only for the buffer that configured the filter.
    pub discovered: Option<TrackFormat>,
    pub frame: DecodedFrame,
}

pub struct FormatFilter {
    state: FilterState,
}

impl FormatFilter {
    pub fn new() -> Self {
        Self {
            state: FilterState::Unconfigured,
        }
    }

    pub fn format(&self) -> Option<TrackFormat> {
        match &self.state {
            FilterState::Unconfigured => None,
            FilterState::Configured(configured) => Some(configured.format),
        }
    }

    /// Convert one decoded buffer. Empty buffers yield nothing and do not
    /// configure the filter.
    pub fn push(&mut self, decoded: AudioBufferRef<'_>) -> Option<Filtered> {
        let frames = decoded.frames();
        if frames == 0 {
            return None;
        }

        let spec = *decoded.spec();
        let capacity = decoded.capacity() as u64;
        let mut discovered = None;

        if let FilterState::Unconfigured = self.state {
            let sample_format = packed_format_for(&decoded);
            let format = TrackFormat::new(spec.rate, spec.channels.count() as u16, sample_format);
            debug!(?format, "Configuring format filter");

            self.state = FilterState::Configured(Configured {
                format,
                spec,
                capacity,
                buffer: PackedBuffer::new(sample_format, capacity, spec),
            });
            discovered = Some(format);
        }

        let FilterState::Configured(configured) = &mut self.state else {
            return None;
        };

        if spec != configured.spec || capacity > configured.capacity {
            if spec != configured.spec {
                warn!(
                    rate = spec.rate,
                    channels = spec.channels.count(),
                    "Decoded signal changed mid-stream, track format is kept"
                );
            }
            configured.spec = spec;
            configured.capacity = capacity.max(configured.capacity);
            configured.buffer =
                PackedBuffer::new(configured.format.sample_format, configured.capacity, spec);
        }

        let samples = configured.buffer.pack(decoded);

        Some(Filtered {
            discovered,
            frame: DecodedFrame {
                samples,
                sample_rate: spec.rate,
                channels: spec.channels.count() as u16,
                frames,
            },
        })
    }
}

impl Default for FormatFilter {
    fn default() -> Self {
        Self::new()
    }
}
