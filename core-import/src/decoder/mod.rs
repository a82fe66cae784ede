//! Audio decoding: compressed chunk bytes in, packed PCM frames out.

mod filter;
mod frame;
mod media_source;
mod opus_codec;
mod pipeline;

pub use filter::{packed_format_for, FormatFilter};
pub use frame::{channel_layout_for, DecodedFrame, SampleFormat, Samples, TrackFormat};
pub use opus_codec::{codec_registry, OpusPacketDecoder, OPUS_SAMPLE_RATE};
pub use pipeline::{DecodePipeline, DecodedStream, NoopObserver, PipelineObserver};
