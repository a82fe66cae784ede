//! # Opus Codec
//!
//! Symphonia demuxes Ogg/Opus but ships no Opus decoder. This module plugs a
//! libopus-backed decoder (the `opus` crate) into a codec registry that also
//! holds every codec symphonia enables by default.
//!
//! Output is 48 kHz planar `f32`. The OpusHead pre-skip is dropped from the
//! start of the track and its output gain is applied by libopus.

use once_cell::sync::Lazy;
use opus::{Channels as OpusChannels, Decoder as LibOpusDecoder};
use parking_lot::Mutex;
use symphonia::core::audio::{AsAudioBufferRef, AudioBuffer, AudioBufferRef, Channels, Signal, SignalSpec};
use symphonia::core::codecs::{
    CodecDescriptor, CodecParameters, CodecRegistry, Decoder, DecoderOptions, FinalizeResult,
    CODEC_TYPE_OPUS,
};
use symphonia::core::errors::{decode_error, unsupported_error, Result as SymphoniaResult};
use symphonia::core::formats::Packet;
use tracing::{debug, warn};

/// Opus always decodes at 48 kHz.
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

/// 120 ms at 48 kHz, the longest Opus packet.
const MAX_FRAME_SAMPLES: usize = 5760;

static CODECS: Lazy<CodecRegistry> = Lazy::new(|| {
    let mut registry = CodecRegistry::new();
    symphonia::default::register_enabled_codecs(&mut registry);
    registry.register_all::<OpusPacketDecoder>();
    registry
});

/// Symphonia's default codecs plus Opus.
pub fn codec_registry() -> &'static CodecRegistry {
    &CODECS
}

const OPUS_CODECS: &[CodecDescriptor] = &[CodecDescriptor {
    codec: CODEC_TYPE_OPUS,
    short_name: "opus",
    long_name: "Opus (libopus)",
    inst_func: instantiate,
}];

fn instantiate(
    params: &CodecParameters,
    options: &DecoderOptions,
) -> SymphoniaResult<Box<dyn Decoder>> {
    Ok(Box::new(OpusPacketDecoder::try_new(params, options)?))
}

/// Fields of the Opus identification header used for decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpusHead {
    channels: usize,
    pre_skip: usize,
    output_gain: i16,
}

impl OpusHead {
    fn parse(data: &[u8]) -> SymphoniaResult<Self> {
        if data.len() < 19 || &data[0..8] != b"OpusHead" {
            return decode_error("opus: invalid identification header");
        }
        if data[8] == 0 || data[8] > 15 {
            return unsupported_error("opus: unsupported header version");
        }

        let channels = data[9] as usize;
        let mapping_family = data[18];
        if channels == 0 || channels > 2 || mapping_family > 1 {
            return unsupported_error("opus: only mono and stereo streams are supported");
        }

        Ok(Self {
            channels,
            pre_skip: u16::from_le_bytes([data[10], data[11]]) as usize,
            output_gain: i16::from_le_bytes([data[16], data[17]]),
        })
    }

    /// Header values when the demuxer did not pass the raw header along.
    fn from_params(params: &CodecParameters) -> SymphoniaResult<Self> {
        let channels = params.channels.map(|c| c.count()).unwrap_or(0);
        if channels == 0 || channels > 2 {
            return unsupported_error("opus: only mono and stereo streams are supported");
        }
        Ok(Self {
            channels,
            pre_skip: params.delay.unwrap_or(0) as usize,
            output_gain: 0,
        })
    }
}

/// Symphonia [`Decoder`] over libopus.
pub struct OpusPacketDecoder {
    params: CodecParameters,
    decoder: Mutex<LibOpusDecoder>,
    channels: usize,
    pre_skip: usize,
    initial_pre_skip: usize,
    pcm: Vec<f32>,
    buf: AudioBuffer<f32>,
}

impl OpusPacketDecoder {
    fn build(params: &CodecParameters, head: OpusHead) -> SymphoniaResult<Self> {
        let (opus_channels, layout) = match head.channels {
            1 => (OpusChannels::Mono, Channels::FRONT_LEFT),
            _ => (OpusChannels::Stereo, Channels::FRONT_LEFT | Channels::FRONT_RIGHT),
        };

        let mut decoder = match LibOpusDecoder::new(OPUS_SAMPLE_RATE, opus_channels) {
            Ok(decoder) => decoder,
            Err(e) => {
                warn!(error = %e, "libopus decoder creation failed");
                return unsupported_error("opus: decoder creation failed");
            }
        };
        if head.output_gain != 0 {
            if let Err(e) = decoder.set_gain(i32::from(head.output_gain)) {
                warn!(error = %e, gain = head.output_gain, "Ignoring Opus output gain");
            }
        }

        debug!(
            channels = head.channels,
            pre_skip = head.pre_skip,
            gain = head.output_gain,
            "Opus decoder ready"
        );

        Ok(Self {
            params: params.clone(),
            decoder: Mutex::new(decoder),
            channels: head.channels,
            pre_skip: head.pre_skip,
            initial_pre_skip: head.pre_skip,
            pcm: vec![0.0; MAX_FRAME_SAMPLES * head.channels],
            buf: AudioBuffer::new(
                MAX_FRAME_SAMPLES as u64,
                SignalSpec::new(OPUS_SAMPLE_RATE, layout),
            ),
        })
    }
}

impl Decoder for OpusPacketDecoder {
    fn try_new(params: &CodecParameters, _options: &DecoderOptions) -> SymphoniaResult<Self> {
        let head = match params.extra_data.as_deref() {
            Some(header) => OpusHead::parse(header)?,
            None => OpusHead::from_params(params)?,
        };
        Self::build(params, head)
    }

    fn supported_codecs() -> &'static [CodecDescriptor] {
        OPUS_CODECS
    }

    fn reset(&mut self) {
        if let Err(e) = self.decoder.get_mut().reset_state() {
            warn!(error = %e, "Failed to reset Opus decoder");
        }
        self.pre_skip = self.initial_pre_skip;
    }

    fn codec_params(&self) -> &CodecParameters {
        &self.params
    }

    fn decode(&mut self, packet: &Packet) -> SymphoniaResult<AudioBufferRef<'_>> {
        let decoded = self
            .decoder
            .get_mut()
            .decode_float(packet.buf(), &mut self.pcm, false);
        let frames = match decoded {
            Ok(frames) => frames,
            Err(e) => {
                warn!(error = %e, "Opus packet rejected");
                return decode_error("opus: invalid packet");
            }
        };

        let skip = self.pre_skip.min(frames);
        self.pre_skip -= skip;

        self.buf.clear();
        self.buf.render_reserved(Some(frames - skip));
        for ch in 0..self.channels {
            let plane = self.buf.chan_mut(ch);
            for (i, sample) in plane.iter_mut().enumerate() {
                *sample = self.pcm[(skip + i) * self.channels + ch];
            }
        }

        Ok(self.buf.as_audio_buffer_ref())
    }

    fn finalize(&mut self) -> FinalizeResult {
        FinalizeResult::default()
    }

    fn last_decoded(&self) -> AudioBufferRef<'_> {
        self.buf.as_audio_buffer_ref()
    }
}
