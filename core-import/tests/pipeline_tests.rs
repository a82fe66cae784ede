//! Integration tests for the decode pipeline using generated WAV audio.

mod support;

use bytes::Bytes;
use core_import::config::ImportConfig;
use core_import::decoder::{
    DecodePipeline, NoopObserver, PipelineObserver, SampleFormat, Samples, TrackFormat,
};
use core_import::transport::ByteStream;
use core_import::ImportError;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use support::{
    ogg_opus, split_payloads, wav_s16, wav_sample, OPUS_PACKET_FRAMES, OPUS_PRE_SKIP,
};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct CountingObserver {
    formats: Mutex<Vec<TrackFormat>>,
    seconds: Mutex<f64>,
    callbacks: Mutex<usize>,
}

impl PipelineObserver for CountingObserver {
    fn format_discovered(&self, format: &TrackFormat) {
        self.formats.lock().push(*format);
    }

    fn frames_decoded(&self, seconds: f64) {
        *self.seconds.lock() += seconds;
        *self.callbacks.lock() += 1;
    }
}

fn byte_stream(payloads: Vec<Bytes>) -> ByteStream {
    stream::iter(payloads.into_iter().map(Ok)).boxed()
}

fn pipeline(prime_bytes: usize) -> DecodePipeline {
    DecodePipeline::new(&ImportConfig {
        prime_bytes,
        ..Default::default()
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_decodes_wav_stream() {
    let frames = 48_000;
    let wav = wav_s16(48_000, 2, frames);
    let observer = Arc::new(CountingObserver::default());

    // Small priming window so most bytes go through the feeder task.
    let decoded = pipeline(1024)
        .open(
            byte_stream(split_payloads(&wav, 3000)),
            observer.clone(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let decoded: Vec<_> = decoded.collect().await;

    let decoded: Vec<_> = decoded.into_iter().map(|f| f.unwrap()).collect();
    assert!(!decoded.is_empty());
    assert_eq!(decoded.iter().map(|f| f.frames).sum::<usize>(), frames);
    assert!(decoded.iter().all(|f| f.sample_rate == 48_000 && f.channels == 2));

    let Samples::S16(first) = &decoded[0].samples else {
        panic!("expected packed s16 samples");
    };
    assert_eq!(first[0], wav_sample(0, 0));
    assert_eq!(first[1], wav_sample(0, 1));
    assert_eq!(first[2], wav_sample(1, 0));

    let formats = observer.formats.lock().clone();
    assert_eq!(formats.len(), 1);
    assert_eq!(formats[0].sample_format, SampleFormat::S16);
    assert_eq!(formats[0].channel_layout, 0x3);

    assert_eq!(*observer.callbacks.lock(), decoded.len());
    assert!((*observer.seconds.lock() - 1.0).abs() < 1e-6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stream_shorter_than_priming_window() {
    let wav = wav_s16(16_000, 1, 1600);

    let decoded = pipeline(1024 * 1024)
        .open(
            byte_stream(split_payloads(&wav, 512)),
            Arc::new(NoopObserver),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let decoded: Vec<_> = decoded.collect().await;

    let total: usize = decoded.iter().map(|f| f.as_ref().unwrap().frames).sum();
    assert_eq!(total, 1600);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_decodes_ogg_opus_stream() {
    let packets = 50;
    let observer = Arc::new(CountingObserver::default());

    let decoded = pipeline(1024)
        .open(
            byte_stream(split_payloads(&ogg_opus(packets), 512)),
            observer.clone(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let decoded: Vec<_> = decoded.collect().await;

    let decoded: Vec<_> = decoded.into_iter().map(|f| f.unwrap()).collect();
    let total: usize = decoded.iter().map(|f| f.frames).sum();
    assert_eq!(total, packets * OPUS_PACKET_FRAMES - OPUS_PRE_SKIP);
    assert!(decoded.iter().all(|f| f.sample_rate == 48_000 && f.channels == 1));

    let formats = observer.formats.lock().clone();
    assert_eq!(formats.len(), 1);
    assert_eq!(formats[0].sample_format, SampleFormat::F32);
    assert_eq!(formats[0].sample_rate, 48_000);
    assert_eq!(formats[0].channel_layout, 0x4);

    let peak = decoded
        .iter()
        .flat_map(|f| match &f.samples {
            Samples::F32(samples) => samples.clone(),
            other => panic!("expected packed f32 samples, got {:?}", other.format()),
        })
        .fold(0.0f32, |peak, s| peak.max(s.abs()));
    assert!(peak > 0.1, "decoded tone is silent (peak {})", peak);

    let expected_secs = total as f64 / 48_000.0;
    assert!((*observer.seconds.lock() - expected_secs).abs() < 1e-6);
}

#[tokio::test]
async fn test_empty_stream_yields_no_frames() {
    let observer = Arc::new(CountingObserver::default());

    let decoded = pipeline(1024)
        .open(byte_stream(Vec::new()), observer.clone(), CancellationToken::new())
        .await
        .unwrap();
    let decoded: Vec<_> = decoded.collect().await;

    assert!(decoded.is_empty());
    assert!(observer.formats.lock().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_garbage_is_invalid_format() {
    let garbage = Bytes::from(vec![0x5Au8; 8192]);

    let decoded = pipeline(1024)
        .open(
            byte_stream(vec![garbage]),
            Arc::new(NoopObserver),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let decoded: Vec<_> = decoded.collect().await;

    assert_eq!(decoded.len(), 1);
    let err = decoded[0].as_ref().unwrap_err();
    assert!(matches!(err, ImportError::InvalidFormat(_)));
    assert!(err.is_decode_error());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_byte_stream_error_ends_frames() {
    let wav = wav_s16(8_000, 1, 8_000);
    let mut items: Vec<core_import::Result<Bytes>> =
        split_payloads(&wav.slice(..4096), 1024).into_iter().map(Ok).collect();
    items.push(Err(ImportError::ConnectionClosed("reset".to_string())));

    let decoded = pipeline(1024)
        .open(
            stream::iter(items).boxed(),
            Arc::new(NoopObserver),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let decoded: Vec<_> = decoded.collect().await;

    assert!(decoded
        .iter()
        .any(|item| matches!(item, Err(ImportError::ConnectionClosed(_)))));
}

#[tokio::test]
async fn test_cancel_before_priming() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = pipeline(1024)
        .open(stream::pending().boxed(), Arc::new(NoopObserver), cancel)
        .await;

    assert!(matches!(result, Err(ImportError::Cancelled)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_while_streaming() {
    let wav = wav_s16(8_000, 1, 8_000);
    let head = wav.slice(..2048);
    let bytes = stream::iter(vec![Ok(head)])
        .chain(stream::pending())
        .boxed();

    let cancel = CancellationToken::new();
    let decoded = pipeline(1024)
        .open(bytes, Arc::new(NoopObserver), cancel.clone())
        .await
        .unwrap();

    cancel.cancel();
    let decoded: Vec<_> = decoded.collect().await;

    assert!(decoded
        .iter()
        .any(|item| matches!(item, Err(ImportError::Cancelled))));
}
