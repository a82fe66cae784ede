//! Shared fixtures for the integration tests:
//! - an in-memory recording server implementing `MessageConnector`
//! - a mocked `HttpClient`
//! - generated WAV audio
//! - an in-memory project, tracks and status renderer

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::connection::{MessageChannel, MessageConnector, MessageSink, MessageSource};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bytes::{BufMut, Bytes, BytesMut};
use core_import::decoder::{DecodedFrame, TrackFormat};
use core_import::metadata::CaptionLine;
use core_import::protocol::{decode_ack, Chunk, LoginFrame};
use core_import::ImportError;
use core_import::traits::{AudioTrackSink, CaptionTrackSink, FrameStream, Project, StatusRenderer};
use core_runtime::config::CoreConfig;
use futures::StreamExt;
use mockall::mock;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Mock recording server
// ============================================================================

/// What the server sends after the login acknowledgement.
#[derive(Debug, Clone, Default)]
pub struct TrackScript {
    pub messages: Vec<Bytes>,
    /// Close the connection once the messages are sent. Otherwise the
    /// connection stays open and silent.
    pub close_after: bool,
    pub delay: Option<Duration>,
}

impl TrackScript {
    /// Data chunks numbered from 1, followed by the end-of-stream chunk.
    pub fn from_payloads<I>(payloads: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
    {
        let mut messages: Vec<Bytes> = payloads
            .into_iter()
            .enumerate()
            .map(|(i, payload)| {
                Chunk::Data {
                    sequence: i as u32 + 1,
                    payload,
                }
                .encode()
            })
            .collect();
        let end = messages.len() as u32 + 1;
        messages.push(Chunk::End { sequence: end }.encode());

        Self {
            messages,
            close_after: true,
            delay: None,
        }
    }

    /// Messages sent verbatim.
    pub fn raw(messages: Vec<Bytes>, close_after: bool) -> Self {
        Self {
            messages,
            close_after,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Everything one client connection sent.
#[derive(Debug, Default)]
pub struct ConnectionLog {
    pub host: String,
    pub sent: Mutex<Vec<Bytes>>,
    pub closed: AtomicBool,
}

impl ConnectionLog {
    pub fn login(&self) -> Option<LoginFrame> {
        let sent = self.sent.lock();
        sent.first().and_then(|frame| LoginFrame::decode(frame).ok())
    }

    /// Sequence numbers acknowledged, in order.
    pub fn acks(&self) -> Vec<u32> {
        self.sent
            .lock()
            .iter()
            .skip(1)
            .map(|frame| decode_ack(frame).expect("client sent a malformed ack"))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct ServerState {
    scripts: Mutex<HashMap<(u32, u32), TrackScript>>,
    connections: Mutex<Vec<Arc<ConnectionLog>>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    refuse: AtomicBool,
}

/// In-memory recording server. Each track is addressed by
/// `(command, track index)` from the login frame.
#[derive(Clone, Default)]
pub struct MockRecordingServer {
    state: Arc<ServerState>,
}

impl MockRecordingServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, command: u32, track_index: u32, script: TrackScript) {
        self.state
            .scripts
            .lock()
            .insert((command, track_index), script);
    }

    pub fn refuse_connections(&self) {
        self.state.refuse.store(true, Ordering::SeqCst);
    }

    pub fn connections(&self) -> Vec<Arc<ConnectionLog>> {
        self.state.connections.lock().clone()
    }

    /// Connection whose login asked for `(command, track_index)`.
    pub fn connection_for(&self, command: u32, track_index: u32) -> Option<Arc<ConnectionLog>> {
        self.connections().into_iter().find(|log| {
            log.login()
                .map_or(false, |login| login.command == command && login.track_index == track_index)
        })
    }

    /// Highest number of connections open at the same time.
    pub fn peak_connections(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageConnector for MockRecordingServer {
    async fn connect(&self, host: &str) -> BridgeResult<MessageChannel> {
        if self.state.refuse.load(Ordering::SeqCst) {
            return Err(BridgeError::ConnectionFailed(format!("{} refused", host)));
        }

        let log = Arc::new(ConnectionLog {
            host: host.to_string(),
            ..Default::default()
        });
        self.state.connections.lock().push(log.clone());

        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak.fetch_max(active, Ordering::SeqCst);

        let sink = MockSink { log: log.clone() };
        let source = MockSource {
            log,
            state: self.state.clone(),
            queue: None,
            close_after: true,
            delay: None,
        };
        Ok(MessageChannel::new(Box::new(sink), Box::new(source)))
    }
}

struct MockSink {
    log: Arc<ConnectionLog>,
}

#[async_trait]
impl MessageSink for MockSink {
    async fn send(&mut self, message: Bytes) -> BridgeResult<()> {
        if self.log.is_closed() {
            return Err(BridgeError::ConnectionClosed("sink closed".to_string()));
        }
        self.log.sent.lock().push(message);
        Ok(())
    }

    async fn close(&mut self) -> BridgeResult<()> {
        self.log.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MockSource {
    log: Arc<ConnectionLog>,
    state: Arc<ServerState>,
    queue: Option<VecDeque<Bytes>>,
    close_after: bool,
    delay: Option<Duration>,
}

impl MockSource {
    fn load_script(&mut self) -> &mut VecDeque<Bytes> {
        let state = &self.state;
        let log = &self.log;
        let close_after = &mut self.close_after;
        let delay = &mut self.delay;

        self.queue.get_or_insert_with(|| {
            let script = log
                .login()
                .and_then(|login| {
                    state
                        .scripts
                        .lock()
                        .get(&(login.command, login.track_index))
                        .cloned()
                })
                .unwrap_or_else(|| TrackScript::from_payloads(Vec::new()));

            *close_after = script.close_after;
            *delay = script.delay;

            let mut queue = VecDeque::with_capacity(script.messages.len() + 1);
            queue.push_back(Bytes::from_static(&[0; 8]));
            queue.extend(script.messages);
            queue
        })
    }
}

#[async_trait]
impl MessageSource for MockSource {
    async fn recv(&mut self) -> BridgeResult<Option<Bytes>> {
        let next = self.load_script().pop_front();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match next {
            Some(message) => Ok(Some(message)),
            None if self.close_after => Ok(None),
            None => futures::future::pending().await,
        }
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        self.state.active.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// HTTP
// ============================================================================

mock! {
    pub Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
    }
}

pub fn response(status: u16, body: impl Into<Bytes>) -> HttpResponse {
    HttpResponse {
        status,
        headers: HashMap::new(),
        body: body.into(),
    }
}

/// Query parameter `name` of a request URL.
pub fn query_param(request: &HttpRequest, name: &str) -> Option<String> {
    let url = url::Url::parse(&request.url).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// HTTP mock answering `f=info` with `info` and `f=vosk` with the caption
/// body registered for the track index.
pub fn recording_http(info: serde_json::Value, captions: HashMap<u32, String>) -> MockHttp {
    let mut http = MockHttp::new();
    http.expect_execute().returning(move |request| {
        match query_param(&request, "f").as_deref() {
            Some("info") => Ok(response(200, info.to_string())),
            Some("vosk") => {
                let track = query_param(&request, "t")
                    .and_then(|t| t.parse::<u32>().ok())
                    .unwrap_or(0);
                match captions.get(&track) {
                    Some(body) => Ok(response(200, body.clone())),
                    None => Ok(response(404, "")),
                }
            }
            _ => Ok(response(400, "")),
        }
    });
    http
}

pub fn core_config(server: &MockRecordingServer, http: MockHttp) -> CoreConfig {
    CoreConfig::builder()
        .http_client(Arc::new(http))
        .message_connector(Arc::new(server.clone()))
        .build()
        .expect("test core config")
}

// ============================================================================
// Audio fixtures
// ============================================================================

/// Sample value of channel `ch` at frame `i` in [`wav_s16`] output.
pub fn wav_sample(i: usize, ch: usize) -> i16 {
    ((i * 7 + ch * 1000) % 20_000) as i16
}

/// PCM s16 little-endian WAV file with `frames` frames.
pub fn wav_s16(sample_rate: u32, channels: u16, frames: usize) -> Bytes {
    let block_align = channels as u32 * 2;
    let data_len = frames as u32 * block_align;

    let mut buf = BytesMut::with_capacity(44 + data_len as usize);
    buf.put_slice(b"RIFF");
    buf.put_u32_le(36 + data_len);
    buf.put_slice(b"WAVE");

    buf.put_slice(b"fmt ");
    buf.put_u32_le(16);
    buf.put_u16_le(1); // PCM
    buf.put_u16_le(channels);
    buf.put_u32_le(sample_rate);
    buf.put_u32_le(sample_rate * block_align);
    buf.put_u16_le(block_align as u16);
    buf.put_u16_le(16);

    buf.put_slice(b"data");
    buf.put_u32_le(data_len);
    for i in 0..frames {
        for ch in 0..channels as usize {
            buf.put_i16_le(wav_sample(i, ch));
        }
    }
    buf.freeze()
}

/// Samples per channel in each packet of [`ogg_opus`] output (20 ms).
pub const OPUS_PACKET_FRAMES: usize = 960;

/// Pre-skip written to the OpusHead of [`ogg_opus`] output.
pub const OPUS_PRE_SKIP: usize = 312;

fn ogg_crc(data: &[u8]) -> u32 {
    let mut crc = 0u32;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04c1_1db7
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// One Ogg page carrying exactly one packet.
fn ogg_page(sequence: u32, header_type: u8, granule: u64, packet: &[u8]) -> Vec<u8> {
    let mut page = Vec::with_capacity(packet.len() + 64);
    page.extend_from_slice(b"OggS");
    page.push(0);
    page.push(header_type);
    page.extend_from_slice(&granule.to_le_bytes());
    page.extend_from_slice(&0x4543_0001u32.to_le_bytes());
    page.extend_from_slice(&sequence.to_le_bytes());
    page.extend_from_slice(&[0; 4]);

    let mut lacing = vec![255u8; packet.len() / 255];
    lacing.push((packet.len() % 255) as u8);
    page.push(lacing.len() as u8);
    page.extend_from_slice(&lacing);
    page.extend_from_slice(packet);

    let crc = ogg_crc(&page);
    page[22..26].copy_from_slice(&crc.to_le_bytes());
    page
}

/// Mono Ogg/Opus stream of a 440 Hz tone, `packets` packets of 20 ms, the
/// way recording servers deliver tracks.
pub fn ogg_opus(packets: usize) -> Bytes {
    let mut encoder =
        opus::Encoder::new(48_000, opus::Channels::Mono, opus::Application::Audio).unwrap();

    let mut head = b"OpusHead".to_vec();
    head.push(1);
    head.push(1);
    head.extend_from_slice(&(OPUS_PRE_SKIP as u16).to_le_bytes());
    head.extend_from_slice(&48_000u32.to_le_bytes());
    head.extend_from_slice(&0i16.to_le_bytes());
    head.push(0);

    let vendor = b"recording-import tests";
    let mut tags = b"OpusTags".to_vec();
    tags.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    tags.extend_from_slice(vendor);
    tags.extend_from_slice(&0u32.to_le_bytes());

    let mut stream = ogg_page(0, 0x02, 0, &head);
    stream.extend(ogg_page(1, 0x00, 0, &tags));

    let mut packet = vec![0u8; 4000];
    for p in 0..packets {
        let pcm: Vec<f32> = (0..OPUS_PACKET_FRAMES)
            .map(|i| {
                let t = (p * OPUS_PACKET_FRAMES + i) as f32 / 48_000.0;
                0.5 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
            })
            .collect();
        let len = encoder.encode_float(&pcm, &mut packet).unwrap();

        let header_type = if p + 1 == packets { 0x04 } else { 0x00 };
        let granule = ((p + 1) * OPUS_PACKET_FRAMES) as u64;
        stream.extend(ogg_page(p as u32 + 2, header_type, granule, &packet[..len]));
    }

    Bytes::from(stream)
}

/// Split `bytes` into payloads of at most `size` bytes.
pub fn split_payloads(bytes: &Bytes, size: usize) -> Vec<Bytes> {
    let mut payloads = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let end = (offset + size).min(bytes.len());
        payloads.push(bytes.slice(offset..end));
        offset = end;
    }
    payloads
}

// ============================================================================
// In-memory project
// ============================================================================

#[derive(Default)]
pub struct MemoryAudioTrack {
    pub name: String,
    pub formats: Mutex<Vec<TrackFormat>>,
    pub frames: Mutex<Vec<DecodedFrame>>,
    pub appends: AtomicUsize,
    /// Reject appends after taking the first frame.
    pub read_only: bool,
}

impl MemoryAudioTrack {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn total_frames(&self) -> usize {
        self.frames.lock().iter().map(|frame| frame.frames).sum()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }
}

#[async_trait]
impl AudioTrackSink for MemoryAudioTrack {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_format(&self, format: TrackFormat) {
        self.formats.lock().push(format);
    }

    async fn append(&self, mut frames: FrameStream) -> core_import::Result<()> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        while let Some(frame) = frames.next().await {
            self.frames.lock().push(frame);
            if self.read_only {
                return Err(ImportError::Sink(format!("{} is read-only", self.name)));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCaptionTrack {
    pub name: String,
    pub batches: Mutex<Vec<Vec<CaptionLine>>>,
}

impl MemoryCaptionTrack {
    pub fn lines(&self) -> Vec<CaptionLine> {
        self.batches.lock().concat()
    }
}

#[async_trait]
impl CaptionTrackSink for MemoryCaptionTrack {
    fn name(&self) -> &str {
        &self.name
    }

    async fn append_raw(&self, lines: Vec<CaptionLine>) -> core_import::Result<()> {
        self.batches.lock().push(lines);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryProject {
    pub name: String,
    pub audio: Mutex<Vec<Arc<MemoryAudioTrack>>>,
    pub captions: Mutex<Vec<Arc<MemoryCaptionTrack>>>,
    pub read_only_tracks: Mutex<Vec<String>>,
}

impl MemoryProject {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn audio_track(&self, name: &str) -> Option<Arc<MemoryAudioTrack>> {
        self.audio.lock().iter().find(|t| t.name == name).cloned()
    }

    pub fn caption_track(&self, name: &str) -> Option<Arc<MemoryCaptionTrack>> {
        self.captions.lock().iter().find(|t| t.name == name).cloned()
    }

    /// Audio tracks named `name` reject appended audio.
    pub fn make_read_only(&self, name: &str) {
        self.read_only_tracks.lock().push(name.to_string());
    }

    pub fn audio_names(&self) -> Vec<String> {
        self.audio.lock().iter().map(|t| t.name.clone()).collect()
    }
}

#[async_trait]
impl Project for MemoryProject {
    fn name(&self) -> &str {
        &self.name
    }

    async fn new_audio_track(&self, name: &str) -> core_import::Result<Arc<dyn AudioTrackSink>> {
        let track = Arc::new(MemoryAudioTrack {
            read_only: self.read_only_tracks.lock().iter().any(|n| n == name),
            ..MemoryAudioTrack::new(name)
        });
        self.audio.lock().push(track.clone());
        Ok(track)
    }

    async fn new_caption_track(
        &self,
        name: &str,
    ) -> core_import::Result<Arc<dyn CaptionTrackSink>> {
        let track = Arc::new(MemoryCaptionTrack {
            name: name.to_string(),
            ..Default::default()
        });
        self.captions.lock().push(track.clone());
        Ok(track)
    }
}

/// Keeps every rendered text.
#[derive(Default)]
pub struct RecordingRenderer {
    pub texts: Mutex<Vec<String>>,
}

impl RecordingRenderer {
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.texts.lock().last().cloned()
    }
}

impl StatusRenderer for RecordingRenderer {
    fn render(&self, text: &str) {
        self.texts.lock().push(text.to_string());
    }
}
