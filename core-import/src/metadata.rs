//! # Recording Metadata
//!
//! Session parameters and the HTTP documents the recording server publishes
//! next to the audio: the recording info and per-track captions.

use crate::error::{ImportError, Result};
use bridge_traits::{HttpClient, HttpRequest, RetryPolicy};
use core_runtime::logging::redact_url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

const METADATA_PATH: &str = "rec.jss";

// ============================================================================
// Base 36
// ============================================================================

/// Lower-case base-36 rendering used for session parameters.
pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Parse a base-36 value (either case).
pub fn parse_base36(text: &str) -> Result<u64> {
    u64::from_str_radix(text, 36)
        .map_err(|e| ImportError::InvalidSession(format!("'{}' is not base 36: {}", text, e)))
}

// ============================================================================
// Session
// ============================================================================

/// Credentials for one recording on one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: u32,
    pub key: u32,
    /// Host (and optional port) of the recording server.
    pub host: String,
}

impl Session {
    pub fn new(id: u32, key: u32, host: impl Into<String>) -> Self {
        Self {
            id,
            key,
            host: host.into(),
        }
    }

    pub fn id36(&self) -> String {
        to_base36(self.id as u64)
    }

    pub fn key36(&self) -> String {
        to_base36(self.key as u64)
    }
}

/// Session plus the display name carried by the launch URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchParams {
    pub session: Session,
    pub name: String,
}

impl LaunchParams {
    /// Read `i` (id, base 36), `k` (key, base 36) and the optional `nm`
    /// (name, defaults to the raw `i`) from a launch URL.
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ImportError::InvalidSession(
                    "launch URL has no host".to_string(),
                ))
            }
        };

        let mut id = None;
        let mut key = None;
        let mut name = None;
        for (param, value) in url.query_pairs() {
            match param.as_ref() {
                "i" => id = Some(value.into_owned()),
                "k" => key = Some(value.into_owned()),
                "nm" => name = Some(value.into_owned()),
                _ => {}
            }
        }

        let raw_id = id.ok_or_else(|| ImportError::InvalidSession("missing 'i'".to_string()))?;
        let raw_key = key.ok_or_else(|| ImportError::InvalidSession("missing 'k'".to_string()))?;

        let session = Session::new(
            narrow(parse_base36(&raw_id)?, "i")?,
            narrow(parse_base36(&raw_key)?, "k")?,
            host,
        );

        Ok(Self {
            session,
            name: name.unwrap_or(raw_id),
        })
    }

    /// Name of the project the recording is imported into.
    pub fn project_name(&self) -> String {
        format!("ec-{}-{}", self.name, self.session.id36())
    }
}

fn narrow(value: u64, param: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| ImportError::InvalidSession(format!("'{}' does not fit in 32 bits", param)))
}

// ============================================================================
// Documents
// ============================================================================

/// A speaker track listed in the recording info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    /// 1-based track index.
    pub index: u32,
    pub nick: String,
}

/// Parsed recording info document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordingInfo {
    pub transcription: bool,
    /// Primary tracks, indices `1..=tracks.len()`.
    pub tracks: Vec<TrackInfo>,
    /// Number of sound effect tracks.
    pub sfx: u32,
}

impl RecordingInfo {
    /// Parse the `f=info` document.
    ///
    /// `tracks` may be an array (index 0 unused) or an object keyed by
    /// decimal index. Primary tracks run from index 1 up to the first missing
    /// or empty entry.
    pub fn from_json(document: &Value) -> Result<Self> {
        let transcription = document
            .get("info")
            .and_then(|info| info.get("transcription"))
            .map(truthy)
            .unwrap_or(false);

        let tracks_value = document.get("tracks").ok_or_else(|| {
            ImportError::Metadata("recording info has no 'tracks'".to_string())
        })?;

        let mut tracks = Vec::new();
        for index in 1u32.. {
            let entry = match tracks_value {
                Value::Array(items) => items.get(index as usize),
                Value::Object(map) => map.get(&index.to_string()),
                _ => {
                    return Err(ImportError::Metadata(
                        "'tracks' must be an array or an object".to_string(),
                    ))
                }
            };

            let Some(entry) = entry.filter(|value| truthy(value)) else {
                break;
            };

            let nick = match entry.get("nick") {
                Some(Value::String(nick)) => nick.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            tracks.push(TrackInfo { index, nick });
        }

        let sfx = document
            .get("sfx")
            .and_then(Value::as_u64)
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(0);

        Ok(Self {
            transcription,
            tracks,
            sfx,
        })
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// One recognized word. Fields other than `start` are kept as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionWord {
    #[serde(default)]
    pub start: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One caption line: the words spoken in one utterance.
pub type CaptionLine = Vec<CaptionWord>;

// ============================================================================
// Client
// ============================================================================

/// Fetches recording documents through the host [`HttpClient`].
#[derive(Clone)]
pub struct RecordingMetadataClient {
    http_client: Arc<dyn HttpClient>,
    scheme: String,
}

impl RecordingMetadataClient {
    pub fn new(http_client: Arc<dyn HttpClient>, scheme: impl Into<String>) -> Self {
        Self {
            http_client,
            scheme: scheme.into(),
        }
    }

    fn document_url(&self, session: &Session, extra: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}://{}/{}", self.scheme, session.host, METADATA_PATH))
            .map_err(|e| ImportError::InvalidSession(format!("bad server address: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("i", &session.id36());
            query.append_pair("k", &session.key36());
            for (name, value) in extra {
                query.append_pair(name, value);
            }
        }
        Ok(url)
    }

    /// Fetch and parse the recording info. Any failure is fatal to the import.
    #[instrument(skip(self, session), fields(host = %session.host))]
    pub async fn fetch_info(&self, session: &Session) -> Result<RecordingInfo> {
        let url = self.document_url(session, &[("f", "info")])?;
        debug!(url = %redact_url(url.as_str()), "Fetching recording info");

        let response = self
            .http_client
            .execute_with_retry(HttpRequest::get(url.as_str()), RetryPolicy::default())
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ImportError::Metadata(e.to_string()))?;

        let document: Value = response
            .json()
            .map_err(|e| ImportError::Metadata(format!("malformed recording info: {}", e)))?;

        RecordingInfo::from_json(&document)
    }

    /// Fetch the caption lines of one track.
    ///
    /// Captions are optional: HTTP failures and malformed documents yield an
    /// empty list.
    #[instrument(skip(self, session))]
    pub async fn fetch_captions(&self, session: &Session, track_index: u32) -> Vec<CaptionLine> {
        let index = track_index.to_string();
        let url = match self.document_url(session, &[("f", "vosk"), ("t", &index)]) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Cannot build caption URL");
                return Vec::new();
            }
        };

        let response = match self
            .http_client
            .execute(HttpRequest::get(url.as_str()))
            .await
            .and_then(|response| response.error_for_status())
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Caption request failed, continuing without captions");
                return Vec::new();
            }
        };

        match response.json::<Vec<CaptionLine>>() {
            Ok(lines) => lines,
            Err(e) => {
                warn!(error = %e, "Malformed caption document, continuing without captions");
                Vec::new()
            }
        }
    }
}
