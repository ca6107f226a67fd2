//! Track model and source reference parsing
//!
//! A track is identified externally by its source reference (an 11-char
//! video id). Acquisition fills in metadata and the local asset path.

use chrono::{DateTime, Utc};
use erwin_protocol::{AcquisitionStatus, TrackInfo};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

const SOURCE_ID_LENGTH: usize = 11;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: Uuid,
    pub source_ref: String,
    pub source_url: String,
    pub title: Option<String>,
    pub channel: Option<String>,
    pub thumbnail: Option<String>,
    pub duration_sec: Option<f64>,
    /// File name of the acquired asset inside the audio directory
    pub asset_path: Option<String>,
    pub acquisition_status: AcquisitionStatus,
    pub acquisition_error: Option<String>,
    pub acquired_at: Option<DateTime<Utc>>,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Track {
    /// Acquired and playable.
    pub fn is_ready(&self) -> bool {
        self.acquisition_status == AcquisitionStatus::Ready && self.asset_path.is_some()
    }

    pub fn label(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.source_ref.clone())
    }

    /// Public view used by the control API and real-time channel.
    pub fn info(&self) -> TrackInfo {
        TrackInfo {
            id: self.id,
            source_ref: self.source_ref.clone(),
            title: self.title.clone(),
            channel: self.channel.clone(),
            thumbnail: self.thumbnail.clone(),
            duration_sec: self.duration_sec,
            status: self.acquisition_status,
            disabled: self.disabled,
            asset_url: self
                .asset_path
                .as_ref()
                .map(|_| format!("/api/audio/{}", self.id)),
        }
    }
}

/// Metadata reported by the acquisition tool. Every field is optional;
/// the store only fills fields that are still unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub channel: Option<String>,
    pub thumbnail: Option<String>,
    pub duration_sec: Option<f64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceRefError {
    #[error("source reference is empty")]
    Empty,
    #[error("unrecognized media link: {0}")]
    Unrecognized(String),
}

/// Extract the video id from a bare id or a share/watch/embed link.
pub fn parse_source_ref(input: &str) -> Result<String, SourceRefError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SourceRefError::Empty);
    }
    if is_source_id(input) {
        return Ok(input.to_string());
    }

    let url = Url::parse(input)
        .or_else(|_| Url::parse(&format!("https://{}", input)))
        .map_err(|_| SourceRefError::Unrecognized(input.to_string()))?;
    let host = url.host_str().unwrap_or_default().trim_start_matches("www.");

    let candidate = if host == "youtu.be" {
        url.path_segments().and_then(|mut s| s.next()).map(str::to_string)
    } else if host == "youtube.com" || host.ends_with(".youtube.com") {
        url.query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())
            .or_else(|| {
                let mut segments = url.path_segments()?;
                match segments.next() {
                    Some("embed") | Some("shorts") => segments.next().map(str::to_string),
                    _ => None,
                }
            })
    } else {
        None
    };

    candidate
        .filter(|id| is_source_id(id))
        .ok_or_else(|| SourceRefError::Unrecognized(input.to_string()))
}

fn is_source_id(s: &str) -> bool {
    s.len() == SOURCE_ID_LENGTH
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Canonical watch URL for a source id.
pub fn source_url(source_ref: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", source_ref)
}
