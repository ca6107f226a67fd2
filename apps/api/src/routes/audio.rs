//! Audio asset streaming
//!
//! - `GET /api/audio/:track_id` - Stream the acquired asset with HTTP range support
//! - `HEAD /api/audio/:track_id` - Headers only
//!
//! Features:
//! - RFC 7233 single-range requests (206 / 416)
//! - Assets are confined to the audio directory
//! - Async streaming without loading the file into memory
//! - ETag and Last-Modified caching headers with conditional requests

use std::path::{Path as StdPath, PathBuf};
use std::time::SystemTime;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, response::Builder, HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::repositories::tracks;
use crate::state::AppState;

/// Assets are named after their track, so a given URL never changes content
const CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

pub fn audio_router() -> Router<AppState> {
    Router::new().route("/audio/:track_id", get(stream_track).head(head_track))
}

/// Stream the asset for a track
///
/// # Response
/// - 200 OK: full file
/// - 206 Partial Content: for a satisfiable `Range`
/// - 304 Not Modified: cache is still valid
/// - 404 Not Found: unknown track, not acquired yet, or file missing
/// - 416 Range Not Satisfiable: range starts past the end of the file
async fn stream_track(
    State(state): State<AppState>,
    Path(track_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let file_path = resolve_asset(&state, track_id).await?;

    let file = File::open(&file_path).await.map_err(|e| {
        tracing::error!(error = %e, path = %file_path.display(), "Failed to open audio file");
        ApiError::AudioFileNotFound(track_id.to_string())
    })?;
    let metadata = file.metadata().await?;
    let file_size = metadata.len();
    let content_type = content_type_for_path(&file_path);

    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let etag = generate_etag(file_size, modified);
    let last_modified = httpdate::fmt_http_date(modified);

    if is_cache_valid(&headers, &etag, modified) {
        return build(
            Response::builder()
                .status(StatusCode::NOT_MODIFIED)
                .header(header::ETAG, &etag)
                .header(header::LAST_MODIFIED, &last_modified)
                .header(header::CACHE_CONTROL, CACHE_CONTROL),
            Body::empty(),
        );
    }

    let range_header = headers.get(header::RANGE).and_then(|h| h.to_str().ok());
    match range_header {
        Some(range) => {
            let (start, end) = parse_range_header(range, file_size)?;
            let content_length = end - start + 1;

            let mut file = file;
            file.seek(SeekFrom::Start(start)).await?;
            let body = Body::from_stream(ReaderStream::new(file.take(content_length)));

            build(
                Response::builder()
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header(header::CONTENT_TYPE, content_type)
                    .header(header::CONTENT_LENGTH, content_length)
                    .header(header::ACCEPT_RANGES, "bytes")
                    .header(
                        header::CONTENT_RANGE,
                        format!("bytes {}-{}/{}", start, end, file_size),
                    )
                    .header(header::ETAG, &etag)
                    .header(header::LAST_MODIFIED, &last_modified)
                    .header(header::CACHE_CONTROL, CACHE_CONTROL),
                body,
            )
        }
        None => build(
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, file_size)
                .header(header::ACCEPT_RANGES, "bytes")
                .header(header::ETAG, &etag)
                .header(header::LAST_MODIFIED, &last_modified)
                .header(header::CACHE_CONTROL, CACHE_CONTROL),
            Body::from_stream(ReaderStream::new(file)),
        ),
    }
}

async fn head_track(
    State(state): State<AppState>,
    Path(track_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let file_path = resolve_asset(&state, track_id).await?;
    let metadata = tokio::fs::metadata(&file_path).await?;

    let file_size = metadata.len();
    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let etag = generate_etag(file_size, modified);
    let last_modified = httpdate::fmt_http_date(modified);

    let status = if is_cache_valid(&headers, &etag, modified) {
        StatusCode::NOT_MODIFIED
    } else {
        StatusCode::OK
    };

    build(
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, content_type_for_path(&file_path))
            .header(header::CONTENT_LENGTH, file_size)
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::ETAG, &etag)
            .header(header::LAST_MODIFIED, &last_modified)
            .header(header::CACHE_CONTROL, CACHE_CONTROL),
        Body::empty(),
    )
}

fn build(builder: Builder, body: Body) -> ApiResult<Response> {
    builder
        .body(body)
        .map_err(|e| ApiError::Internal(format!("Failed to build response: {}", e)))
}

/// Look up a track's asset and resolve it inside the audio directory.
async fn resolve_asset(state: &AppState, track_id: Uuid) -> ApiResult<PathBuf> {
    let track = {
        let mut conn = state.ctx.db.acquire().await?;
        tracks::find(&mut conn, track_id)
            .await?
            .ok_or_else(|| ApiError::not_found("track", track_id))?
    };
    let asset_path = track
        .asset_path
        .filter(|_| !track.disabled)
        .ok_or_else(|| ApiError::AudioFileNotFound(track_id.to_string()))?;

    validate_file_path(&asset_path, &state.config.common.audio_dir).await
}

/// Parse an HTTP Range header according to RFC 7233
///
/// Supports `bytes=START-END`, `bytes=START-` and `bytes=-SUFFIX`.
fn parse_range_header(range_header: &str, file_size: u64) -> Result<(u64, u64), ApiError> {
    let range_spec = range_header
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(|| ApiError::InvalidRange("Invalid range unit".to_string()))?;

    // Single ranges only
    if range_spec.contains(',') {
        return Err(ApiError::InvalidRange(
            "Multiple ranges not supported".to_string(),
        ));
    }

    let (first, last) = range_spec
        .split_once('-')
        .ok_or_else(|| ApiError::InvalidRange("Invalid range format".to_string()))?;
    let parse = |value: &str, what: &str| {
        value
            .trim()
            .parse::<u64>()
            .map_err(|_| ApiError::InvalidRange(format!("Invalid {}", what)))
    };

    let (start, end) = match (first.trim().is_empty(), last.trim().is_empty()) {
        (false, false) => (parse(first, "start position")?, parse(last, "end position")?),
        (false, true) => (parse(first, "start position")?, file_size.saturating_sub(1)),
        (true, false) => {
            let suffix_length = parse(last, "suffix length")?;
            (
                file_size.saturating_sub(suffix_length),
                file_size.saturating_sub(1),
            )
        }
        (true, true) => return Err(ApiError::InvalidRange("Empty range".to_string())),
    };

    if start >= file_size {
        return Err(ApiError::RangeNotSatisfiable { file_size });
    }
    let end = end.min(file_size.saturating_sub(1));
    if start > end {
        return Err(ApiError::InvalidRange(
            "Start position greater than end".to_string(),
        ));
    }

    Ok((start, end))
}

fn content_type_for_path(path: &StdPath) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("aac") => "audio/aac",
        Some("opus") => "audio/opus",
        Some("ogg") => "audio/ogg",
        Some("webm") => "audio/webm",
        Some("flac") => "audio/flac",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// `"{size}-{mtime_secs}"`
fn generate_etag(file_size: u64, modified: SystemTime) -> String {
    let mtime_secs = modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("\"{}-{}\"", file_size, mtime_secs)
}

fn is_cache_valid(headers: &HeaderMap, etag: &str, modified: SystemTime) -> bool {
    // If-None-Match takes precedence over If-Modified-Since
    if let Some(value) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        return value.split(',').any(|v| {
            let v = v.trim();
            v == "*" || v.strip_prefix("W/").unwrap_or(v) == etag
        });
    }

    let Some(since) = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
    else {
        return false;
    };
    if since > SystemTime::now() {
        return false;
    }
    // HTTP dates have second precision
    match modified.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(secs) => {
            SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(secs.as_secs()) <= since
        }
        Err(_) => false,
    }
}

/// Resolve an asset path and reject anything that escapes the audio directory.
async fn validate_file_path(asset_path: &str, audio_dir: &StdPath) -> ApiResult<PathBuf> {
    let asset_path = asset_path.to_string();
    let audio_dir = audio_dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let input_path = StdPath::new(&asset_path);
        if input_path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            tracing::warn!(asset_path = %asset_path, "Path traversal attempt blocked (contains ..)");
            return Err(ApiError::AudioFileNotFound(asset_path.clone()));
        }

        let full_path = if input_path.is_absolute() {
            input_path.to_path_buf()
        } else {
            audio_dir.join(input_path)
        };
        let canonical = full_path.canonicalize().map_err(|_| {
            tracing::warn!(asset_path = %asset_path, "Audio file not found or inaccessible");
            ApiError::AudioFileNotFound(asset_path.clone())
        })?;
        let canonical_dir = audio_dir.canonicalize().map_err(|e| {
            tracing::error!(error = %e, path = %audio_dir.display(), "Invalid audio directory");
            ApiError::Internal(format!("Invalid audio directory: {}", e))
        })?;

        if !canonical.starts_with(&canonical_dir) {
            tracing::warn!(
                asset_path = %asset_path,
                canonical = %canonical.display(),
                "Asset outside the audio directory"
            );
            return Err(ApiError::AudioFileNotFound(asset_path.clone()));
        }
        Ok(canonical)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Path validation task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_range_header_full_range() {
        assert_eq!(parse_range_header("bytes=0-999", 5000).unwrap(), (0, 999));
    }

    #[test]
    fn test_parse_range_header_open_end() {
        assert_eq!(parse_range_header("bytes=500-", 5000).unwrap(), (500, 4999));
    }

    #[test]
    fn test_parse_range_header_suffix() {
        assert_eq!(parse_range_header("bytes=-500", 5000).unwrap(), (4500, 4999));
        assert_eq!(parse_range_header("bytes=-6000", 5000).unwrap(), (0, 4999));
    }

    #[test]
    fn test_parse_range_header_clamps_end() {
        assert_eq!(parse_range_header("bytes=0-10000", 5000).unwrap(), (0, 4999));
    }

    #[test]
    fn test_parse_range_header_rejects_malformed() {
        assert_matches!(
            parse_range_header("chunks=0-100", 5000),
            Err(ApiError::InvalidRange(_))
        );
        assert_matches!(
            parse_range_header("bytes=1000-500", 5000),
            Err(ApiError::InvalidRange(_))
        );
        assert_matches!(parse_range_header("bytes=-", 5000), Err(ApiError::InvalidRange(_)));
        assert_matches!(
            parse_range_header("bytes=0-100, 200-300", 5000),
            Err(ApiError::InvalidRange(_))
        );
    }

    #[test]
    fn test_parse_range_header_start_beyond_file_size() {
        assert_matches!(
            parse_range_header("bytes=6000-", 5000),
            Err(ApiError::RangeNotSatisfiable { file_size: 5000 })
        );
    }

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type_for_path(StdPath::new("a-b.mp3")), "audio/mpeg");
        assert_eq!(content_type_for_path(StdPath::new("a.M4A")), "audio/mp4");
        assert_eq!(
            content_type_for_path(StdPath::new("noext")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_etag_matches_if_none_match() {
        let modified = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1000);
        let etag = generate_etag(100, modified);
        assert_eq!(etag, "\"100-1000\"");

        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, format!("W/{}", etag).parse().unwrap());
        assert!(is_cache_valid(&headers, &etag, modified));

        headers.insert(header::IF_NONE_MATCH, "\"other\"".parse().unwrap());
        assert!(!is_cache_valid(&headers, &etag, modified));
    }

    #[tokio::test]
    async fn test_validate_file_path_confines_to_audio_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("song-1.mp3"), b"id3").unwrap();
        let outside = tempfile::NamedTempFile::new().unwrap();

        let resolved = validate_file_path("song-1.mp3", dir.path()).await.unwrap();
        assert!(resolved.ends_with("song-1.mp3"));

        assert_matches!(
            validate_file_path("../etc/passwd", dir.path()).await,
            Err(ApiError::AudioFileNotFound(_))
        );
        assert_matches!(
            validate_file_path(outside.path().to_str().unwrap(), dir.path()).await,
            Err(ApiError::AudioFileNotFound(_))
        );
        assert_matches!(
            validate_file_path("missing.mp3", dir.path()).await,
            Err(ApiError::AudioFileNotFound(_))
        );
    }
}
