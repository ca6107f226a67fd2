//! Media acquisition through the external yt-dlp tool
//!
//! A fetch runs in two passes: a metadata dump (`--dump-single-json`) and an
//! audio extraction to MP3 in the audio directory. The tool's exit status
//! and stderr decide whether a failure is worth retrying.
//!
//! The acquisition pipeline only depends on the [`AcquisitionTool`] trait so
//! tests can substitute a scripted tool.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use uuid::Uuid;

use crate::config::YtDlpConfig;
use crate::models::TrackMetadata;

/// Upper bound on the sanitized title embedded in asset file names
const MAX_TITLE_LENGTH: usize = 120;

/// Retry hint applied when the source reports rate limiting
pub const RATE_LIMIT_RETRY_HINT: Duration = Duration::from_secs(15 * 60);

/// Stderr fragments that mean retrying cannot help
const TERMINAL_MARKERS: &[&str] = &[
    "403",
    "forbidden",
    "sign in to confirm",
    "private video",
    "video unavailable",
    "this video is unavailable",
    "members-only",
];

const RATE_LIMIT_MARKERS: &[&str] = &["429", "too many requests"];

/// What to fetch
#[derive(Debug, Clone)]
pub struct AcquisitionRequest {
    pub track_id: Uuid,
    pub source_ref: String,
    pub source_url: String,
}

/// A fetched asset
#[derive(Debug, Clone, PartialEq)]
pub struct AcquiredAsset {
    pub metadata: TrackMetadata,
    /// File name inside the audio directory
    pub asset_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionOutcome {
    Ready(AcquiredAsset),
    /// Worth retrying later. `retry_hint` can only lengthen the backoff.
    TransientFailure {
        reason: String,
        retry_hint: Option<Duration>,
    },
    /// Retrying cannot succeed without operator action
    TerminalFailure { reason: String },
}

impl AcquisitionOutcome {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::TransientFailure {
            reason: reason.into(),
            retry_hint: None,
        }
    }

    pub fn terminal(reason: impl Into<String>) -> Self {
        Self::TerminalFailure {
            reason: reason.into(),
        }
    }
}

/// Fetches a source into a playable local asset.
pub trait AcquisitionTool: Send + Sync + 'static {
    fn acquire(
        &self,
        request: &AcquisitionRequest,
    ) -> impl Future<Output = AcquisitionOutcome> + Send;
}

/// Subset of yt-dlp's JSON dump we care about
#[derive(Debug, Default, Deserialize)]
struct YtDlpMetadata {
    title: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
}

impl From<YtDlpMetadata> for TrackMetadata {
    fn from(raw: YtDlpMetadata) -> Self {
        Self {
            title: raw.title.filter(|t| !t.trim().is_empty()),
            channel: raw.uploader.or(raw.channel),
            thumbnail: raw.thumbnail,
            duration_sec: raw.duration.filter(|d| d.is_finite() && *d > 0.0),
        }
    }
}

/// Process-backed acquisition tool
#[derive(Debug, Clone)]
pub struct YtDlpTool {
    config: YtDlpConfig,
    audio_dir: PathBuf,
}

impl YtDlpTool {
    pub fn new(config: YtDlpConfig, audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            audio_dir: audio_dir.into(),
        }
    }

    async fn fetch(&self, request: &AcquisitionRequest) -> Result<AcquiredAsset, AcquisitionOutcome> {
        tokio::fs::create_dir_all(&self.audio_dir)
            .await
            .map_err(|e| AcquisitionOutcome::transient(format!("cannot create audio dir: {e}")))?;

        let cookies = CookieArgs::prepare(&self.config).await;
        let result = self.fetch_with(request, &cookies.args).await;
        cookies.cleanup().await;
        result
    }

    async fn fetch_with(
        &self,
        request: &AcquisitionRequest,
        cookie_args: &[String],
    ) -> Result<AcquiredAsset, AcquisitionOutcome> {
        let stdout = self
            .run(cookie_args, &["--dump-single-json", "--no-playlist"], &request.source_url)
            .await?;
        let raw: YtDlpMetadata = serde_json::from_slice(&stdout).map_err(|e| {
            AcquisitionOutcome::transient(format!("unreadable metadata from yt-dlp: {e}"))
        })?;
        let metadata = TrackMetadata::from(raw);

        let stem = format!(
            "{}-{}",
            sanitize_title(metadata.title.as_deref(), &request.source_ref),
            request.track_id
        );
        let template = self.audio_dir.join(format!("{stem}.%(ext)s"));
        let template = template.to_string_lossy();
        self.run(
            cookie_args,
            &[
                "--no-playlist",
                "-x",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "0",
                "-o",
                &*template,
            ],
            &request.source_url,
        )
        .await?;

        let asset_path = format!("{stem}.mp3");
        if !tokio::fs::try_exists(self.audio_dir.join(&asset_path))
            .await
            .unwrap_or(false)
        {
            return Err(AcquisitionOutcome::transient(format!(
                "yt-dlp finished without producing {asset_path}"
            )));
        }
        Ok(AcquiredAsset {
            metadata,
            asset_path,
        })
    }

    /// Run one yt-dlp pass and return stdout on success.
    async fn run(
        &self,
        cookie_args: &[String],
        args: &[&str],
        url: &str,
    ) -> Result<Vec<u8>, AcquisitionOutcome> {
        let mut cmd = Command::new(&self.config.binary);
        if let Some(runtime) = &self.config.js_runtime {
            cmd.arg("--js-runtimes").arg(runtime);
        }
        if let Some(location) = &self.config.ffmpeg_location {
            cmd.arg("--ffmpeg-location").arg(location);
        }
        cmd.args(cookie_args).args(args).arg(url);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AcquisitionOutcome::transient(format!(
                    "yt-dlp not found at {}",
                    self.config.binary.display()
                ))
            } else {
                AcquisitionOutcome::transient(format!("failed to run yt-dlp: {e}"))
            }
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            tracing::debug!(target: "yt-dlp", url, "{}", line);
        }

        if output.status.success() {
            Ok(output.stdout)
        } else {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            Err(classify_failure(&format!(
                "yt-dlp failed (code {code}): {}",
                stderr.trim()
            )))
        }
    }
}

impl AcquisitionTool for YtDlpTool {
    async fn acquire(&self, request: &AcquisitionRequest) -> AcquisitionOutcome {
        tracing::info!(
            track_id = %request.track_id,
            source_ref = %request.source_ref,
            "Fetching source"
        );
        match self.fetch(request).await {
            Ok(asset) => AcquisitionOutcome::Ready(asset),
            Err(outcome) => outcome,
        }
    }
}

/// Decide whether a failed run is worth retrying.
pub fn classify_failure(message: &str) -> AcquisitionOutcome {
    let lower = message.to_lowercase();
    if RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m)) {
        return AcquisitionOutcome::TransientFailure {
            reason: message.to_string(),
            retry_hint: Some(RATE_LIMIT_RETRY_HINT),
        };
    }
    if TERMINAL_MARKERS.iter().any(|m| lower.contains(m)) {
        return AcquisitionOutcome::terminal(message);
    }
    AcquisitionOutcome::transient(message)
}

/// File-name-safe title: reserved and control characters removed,
/// whitespace collapsed, capped in length. Falls back to the source ref.
pub fn sanitize_title(title: Option<&str>, fallback: &str) -> String {
    let raw = title.filter(|t| !t.trim().is_empty()).unwrap_or(fallback);
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .filter(|c| !c.is_control())
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_TITLE_LENGTH).collect();
    let truncated = truncated.trim().to_string();
    if truncated.is_empty() {
        fallback.to_string()
    } else {
        truncated
    }
}

/// Cookie arguments for one fetch, plus any temporary file to remove.
struct CookieArgs {
    args: Vec<String>,
    temp_file: Option<PathBuf>,
}

impl CookieArgs {
    fn none() -> Self {
        Self {
            args: Vec::new(),
            temp_file: None,
        }
    }

    /// A raw header wins over a cookie file. JSON cookie exports are
    /// converted to the Netscape format yt-dlp expects.
    async fn prepare(config: &YtDlpConfig) -> Self {
        if let Some(header) = &config.cookie_header {
            return Self {
                args: vec!["--add-header".to_string(), format!("Cookie: {header}")],
                temp_file: None,
            };
        }
        let Some(path) = &config.cookie_file else {
            return Self::none();
        };
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(_) => return Self::none(),
        };
        let raw = raw.trim();
        if raw.is_empty() {
            tracing::warn!(path = %path.display(), "yt-dlp cookies file is empty");
            return Self::none();
        }
        if !raw.starts_with('[') && !raw.starts_with('{') {
            return Self::with_file(path);
        }

        let lines = match netscape_cookie_lines(raw) {
            Ok(lines) if !lines.is_empty() => lines,
            Ok(_) => {
                tracing::warn!(path = %path.display(), "yt-dlp cookies JSON has no entries");
                return Self::none();
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "yt-dlp cookies JSON is unreadable");
                return Self::none();
            }
        };

        let temp_path = std::env::temp_dir().join(format!("erwin-ytcookies-{}.txt", Uuid::new_v4()));
        let body = format!("# Netscape HTTP Cookie File\n{}\n", lines.join("\n"));
        if let Err(e) = tokio::fs::write(&temp_path, body).await {
            tracing::warn!(error = %e, "Unable to write converted cookie file");
            return Self::none();
        }
        tracing::info!(source = %path.display(), "yt-dlp cookies JSON converted to Netscape format");
        Self {
            args: vec!["--cookies".to_string(), temp_path.to_string_lossy().into_owned()],
            temp_file: Some(temp_path),
        }
    }

    fn with_file(path: &Path) -> Self {
        Self {
            args: vec!["--cookies".to_string(), path.to_string_lossy().into_owned()],
            temp_file: None,
        }
    }

    async fn cleanup(self) {
        if let Some(path) = self.temp_file {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %e, "Unable to remove temporary cookie file");
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonCookie {
    #[serde(default)]
    domain: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    secure: bool,
    #[serde(default)]
    expiration_date: Option<f64>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CookieExport {
    List(Vec<JsonCookie>),
    Wrapped { cookies: Vec<JsonCookie> },
}

fn netscape_cookie_lines(raw: &str) -> Result<Vec<String>, serde_json::Error> {
    let cookies = match serde_json::from_str::<CookieExport>(raw)? {
        CookieExport::List(list) => list,
        CookieExport::Wrapped { cookies } => cookies,
    };
    Ok(cookies
        .into_iter()
        .filter(|c| !c.name.is_empty())
        .map(|c| {
            let expires = c
                .expiration_date
                .filter(|e| e.is_finite() && *e > 0.0)
                .map(|e| e.floor() as i64)
                .unwrap_or(0);
            [
                c.domain.clone(),
                flag(c.domain.starts_with('.')),
                c.path.unwrap_or_else(|| "/".to_string()),
                flag(c.secure),
                expires.to_string(),
                c.name,
                c.value,
            ]
            .join("\t")
        })
        .collect())
}

fn flag(value: bool) -> String {
    if value { "TRUE" } else { "FALSE" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case("ERROR: [youtube] abc: HTTP Error 403: Forbidden")]
    #[case("ERROR: Sign in to confirm your age")]
    #[case("ERROR: Private video. Sign in if you've been granted access")]
    #[case("ERROR: [youtube] xyz: Video unavailable")]
    fn test_terminal_failures(#[case] stderr: &str) {
        assert_matches!(classify_failure(stderr), AcquisitionOutcome::TerminalFailure { .. });
    }

    #[test]
    fn test_rate_limit_carries_hint() {
        let outcome = classify_failure("ERROR: HTTP Error 429: Too Many Requests");
        assert_matches!(
            outcome,
            AcquisitionOutcome::TransientFailure { retry_hint: Some(hint), .. } if hint == RATE_LIMIT_RETRY_HINT
        );
    }

    #[test]
    fn test_unknown_failure_is_transient() {
        assert_matches!(
            classify_failure("ERROR: unable to download webpage: timed out"),
            AcquisitionOutcome::TransientFailure { retry_hint: None, .. }
        );
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(
            sanitize_title(Some("  AC/DC: Back  in \u{7}  Black?  "), "id"),
            "ACDC Back in Black"
        );
        assert_eq!(sanitize_title(None, "dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(sanitize_title(Some("???"), "dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(sanitize_title(Some(&"x".repeat(300)), "id").len(), 120);
    }

    #[test]
    fn test_metadata_prefers_uploader() {
        let raw: YtDlpMetadata = serde_json::from_str(
            r#"{"title":"Song","uploader":"Band","channel":"Band - Topic","duration":212.0,"thumbnail":"https://i/t.jpg"}"#,
        )
        .unwrap();
        let metadata = TrackMetadata::from(raw);
        assert_eq!(metadata.channel.as_deref(), Some("Band"));
        assert_eq!(metadata.duration_sec, Some(212.0));
    }

    #[test]
    fn test_json_cookies_convert_to_netscape() {
        let lines = netscape_cookie_lines(
            r#"[{"domain":".youtube.com","path":"/","secure":true,"expirationDate":1767225600.5,"name":"SID","value":"abc"}]"#,
        )
        .unwrap();
        assert_eq!(lines, vec![".youtube.com\tTRUE\t/\tTRUE\t1767225600\tSID\tabc"]);

        let wrapped = netscape_cookie_lines(r#"{"cookies":[{"domain":"youtube.com","name":"A","value":"1"}]}"#)
            .unwrap();
        assert_eq!(wrapped, vec!["youtube.com\tFALSE\t/\tFALSE\t0\tA\t1"]);
    }

    #[tokio::test]
    async fn test_header_cookie_wins_over_file() {
        let config = YtDlpConfig {
            cookie_header: Some("SID=abc".to_string()),
            cookie_file: Some(PathBuf::from("/nonexistent")),
            ..YtDlpConfig::default()
        };
        let cookies = CookieArgs::prepare(&config).await;
        assert_eq!(cookies.args, vec!["--add-header", "Cookie: SID=abc"]);
    }
}
