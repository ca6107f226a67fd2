//! Scripted stand-in for the `yt-dlp` executable
//!
//! [`FakeYtDlp`] writes a small shell script into a temporary directory.
//! It answers `--dump-single-json` with fixed metadata, "extracts" audio by
//! writing a file at the `-o` template with `%(ext)s` set to `mp3`, and logs
//! every invocation's arguments one line per run.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde_json::json;
use tempfile::TempDir;

pub struct FakeYtDlp {
    _dir: TempDir,
    binary: PathBuf,
    log: PathBuf,
}

impl FakeYtDlp {
    /// Succeeds with a three-minute track titled "Fake Song" by "Fake Band"
    pub fn succeeding() -> io::Result<Self> {
        Self::with_metadata(&json!({
            "title": "Fake Song",
            "uploader": "Fake Band",
            "thumbnail": "https://i.ytimg.com/vi/fake/hqdefault.jpg",
            "duration": 180.0
        }))
    }

    /// Succeeds and reports `metadata` for the dump pass
    pub fn with_metadata(metadata: &serde_json::Value) -> io::Result<Self> {
        Self::install(|log| {
            format!(
                r#"#!/bin/sh
printf '%s\n' "$*" >> '{log}'
out=''
prev=''
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then out="$arg"; fi
  prev="$arg"
done
case " $* " in
  *" --dump-single-json "*)
    cat <<'METADATA'
{metadata}
METADATA
    exit 0 ;;
esac
if [ -n "$out" ]; then
  target=$(printf '%s' "$out" | sed 's/%(ext)s/mp3/')
  printf 'fake audio' > "$target"
fi
exit 0
"#
            )
        })
    }

    /// Exits with `exit_code` after printing `stderr`, on every pass
    pub fn failing(stderr: &str, exit_code: i32) -> io::Result<Self> {
        Self::install(|log| {
            format!(
                r#"#!/bin/sh
printf '%s\n' "$*" >> '{log}'
cat >&2 <<'STDERR'
{stderr}
STDERR
exit {exit_code}
"#
            )
        })
    }

    fn install(script: impl FnOnce(&str) -> String) -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let binary = dir.path().join("yt-dlp");
        let log = dir.path().join("invocations.log");
        fs::write(&binary, script(&log.to_string_lossy()))?;
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755))?;
        Ok(Self {
            _dir: dir,
            binary,
            log,
        })
    }

    /// Path to pass as the yt-dlp binary
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Arguments of each run so far, space-joined, oldest first
    pub fn invocations(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_dump_prints_metadata() {
        let fake = FakeYtDlp::succeeding().unwrap();
        let output = Command::new(fake.binary())
            .args(["--dump-single-json", "--no-playlist", "https://youtu.be/x"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let metadata: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(metadata["title"], "Fake Song");
        assert_eq!(
            fake.invocations(),
            vec!["--dump-single-json --no-playlist https://youtu.be/x"]
        );
    }

    #[test]
    fn test_extraction_writes_template_target() {
        let fake = FakeYtDlp::succeeding().unwrap();
        let out = tempfile::tempdir().unwrap();
        let template = out.path().join("Fake Song-1.%(ext)s");
        let status = Command::new(fake.binary())
            .arg("-x")
            .arg("-o")
            .arg(&template)
            .arg("https://youtu.be/x")
            .status()
            .unwrap();
        assert!(status.success());
        assert!(out.path().join("Fake Song-1.mp3").exists());
    }

    #[test]
    fn test_failing_exits_with_stderr() {
        let fake = FakeYtDlp::failing("ERROR: HTTP Error 429: Too Many Requests", 1).unwrap();
        let output = Command::new(fake.binary()).arg("x").output().unwrap();
        assert_eq!(output.status.code(), Some(1));
        assert!(String::from_utf8_lossy(&output.stderr).contains("429"));
    }
}
