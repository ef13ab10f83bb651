//! ffmpeg/ffprobe backed audio tools.

use super::AudioTools;
use crate::error::{ReelcastError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Audio tools implemented by shelling out to ffmpeg and ffprobe.
#[derive(Debug, Clone, Default)]
pub struct FfmpegAudio;

impl FfmpegAudio {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AudioTools for FfmpegAudio {
    /// Queries the duration of an audio file using ffprobe with JSON output.
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn duration(&self, path: &Path) -> Result<f64> {
        let result = Command::new("ffprobe")
            .arg("-v").arg("quiet")
            .arg("-print_format").arg("json")
            .arg("-show_format")
            .arg(path)
            .output()
            .await;

        let output = match result {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReelcastError::ToolNotFound("ffprobe".into()));
            }
            Err(e) => {
                return Err(ReelcastError::ToolFailed(format!("ffprobe failed: {e}")));
            }
        };

        if !output.status.success() {
            return Err(ReelcastError::ToolFailed(format!(
                "ffprobe could not read {}",
                path.display()
            )));
        }

        let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|_| ReelcastError::ToolFailed("Invalid ffprobe output".into()))?;

        parsed["format"]["duration"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| ReelcastError::ToolFailed("Could not determine audio duration".into()))
    }

    /// Joins audio parts in order with the concat demuxer.
    #[instrument(skip(self, parts), fields(parts = parts.len(), dest = %dest.display()))]
    async fn concat(&self, parts: &[PathBuf], dest: &Path) -> Result<()> {
        if parts.is_empty() {
            return Err(ReelcastError::InvalidInput("No audio parts to concatenate".into()));
        }

        let list_file = tempfile::Builder::new()
            .prefix("concat_")
            .suffix(".txt")
            .tempfile()?;
        let listing: String = parts
            .iter()
            .map(|p| format!("file '{}'\n", concat_escape(p)))
            .collect();
        std::fs::write(list_file.path(), listing)?;

        debug!("Concatenating {} audio parts", parts.len());

        let result = Command::new("ffmpeg")
            .arg("-f").arg("concat")
            .arg("-safe").arg("0")
            .arg("-i").arg(list_file.path())
            .arg("-codec:a").arg("libmp3lame")
            .arg("-qscale:a").arg("2")
            .arg("-y")
            .arg("-loglevel").arg("error")
            .arg(dest)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        match result {
            Ok(out) if out.status.success() => Ok(()),
            Ok(out) => {
                let _ = std::fs::remove_file(dest);
                let err = String::from_utf8_lossy(&out.stderr);
                Err(ReelcastError::ToolFailed(format!("ffmpeg concat failed: {err}")))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ReelcastError::ToolNotFound("ffmpeg".into()))
            }
            Err(e) => Err(ReelcastError::ToolFailed(format!("ffmpeg error: {e}"))),
        }
    }
}

/// Quote a path for an ffmpeg concat list.
fn concat_escape(path: &Path) -> String {
    path.display().to_string().replace('\'', r"'\''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_escape_quotes() {
        let escaped = concat_escape(Path::new("/tmp/it's here.mp3"));
        assert_eq!(escaped, r"/tmp/it'\''s here.mp3");
    }

    #[tokio::test]
    async fn test_concat_rejects_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let result = FfmpegAudio::new().concat(&[], &dir.path().join("out.mp3")).await;
        assert!(matches!(result, Err(ReelcastError::InvalidInput(_))));
    }
}
