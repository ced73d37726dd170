//! Still-frame extraction from video files via an external `ffmpeg`.

use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};
use thiserror::Error;
use tokio::process::Command;
use tracing::warn;

/// Seek offset used when grabbing the representative frame.
pub const FRAME_OFFSET: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ffmpeg exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("ffmpeg produced no frame at {0}")]
    MissingOutput(PathBuf),
}

/// Writes one still image taken `offset` into `input` to `output`.
#[async_trait]
pub trait FrameExtractor: Send + Sync + 'static {
    async fn extract_frame(
        &self,
        input: &Path,
        output: &Path,
        offset: Duration,
    ) -> Result<(), TranscodeError>;

    /// Whether the underlying tool can be run at all.
    async fn is_available(&self) -> bool;
}

#[derive(Clone, Debug)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.ffmpeg_path
    }
}

/// `HH:MM:SS.mmm`, the seek syntax ffmpeg's `-ss` accepts.
pub fn format_offset(offset: Duration) -> String {
    let millis = offset.as_millis();
    let (secs, millis) = (millis / 1000, millis % 1000);
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        millis
    )
}

#[async_trait]
impl FrameExtractor for FfmpegTranscoder {
    #[tracing::instrument(skip(self), fields(ffmpeg = %self.ffmpeg_path))]
    async fn extract_frame(
        &self,
        input: &Path,
        output: &Path,
        offset: Duration,
    ) -> Result<(), TranscodeError> {
        let result = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-ss")
            .arg(format_offset(offset))
            .args(["-vframes", "1", "-f", "image2"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| TranscodeError::Spawn {
                program: self.ffmpeg_path.clone(),
                source,
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            warn!(status = %result.status, "ffmpeg failed: {}", stderr);
            return Err(TranscodeError::Failed {
                status: result.status.to_string(),
                stderr,
            });
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(TranscodeError::MissingOutput(output.to_path_buf())),
        }
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_format_like_ffmpeg_timestamps() {
        assert_eq!(format_offset(FRAME_OFFSET), "00:00:01.000");
        assert_eq!(format_offset(Duration::from_millis(3_723_450)), "01:02:03.450");
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let transcoder = FfmpegTranscoder::new("/nonexistent/bin/ffmpeg-for-tests");
        assert!(!transcoder.is_available().await);

        let dir = tempfile::tempdir().unwrap();
        let err = transcoder
            .extract_frame(
                &dir.path().join("in.mp4"),
                &dir.path().join("out.jpg"),
                FRAME_OFFSET,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Spawn { .. }));
    }
}
