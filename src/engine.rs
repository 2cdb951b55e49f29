// the external media engine (ffmpeg + ffprobe) and how we talk to it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use ffmpeg_sidecar::command::FfmpegCommand;

use crate::config::Config;
use crate::error::PipelineError;
use crate::ffmpeg_babysitter::{ffbabysit, FfmpegFailure};
use crate::pipeline::CancelToken;

#[derive(Debug, Clone)]
pub struct MediaEngine {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    hw_accel: Option<String>,
}

impl MediaEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
            hw_accel: config.hw_accel.clone(),
        }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn ffprobe_path(&self) -> &Path {
        &self.ffprobe
    }

    /// Ask ffmpeg for its version. Anything but a clean answer means we can't run.
    ///
    /// Returns the first line of the banner.
    pub fn ensure_available(&self) -> Result<String, PipelineError> {
        let output = Command::new(&self.ffmpeg)
            .arg("-version")
            .output()
            .map_err(|e| PipelineError::DependencyMissing {
                path: self.ffmpeg.clone(),
                diagnostics: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(PipelineError::DependencyMissing {
                path: self.ffmpeg.clone(),
                diagnostics: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let banner = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        tracing::info!("Found ffmpeg at {}: {banner}", self.ffmpeg.display());
        Ok(banner)
    }

    /// A fresh ffmpeg command pointed at the configured binary.
    pub fn command(&self) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new_with_path(&self.ffmpeg);
        cmd.hide_banner();
        cmd
    }

    /// Adds a video input, with hardware decoding in front of it when configured.
    pub fn video_input(&self, cmd: &mut FfmpegCommand, path: &Path) {
        if let Some(accel) = &self.hw_accel {
            cmd.hwaccel(accel);
        }
        cmd.input(path.to_string_lossy().into_owned());
    }

    /// Spawn the command and babysit it to completion.
    pub fn run(&self, mut cmd: FfmpegCommand, cancel: &CancelToken) -> Result<(), FfmpegFailure> {
        tracing::debug!("Running {cmd:?}");
        let child = cmd.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => FfmpegFailure::Missing(e.to_string()),
            _ => FfmpegFailure::Exited(format!("could not start ffmpeg: {e}")),
        })?;
        ffbabysit(child, cancel)
    }

    /// Turn a babysitter failure into the pipeline's error, `exited` deciding
    /// which step it belongs to.
    pub fn failure(&self, failure: FfmpegFailure, exited: impl FnOnce(String) -> PipelineError) -> PipelineError {
        match failure {
            FfmpegFailure::Missing(diagnostics) => PipelineError::DependencyMissing {
                path: self.ffmpeg.clone(),
                diagnostics,
            },
            FfmpegFailure::Cancelled => PipelineError::Cancelled,
            FfmpegFailure::Exited(diagnostics) => exited(diagnostics),
        }
    }
}
