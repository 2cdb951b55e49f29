// re-encode phone recordings into something every tool can read

use std::path::Path;

use crate::engine::MediaEngine;
use crate::error::PipelineError;
use crate::media_helpers::{discard_partial, produced};
use crate::pipeline::CancelToken;

/// Encoder settings for the intermediate file: broadly compatible h264 + aac.
pub const TRANSCODE_ARGS: [&str; 12] = [
    "-c:v", "libx264", "-preset", "fast", "-crf", "23", "-pix_fmt", "yuv420p", "-c:a", "aac", "-b:a",
    "128k",
];

/// Re-encode `input` into `output`, overwriting whatever is there.
pub fn normalize(
    engine: &MediaEngine,
    input: &Path,
    output: &Path,
    cancel: &CancelToken,
) -> Result<(), PipelineError> {
    tracing::info!(
        "Converting {} before the overlay...",
        input.file_name().unwrap_or_default().to_string_lossy()
    );

    let mut cmd = engine.command();
    engine.video_input(&mut cmd, input);
    cmd.args(TRANSCODE_ARGS)
        .arg("-y")
        .output(output.to_string_lossy().into_owned());

    match engine.run(cmd, cancel) {
        Ok(()) if produced(output) => {
            tracing::info!("Conversion done.");
            Ok(())
        }
        Ok(()) => {
            discard_partial(output);
            Err(PipelineError::TranscodeFailure {
                diagnostics: format!("ffmpeg exited cleanly but {} was not produced", output.display()),
            })
        }
        Err(failure) => {
            discard_partial(output);
            let err = engine.failure(failure, |diagnostics| PipelineError::TranscodeFailure { diagnostics });
            if let Some(diagnostics) = err.diagnostics() {
                tracing::error!("ffmpeg conversion error: {diagnostics}");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn encoder_settings() {
        let args = TRANSCODE_ARGS.join(" ");
        assert_eq!(
            args,
            "-c:v libx264 -preset fast -crf 23 -pix_fmt yuv420p -c:a aac -b:a 128k"
        );
    }

    #[test]
    fn missing_engine_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("IMG_0001.MOV");
        std::fs::write(&input, b"fake mov").unwrap();
        let output = dir.path().join("normalized.mp4");

        let engine = MediaEngine::new(&Config::default().with_ffmpeg_path("/nowhere/ffmpeg"));
        let err = normalize(&engine, &input, &output, &CancelToken::default()).unwrap_err();
        assert!(matches!(err, PipelineError::DependencyMissing { .. }));
        assert!(!output.exists());
    }
}
