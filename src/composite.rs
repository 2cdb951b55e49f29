// put the caption plate on the video

use std::path::Path;

use crate::engine::MediaEngine;
use crate::error::PipelineError;
use crate::media_helpers::{discard_partial, produced};
use crate::pipeline::CancelToken;

/// Rate the still caption image is fed in at.
pub const OVERLAY_FRAMERATE: &str = "25";

/// Gap between the bottom of the caption and the bottom of the video: 20% of its height.
pub fn bottom_offset(video_height: u32) -> u32 {
    (video_height as f64 * 0.2) as u32
}

/// Caption image (input 1) over the video (input 0), centered, lifted off the bottom.
pub fn overlay_filter(offset_bottom: u32) -> String {
    format!(
        "[1:v]format=rgba,colorchannelmixer=aa=1[caption];\
         [0:v][caption]overlay=x=(W-w)/2:y=H-h-{offset_bottom},format=yuv420p"
    )
}

/// Burn `overlay` into `video`, writing `output`.
///
/// Video is re-encoded fast, audio copied. On any failure the output file is
/// removed, a half-written video is worse than none.
pub fn composite(
    engine: &MediaEngine,
    video: &Path,
    overlay: &Path,
    video_height: u32,
    output: &Path,
    cancel: &CancelToken,
) -> Result<(), PipelineError> {
    let offset_bottom = bottom_offset(video_height);
    tracing::info!("Applying caption {offset_bottom}px above the bottom edge...");

    let mut cmd = engine.command();
    engine.video_input(&mut cmd, video);
    cmd.args(["-framerate", OVERLAY_FRAMERATE])
        .input(overlay.to_string_lossy().into_owned())
        .args(["-filter_complex", &overlay_filter(offset_bottom)])
        .codec_video("libx264")
        .args(["-preset", "ultrafast"])
        .codec_audio("copy") // copy audio codec
        .arg("-y")
        .output(output.to_string_lossy().into_owned());

    match engine.run(cmd, cancel) {
        Ok(()) if produced(output) => Ok(()),
        Ok(()) => {
            discard_partial(output);
            Err(PipelineError::ArtifactMissing(output.to_path_buf()))
        }
        Err(failure) => {
            discard_partial(output);
            let err = engine.failure(failure, |diagnostics| PipelineError::CompositeFailure { diagnostics });
            if let Some(diagnostics) = err.diagnostics() {
                tracing::error!("ffmpeg overlay error: {diagnostics}");
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
    fn offset_is_a_fifth_of_the_height() {
        assert_eq!(bottom_offset(1920), 384);
        assert_eq!(bottom_offset(1080), 216);
        assert_eq!(bottom_offset(7), 1);
        assert_eq!(bottom_offset(0), 0);
    }

    #[test]
    fn filter_graph() {
        assert_eq!(
            overlay_filter(384),
            "[1:v]format=rgba,colorchannelmixer=aa=1[caption];\
             [0:v][caption]overlay=x=(W-w)/2:y=H-h-384,format=yuv420p"
        );
    }

    #[test]
    fn failed_overlay_removes_the_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        std::fs::write(&output, b"stale output from an earlier run").unwrap();

        let engine = MediaEngine::new(&Config::default().with_ffmpeg_path("/nowhere/ffmpeg"));
        let err = composite(
            &engine,
            &dir.path().join("in.mp4"),
            &dir.path().join("caption.png"),
            1080,
            &output,
            &CancelToken::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::DependencyMissing { .. }));
        assert!(!output.exists());
    }
}
