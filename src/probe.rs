// how big is this video?

use std::path::Path;

use crate::engine::MediaEngine;
use crate::error::PipelineWarning;

/// What we assume when ffprobe can't tell us.
pub const FALLBACK_DIMENSIONS: (u32, u32) = (1920, 1080);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub width: u32,
    pub height: u32,
    /// Set when the size is the fallback, with the reason we fell back.
    pub degraded: Option<String>,
}

impl Probe {
    pub fn warning(&self) -> Option<PipelineWarning> {
        self.degraded.as_ref().map(|diagnostics| PipelineWarning::ProbeDegraded {
            width: self.width,
            height: self.height,
            diagnostics: diagnostics.clone(),
        })
    }
}

/// Width and height of the first video stream.
///
/// Never fails: anything going wrong gets logged and the 1920x1080 fallback
/// comes back with `degraded` set.
pub fn probe(engine: &MediaEngine, path: &Path) -> Probe {
    match get_pixel_size(engine.ffprobe_path(), path) {
        Ok((width, height)) => {
            tracing::info!("Video size is {width}x{height}.");
            Probe {
                width,
                height,
                degraded: None,
            }
        }
        Err(e) => {
            let (width, height) = FALLBACK_DIMENSIONS;
            tracing::warn!(
                "Could not read the size of {}: {e}. Assuming {width}x{height}, the caption may be mis-sized.",
                path.display()
            );
            Probe {
                width,
                height,
                degraded: Some(e.to_string()),
            }
        }
    }
}

/// get the screen size of a media file
/// returns (x,y)
pub fn get_pixel_size(ffprobe_bin: &Path, path: &Path) -> crate::Result<(u32, u32)> {
    // ask ffprobe
    let config = ffprobe::Config::builder().ffprobe_bin(ffprobe_bin).build();
    let media_info = ffprobe::ffprobe_config(config, path).map_err(|e| format!("ffprobe failed: {e}"))?;

    let stream = media_info
        .streams
        .iter()
        .find(|stream| stream.codec_type.as_deref() == Some("video"))
        .ok_or("no video stream")?;

    let width = stream.width.ok_or("video stream has no width")?;
    let height = stream.height.ok_or("video stream has no height")?;
    let width = u32::try_from(width).map_err(|_| format!("bad width {width}"))?;
    let height = u32::try_from(height).map_err(|_| format!("bad height {height}"))?;
    if width == 0 || height == 0 {
        return Err(format!("video reports a size of {width}x{height}").into());
    }
    Ok((width, height))
}
