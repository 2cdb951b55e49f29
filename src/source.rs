// where caption text comes from, and the one-call entry point for callers

use std::path::Path;

use crate::pipeline::Pipeline;

/// Theme used when the caller doesn't pick one.
pub const DEFAULT_THEME: &str = "Barbering philosophy, men's style and self-care";

/// Text for one video. The title goes on the video, the description is for whoever posts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caption {
    pub title: String,
    pub description: String,
}

/// Something that can write a caption for a theme.
pub trait CaptionSource {
    fn generate(&self, theme: &str) -> crate::Result<Caption>;
}

/// Always hands back the same caption, whatever the theme.
#[derive(Debug, Clone)]
pub struct FixedCaption(pub Caption);

impl FixedCaption {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> FixedCaption {
        FixedCaption(Caption {
            title: title.into(),
            description: description.into(),
        })
    }
}

impl CaptionSource for FixedCaption {
    fn generate(&self, _theme: &str) -> crate::Result<Caption> {
        Ok(self.0.clone())
    }
}

/// What a caller gets back from [`process_single_video`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoReport {
    pub success: bool,
    pub message: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub theme: String,
}

/// Pick a caption for `theme` and burn its title into `input`.
///
/// Never fails outright, every problem ends up in the report.
pub fn process_single_video(
    pipeline: &Pipeline,
    input: &Path,
    output: &Path,
    theme: Option<&str>,
    source: &dyn CaptionSource,
) -> VideoReport {
    let theme = theme
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_THEME)
        .to_string();

    let caption = match source.generate(&theme) {
        Ok(caption) => caption,
        Err(e) => {
            tracing::error!("Caption source failed for theme {theme:?}: {e}");
            return VideoReport {
                success: false,
                message: format!("caption generation failed: {e}"),
                title: None,
                description: None,
                theme,
            };
        }
    };

    let result = pipeline.process(input, output, &caption.title);
    let message = match result.reason() {
        Some(reason) => reason,
        None => "processed successfully".to_string(),
    };

    VideoReport {
        success: result.is_success(),
        message,
        title: Some(caption.title),
        description: Some(caption.description),
        theme,
    }
}
