// everything that can stop a caption run, plus the things that only degrade it.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Why a pipeline run failed.
///
/// `Display` gives the short reason a chat front end can show to a user.
/// Engine output is kept in the variant and only surfaces through
/// [`PipelineError::diagnostics`], which is meant for the logs.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("media engine not found at {path}")]
    DependencyMissing { path: PathBuf, diagnostics: String },

    #[error("input video is missing or empty: {0}")]
    InputMissing(PathBuf),

    #[error("could not prepare a temporary workspace: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("cannot write to output folder {path}: {source}")]
    OutputDir { path: PathBuf, source: std::io::Error },

    #[error("format conversion failed")]
    TranscodeFailure { diagnostics: String },

    #[error("caption rendering failed: {0}")]
    LayoutFailure(String),

    #[error("text overlay failed")]
    CompositeFailure { diagnostics: String },

    #[error("text overlay failed: {0} was not produced")]
    ArtifactMissing(PathBuf),

    #[error("processing cancelled")]
    Cancelled,

    #[error("video worker crashed: {0}")]
    Worker(String),
}

impl PipelineError {
    /// Engine output captured for this failure, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            PipelineError::DependencyMissing { diagnostics, .. }
            | PipelineError::TranscodeFailure { diagnostics }
            | PipelineError::CompositeFailure { diagnostics } => Some(diagnostics),
            _ => None,
        }
    }
}

/// Something went wrong but the run carried on with a fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineWarning {
    /// ffprobe gave us nothing usable, default dimensions were used.
    ProbeDegraded {
        width: u32,
        height: u32,
        diagnostics: String,
    },
    /// The configured font could not be loaded, the built-in one was used.
    FontFallback { path: Option<PathBuf>, reason: String },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineWarning::ProbeDegraded { width, height, .. } => {
                write!(f, "could not read video size, assumed {width}x{height}")
            }
            PipelineWarning::FontFallback { path: Some(path), .. } => {
                write!(f, "font {} unavailable, used built-in font", path.display())
            }
            PipelineWarning::FontFallback { path: None, .. } => {
                write!(f, "no font configured, used built-in font")
            }
        }
    }
}
