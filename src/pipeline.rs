// normalize -> probe -> caption -> composite, with cleanup no matter what.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::captions::{render_caption, CaptionFont};
use crate::composite::composite;
use crate::config::Config;
use crate::engine::MediaEngine;
use crate::error::{PipelineError, PipelineWarning};
use crate::media_helpers::{VideoAsset, Workspace};
use crate::normalize::normalize;
use crate::probe::probe;

/// Shared flag telling a run to stop. Any running ffmpeg gets killed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where a run is. Runs only move forward; `Failed` can follow any step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Normalize,
    Probe,
    Layout,
    Composite,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::Normalize => "normalize",
            Stage::Probe => "probe",
            Stage::Layout => "layout",
            Stage::Composite => "composite",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a run produced.
#[derive(Debug)]
pub struct PipelineResult {
    /// The caption text that was (or would have been) rendered.
    pub caption: String,
    /// Set on success.
    pub output: Option<PathBuf>,
    /// Set on failure.
    pub error: Option<PipelineError>,
    /// Fallbacks that kicked in along the way.
    pub warnings: Vec<PipelineWarning>,
    /// Every stage the run went through, in order.
    pub stages: Vec<Stage>,
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.output.is_some()
    }

    /// Short failure message, safe to show to a user.
    pub fn reason(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub(crate) fn failed(caption: &str, error: PipelineError) -> PipelineResult {
        PipelineResult {
            caption: caption.to_string(),
            output: None,
            error: Some(error),
            warnings: Vec::new(),
            stages: vec![Stage::Start, Stage::Failed],
        }
    }
}

// bookkeeping for one run
struct Run {
    stages: Vec<Stage>,
    warnings: Vec<PipelineWarning>,
}

impl Run {
    fn enter(&mut self, stage: Stage) {
        tracing::info!("-> {stage}");
        self.stages.push(stage);
    }
}

/// The caption pipeline. Cheap to share between threads, one per process is plenty.
#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    engine: MediaEngine,
    font: CaptionFont,
    font_warning: Option<PipelineWarning>,
}

impl Pipeline {
    /// Build a pipeline, loading the caption font once up front.
    pub fn new(config: Config) -> Result<Pipeline, PipelineError> {
        let (font, font_warning) = CaptionFont::load(config.font_path.as_deref())?;
        Ok(Pipeline {
            engine: MediaEngine::new(&config),
            config,
            font,
            font_warning,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &MediaEngine {
        &self.engine
    }

    pub fn font(&self) -> &CaptionFont {
        &self.font
    }

    /// Caption `input` into `output`. Blocks until ffmpeg is done, run it off the async threads.
    pub fn process(&self, input: &Path, output: &Path, caption: &str) -> PipelineResult {
        self.process_with_cancel(input, output, caption, &CancelToken::default())
    }

    /// [`Pipeline::process`], stoppable through `cancel`.
    pub fn process_with_cancel(
        &self,
        input: &Path,
        output: &Path,
        caption: &str,
        cancel: &CancelToken,
    ) -> PipelineResult {
        let mut run = Run {
            stages: vec![Stage::Start],
            warnings: self.font_warning.iter().cloned().collect(),
        };

        let outcome = self.run(input, output, caption, cancel, &mut run);

        let (output, error) = match outcome {
            Ok(path) => {
                run.enter(Stage::Done);
                tracing::info!("Video ready at {}", path.display());
                (Some(path), None)
            }
            Err(err) => {
                run.enter(Stage::Failed);
                match err.diagnostics() {
                    Some(diagnostics) => tracing::error!("Processing failed: {err}\n{diagnostics}"),
                    None => tracing::error!("Processing failed: {err}"),
                }
                (None, Some(err))
            }
        };

        PipelineResult {
            caption: caption.to_string(),
            output,
            error,
            warnings: run.warnings,
            stages: run.stages,
        }
    }

    fn run(
        &self,
        input: &Path,
        output: &Path,
        caption: &str,
        cancel: &CancelToken,
        run: &mut Run,
    ) -> Result<PathBuf, PipelineError> {
        self.engine.ensure_available()?;
        let asset = VideoAsset::open(input)?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| PipelineError::OutputDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        // everything temporary lives in here and goes away when it drops
        let workspace = Workspace::create(&self.config.temp_dir)?;
        let span = tracing::info_span!("job", token = workspace.token());
        let _entered = span.enter();
        tracing::info!(
            "Processing {} ({} bytes), caption is {} characters.",
            asset.path.display(),
            asset.size,
            caption.chars().count()
        );

        let result = self.run_steps(asset, output, caption, cancel, run, &workspace);

        let token = workspace.token().to_string();
        if let Err(e) = workspace.close() {
            tracing::warn!("Could not clean up workspace {token}: {e}");
        }
        result
    }

    fn run_steps(
        &self,
        asset: VideoAsset,
        output: &Path,
        caption: &str,
        cancel: &CancelToken,
        run: &mut Run,
        workspace: &Workspace,
    ) -> Result<PathBuf, PipelineError> {
        let source = if self.config.needs_normalization(&asset.path) {
            run.enter(Stage::Normalize);
            let normalized = workspace.artifact("normalized", "mp4");
            normalize(&self.engine, &asset.path, &normalized, cancel)?;
            VideoAsset::open(&normalized)?
        } else {
            asset
        };
        check(cancel)?;

        run.enter(Stage::Probe);
        let size = probe(&self.engine, &source.path);
        run.warnings.extend(size.warning());
        let source = source.with_dimensions(size.width, size.height);
        check(cancel)?;

        run.enter(Stage::Layout);
        let overlay = workspace.artifact("overlay", "png");
        render_caption(
            &self.font,
            caption,
            size.width,
            size.height,
            &self.config.style,
            &overlay,
        )?;
        check(cancel)?;

        run.enter(Stage::Composite);
        composite(&self.engine, &source.path, &overlay, size.height, output, cancel)?;

        Ok(output.to_path_buf())
    }
}

fn check(cancel: &CancelToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}
