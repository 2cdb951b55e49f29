// media stuff!!

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::distributions::Alphanumeric;
use rand::Rng;
use tempfile::TempDir;

use crate::error::PipelineError;

/// A video file on disk. Never modified once we have it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoAsset {
    pub path: PathBuf,
    /// Lowercased file extension, if any.
    pub container: Option<String>,
    pub size: u64,
    /// Filled in once the prober has looked at it.
    pub dimensions: Option<(u32, u32)>,
}

impl VideoAsset {
    /// Look at a file the caller handed us. Missing and empty files are rejected.
    pub fn open(path: &Path) -> Result<VideoAsset, PipelineError> {
        let metadata = fs::metadata(path).map_err(|_| PipelineError::InputMissing(path.to_path_buf()))?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(PipelineError::InputMissing(path.to_path_buf()));
        }
        Ok(VideoAsset {
            path: path.to_path_buf(),
            container: path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_ascii_lowercase()),
            size: metadata.len(),
            dimensions: None,
        })
    }

    pub fn with_dimensions(self, width: u32, height: u32) -> VideoAsset {
        VideoAsset {
            dimensions: Some((width, height)),
            ..self
        }
    }
}

/// Scratch space for one pipeline run.
///
/// Every artifact lives in a fresh temp dir and carries the run's token in its
/// name, so concurrent runs never touch each other's files. Dropping the
/// workspace deletes everything in it, whichever way the run ended.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    token: String,
}

impl Workspace {
    pub fn create(base: &Path) -> io::Result<Workspace> {
        fs::create_dir_all(base)?;
        let token = new_token();
        let dir = tempfile::Builder::new()
            .prefix(&format!("reelcap-{token}-"))
            .tempdir_in(base)?;
        Ok(Workspace { dir, token })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a new artifact, e.g. `overlay_Xy12ab9Q.png`. Does not create the file.
    pub fn artifact(&self, stem: &str, extension: &str) -> PathBuf {
        self.dir.path().join(format!("{stem}_{}.{extension}", self.token))
    }

    /// Remove the workspace now so a failure to do so can be logged.
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

// random name piece, same idea as the temp media names we always used
fn new_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

/// Delete a half-written output. Missing files are fine.
pub fn discard_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::info!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Could not remove partial output {}: {e}", path.display()),
    }
}

/// Did an engine step actually leave a usable file behind?
pub fn produced(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}
