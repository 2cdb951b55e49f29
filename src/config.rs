// runtime settings. built once at start-up and handed to the pipeline.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A plain RGB triple.
pub type Rgb = (u8, u8, u8);

pub const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/msttcorefonts/Arial.ttf";
pub const DEFAULT_OUTPUT_FOLDER: &str = "/tmp/videos/output";

/// Colours used for the caption plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptionStyle {
    pub background: Rgb,
    pub text: Rgb,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            background: (255, 255, 255),
            text: (0, 0, 0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// `None` means go straight to the built-in font.
    pub font_path: Option<PathBuf>,
    pub temp_dir: PathBuf,
    pub output_folder: PathBuf,
    /// Lowercase extensions (no dot) that get re-encoded before the overlay.
    pub normalize_extensions: BTreeSet<String>,
    pub hw_accel: Option<String>,
    pub style: CaptionStyle,
    pub max_jobs: usize,
    pub job_timeout: Option<Duration>,
    pub environment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            font_path: Some(PathBuf::from(DEFAULT_FONT_PATH)),
            temp_dir: std::env::temp_dir(),
            output_folder: PathBuf::from(DEFAULT_OUTPUT_FOLDER),
            normalize_extensions: parse_extensions("mov"),
            hw_accel: None,
            style: CaptionStyle::default(),
            max_jobs: 2,
            job_timeout: None,
            environment: String::new(),
        }
    }
}

impl Config {
    /// Read settings from the process environment, after pulling in a `.env` file if there is one.
    pub fn from_env() -> crate::Result<Config> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        // empty values count as unset
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Config::default();

        if let Some(ffmpeg) = var("FFMPEG_PATH") {
            config.ffmpeg_path = PathBuf::from(ffmpeg);
        }
        config.ffprobe_path = match var("FFPROBE_PATH") {
            Some(ffprobe) => PathBuf::from(ffprobe),
            None => ffprobe_beside(&config.ffmpeg_path),
        };
        if let Some(font) = var("FONT_PATH") {
            config.font_path = Some(PathBuf::from(font));
        }
        if let Some(dir) = var("TEMP_DIR") {
            config.temp_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("OUTPUT_FOLDER") {
            config.output_folder = PathBuf::from(dir);
        }
        if let Some(list) = var("NORMALIZE_EXTENSIONS") {
            config.normalize_extensions = parse_extensions(&list);
        }
        config.hw_accel = var("HW_ACCEL");
        if let Some(hex) = var("CAPTION_BACKGROUND") {
            config.style.background = parse_hex_color(&hex)?;
        }
        if let Some(hex) = var("CAPTION_TEXT") {
            config.style.text = parse_hex_color(&hex)?;
        }
        if let Some(jobs) = var("MAX_JOBS") {
            let jobs: usize = jobs
                .trim()
                .parse()
                .map_err(|e| format!("MAX_JOBS must be a number: {e}"))?;
            if jobs == 0 {
                return Err("MAX_JOBS must be at least 1".into());
            }
            config.max_jobs = jobs;
        }
        if let Some(secs) = var("JOB_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| format!("JOB_TIMEOUT_SECS must be a number: {e}"))?;
            config.job_timeout = Some(Duration::from_secs(secs));
        }
        config.environment = var("ENVIRONMENT").unwrap_or_default();

        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Does a file with this path need re-encoding before we overlay onto it?
    pub fn needs_normalization(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.normalize_extensions.contains(&ext.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self.ffprobe_path = ffprobe_beside(&self.ffmpeg_path);
        self
    }

    pub fn with_ffprobe_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffprobe_path = path.into();
        self
    }

    pub fn with_font_path(mut self, path: Option<PathBuf>) -> Self {
        self.font_path = path;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_output_folder(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_folder = dir.into();
        self
    }

    pub fn with_normalize_extensions(mut self, list: &str) -> Self {
        self.normalize_extensions = parse_extensions(list);
        self
    }

    pub fn with_style(mut self, style: CaptionStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_max_jobs(mut self, jobs: usize) -> Self {
        self.max_jobs = jobs.max(1);
        self
    }

    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }
}

/// `/opt/ffmpeg/bin/ffmpeg` -> `/opt/ffmpeg/bin/ffprobe`
fn ffprobe_beside(ffmpeg: &Path) -> PathBuf {
    match ffmpeg.file_name().and_then(|name| name.to_str()) {
        Some(name) if name.contains("ffmpeg") => ffmpeg.with_file_name(name.replace("ffmpeg", "ffprobe")),
        _ => ffmpeg.with_file_name("ffprobe"),
    }
}

fn parse_extensions(list: &str) -> BTreeSet<String> {
    list.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

/// Parses `#rrggbb` (the `#` is optional).
pub fn parse_hex_color(hex: &str) -> crate::Result<Rgb> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(format!("'{hex}' is not a #rrggbb colour").into());
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16).map_err(|_| format!("'{hex}' is not a #rrggbb colour"))
    };
    Ok((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}
