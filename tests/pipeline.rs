// end to end runs against a real ffmpeg. skipped when there isn't one.

use std::path::{Path, PathBuf};
use std::process::Command;

use ffmpeg_sidecar::command::ffmpeg_is_installed;
use reelcap::{Config, Pipeline, PipelineError, Stage};
use tempfile::TempDir;

fn have_ffmpeg() -> bool {
    if !ffmpeg_is_installed() {
        eprintln!("ffmpeg not on PATH, skipping");
        return false;
    }
    true
}

/// two seconds of portrait test pattern with a tone
fn make_clip(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let status = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error"])
        .args(["-f", "lavfi", "-i", "testsrc=size=1080x1920:rate=25:duration=2"])
        .args(["-f", "lavfi", "-i", "sine=frequency=440:duration=2"])
        .args(["-c:v", "libx264", "-preset", "ultrafast", "-pix_fmt", "yuv420p"])
        .args(["-c:a", "aac", "-shortest", "-y"])
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success(), "could not generate {name}");
    path
}

fn remux(input: &Path, output: &Path) {
    let status = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-i"])
        .arg(input)
        .args(["-c", "copy", "-y"])
        .arg(output)
        .status()
        .unwrap();
    assert!(status.success());
}

fn pipeline(scratch: &Path) -> Pipeline {
    let config = Config::default()
        .with_temp_dir(scratch)
        .with_font_path(None)
        .with_normalize_extensions("mov");
    Pipeline::new(config).unwrap()
}

/// width, height and duration of the video stream
fn size_and_duration(path: &Path) -> (i64, i64, f64) {
    let info = ffprobe::ffprobe(path).unwrap();
    let video = info
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .unwrap();
    let duration = video
        .duration
        .as_deref()
        .or(info.format.duration.as_deref())
        .unwrap()
        .parse()
        .unwrap();
    (video.width.unwrap(), video.height.unwrap(), duration)
}

fn scratch_is_clean(scratch: &Path) -> bool {
    !scratch.exists() || std::fs::read_dir(scratch).unwrap().count() == 0
}

#[test]
fn portrait_mp4_gets_a_caption() {
    if !have_ffmpeg() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let scratch = dir.path().join("scratch");
    let input = make_clip(dir.path(), "clip.mp4");
    let output = dir.path().join("out").join("processed_clip.mp4");

    let caption = "Мастерство — это привычка, а не событие.";
    let result = pipeline(&scratch).process(&input, &output, caption);

    assert!(result.is_success(), "failed: {:?}", result.reason());
    assert_eq!(
        result.stages,
        vec![Stage::Start, Stage::Probe, Stage::Layout, Stage::Composite, Stage::Done]
    );
    assert_eq!(result.output.as_deref(), Some(output.as_path()));
    assert_eq!(result.caption, caption);

    let (_, _, input_duration) = size_and_duration(&input);
    let (width, height, duration) = size_and_duration(&output);
    assert_eq!((width, height), (1080, 1920));
    // one frame at 25fps
    assert!(
        (duration - input_duration).abs() <= 0.041,
        "duration went from {input_duration} to {duration}"
    );
    assert!(scratch_is_clean(&scratch));
}

#[test]
fn mov_input_is_normalized_first() {
    if !have_ffmpeg() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let scratch = dir.path().join("scratch");
    let mp4 = make_clip(dir.path(), "source.mp4");
    let mov = dir.path().join("IMG_0001.MOV");
    remux(&mp4, &mov);
    let output = dir.path().join("processed_IMG_0001.mp4");

    let result = pipeline(&scratch).process(&mov, &output, "Fades, beards and hot towels");

    assert!(result.is_success(), "failed: {:?}", result.reason());
    assert_eq!(result.stages[1], Stage::Normalize);
    assert!(result.warnings.iter().all(|w| !matches!(w, reelcap::PipelineWarning::ProbeDegraded { .. })));
    let (width, height, _) = size_and_duration(&output);
    assert_eq!((width, height), (1080, 1920));
    assert!(scratch_is_clean(&scratch));
}

#[test]
fn empty_caption_still_succeeds() {
    if !have_ffmpeg() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let scratch = dir.path().join("scratch");
    let input = make_clip(dir.path(), "clip.mp4");
    let output = dir.path().join("processed_clip.mp4");

    let result = pipeline(&scratch).process(&input, &output, "");

    assert!(result.is_success(), "failed: {:?}", result.reason());
    assert!(output.exists());
    assert!(scratch_is_clean(&scratch));
}

#[test]
fn missing_engine_produces_nothing() {
    let dir = TempDir::new().unwrap();
    let scratch = dir.path().join("scratch");
    let input = dir.path().join("clip.mp4");
    std::fs::write(&input, b"not really a video").unwrap();
    let output = dir.path().join("processed_clip.mp4");

    let config = Config::default()
        .with_ffmpeg_path(dir.path().join("no-such-ffmpeg"))
        .with_temp_dir(&scratch)
        .with_font_path(None);
    let result = Pipeline::new(config).unwrap().process(&input, &output, "caption");

    assert!(!result.is_success());
    assert!(matches!(result.error, Some(PipelineError::DependencyMissing { .. })));
    assert!(!output.exists());
    assert!(scratch_is_clean(&scratch));
}

#[test]
fn missing_input_is_reported() {
    if !have_ffmpeg() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let scratch = dir.path().join("scratch");
    let output = dir.path().join("processed_gone.mp4");

    let result = pipeline(&scratch).process(&dir.path().join("gone.mp4"), &output, "caption");

    assert!(matches!(result.error, Some(PipelineError::InputMissing(_))));
    assert!(!output.exists());
}
