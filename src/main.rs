use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::task::JoinSet;
use tracing::{error, info};

use reelcap::captions::{render_caption, CaptionFont, FontOrigin};
use reelcap::engine::MediaEngine;
use reelcap::{logging, Config, Job, JobQueue, Pipeline};

#[derive(Parser, Debug)]
#[command(author, version, about = "Burn text captions into vertical videos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Caption one or more videos
    Process(ProcessArgs),
    /// Render only the caption image, handy for checking a layout
    Render(RenderArgs),
    /// Check that ffmpeg and the caption font are usable
    Check,
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Videos to caption
    #[arg(required = true, value_name = "INPUT")]
    inputs: Vec<PathBuf>,

    /// Where captioned videos go (defaults to OUTPUT_FOLDER)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Caption text
    #[arg(short, long, conflicts_with = "caption_file", required_unless_present = "caption_file")]
    caption: Option<String>,

    /// Read the caption text from a file
    #[arg(long, value_name = "FILE")]
    caption_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Caption text
    text: String,

    /// Width of the video the caption is for
    #[arg(long, default_value_t = 1080)]
    width: u32,

    /// Height of the video the caption is for
    #[arg(long, default_value_t = 1920)]
    height: u32,

    /// PNG to write
    #[arg(long, value_name = "FILE.png")]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("bad configuration: {e}");
            return ExitCode::from(2);
        }
    };
    logging::init(&config);
    info!("reelcap is starting...");

    let outcome = match cli.command {
        Commands::Process(args) => process(config, args).await,
        Commands::Render(args) => render(&config, args),
        Commands::Check => check(&config),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// name captioned videos after their source
fn output_name(output_dir: &Path, input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    output_dir.join(format!("processed_{stem}.mp4"))
}

async fn process(config: Config, args: ProcessArgs) -> reelcap::Result<bool> {
    let caption = match (args.caption, args.caption_file) {
        (Some(text), _) => text,
        (None, Some(file)) => std::fs::read_to_string(&file)
            .map_err(|e| format!("could not read caption file {}: {e}", file.display()))?,
        (None, None) => return Err("no caption given".into()),
    };
    let output_dir = args.output_dir.unwrap_or_else(|| config.output_folder.clone());

    let pipeline = Arc::new(Pipeline::new(config)?);
    let queue = Arc::new(JobQueue::new(pipeline));

    let mut jobs = JoinSet::new();
    for (index, input) in args.inputs.into_iter().enumerate() {
        let job = Job::new(&input, output_name(&output_dir, &input), caption.as_str());
        info!("Queued {} as job {}", input.display(), job.id);
        let queue = queue.clone();
        jobs.spawn(async move { (index, input, queue.submit(job).await) });
    }

    let mut finished = Vec::new();
    while let Some(joined) = jobs.join_next().await {
        finished.push(joined?);
    }
    finished.sort_by_key(|(index, _, _)| *index);

    let mut all_ok = true;
    for (_, input, result) in finished {
        for warning in &result.warnings {
            println!("warning: {}: {warning}", input.display());
        }
        match (&result.output, result.reason()) {
            (Some(output), None) => println!("ok: {} -> {}", input.display(), output.display()),
            (_, reason) => {
                all_ok = false;
                let reason = reason.unwrap_or_else(|| "no output produced".to_string());
                println!("failed: {}: {reason}", input.display());
            }
        }
    }
    Ok(all_ok)
}

fn render(config: &Config, args: RenderArgs) -> reelcap::Result<bool> {
    let (font, warning) = CaptionFont::load(config.font_path.as_deref())?;
    if let Some(warning) = warning {
        println!("warning: {warning}");
    }
    let layout = render_caption(&font, &args.text, args.width, args.height, &config.style, &args.out)?;
    println!(
        "{}: {} line(s), {}x{}, font size {}",
        args.out.display(),
        layout.lines.len(),
        layout.width,
        layout.height,
        layout.metrics.font_size
    );
    Ok(true)
}

fn check(config: &Config) -> reelcap::Result<bool> {
    let engine = MediaEngine::new(config);
    let mut ok = true;
    match engine.ensure_available() {
        Ok(version) => println!("ffmpeg: {version}"),
        Err(e) => {
            ok = false;
            println!("ffmpeg: {e}");
            if let Some(diagnostics) = e.diagnostics() {
                println!("{diagnostics}");
            }
        }
    }

    let (font, warning) = CaptionFont::load(config.font_path.as_deref())?;
    match font.origin() {
        FontOrigin::File(path) => println!("font: {}", path.display()),
        FontOrigin::BuiltIn => println!("font: built-in"),
    }
    if let Some(warning) = warning {
        println!("warning: {warning}");
    }
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_are_named_after_inputs() {
        let out = output_name(Path::new("/tmp/videos/output"), Path::new("/in/IMG_0042.MOV"));
        assert_eq!(out, PathBuf::from("/tmp/videos/output/processed_IMG_0042.mp4"));
    }

    #[test]
    fn process_needs_a_caption() {
        assert!(Cli::try_parse_from(["reelcap", "process", "a.mp4"]).is_err());
        assert!(Cli::try_parse_from(["reelcap", "process", "a.mp4", "--caption", "x", "--caption-file", "c.txt"]).is_err());
        let cli = Cli::try_parse_from(["reelcap", "process", "a.mp4", "b.mov", "-c", "hi"]).unwrap();
        match cli.command {
            Commands::Process(args) => {
                assert_eq!(args.inputs.len(), 2);
                assert_eq!(args.caption.as_deref(), Some("hi"));
            }
            other => panic!("parsed as {other:?}"),
        }
    }

    #[test]
    fn render_defaults_to_portrait() {
        let cli = Cli::try_parse_from(["reelcap", "render", "hello", "--out", "x.png"]).unwrap();
        match cli.command {
            Commands::Render(args) => assert_eq!((args.width, args.height), (1080, 1920)),
            other => panic!("parsed as {other:?}"),
        }
    }
}
