// Make sure ffmpeg isnt silently dying on us.

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use ffmpeg_sidecar::iter::FfmpegIterator;

use crate::pipeline::CancelToken;

// how much plain log output we keep around in case ffmpeg fails without an error line
const TAIL_LINES: usize = 20;

// how often we look at the child and the cancel flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FfmpegFailure {
    /// The binary could not be started at all.
    Missing(String),
    /// We killed it because the run was abandoned.
    Cancelled,
    /// It ran and exited non-zero. Carries whatever it complained about.
    Exited(String),
}

/// Sit on a running ffmpeg until it exits, killing it if `cancel` fires.
///
/// Output is drained on its own thread so a chatty encode can't fill the pipe,
/// and a silent one can still be killed.
pub fn ffbabysit(mut baby: FfmpegChild, cancel: &CancelToken) -> Result<(), FfmpegFailure> {
    let events = match baby.iter() {
        Ok(events) => events,
        Err(e) => {
            let _ = baby.kill();
            let _ = baby.wait();
            return Err(FfmpegFailure::Exited(format!("could not read ffmpeg output: {e}")));
        }
    };
    let reader = thread::spawn(move || Output::collect(events));

    let status = loop {
        if cancel.is_cancelled() {
            tracing::warn!("Run was cancelled, killing ffmpeg.");
            let _ = baby.kill();
            let _ = baby.wait();
            // the reader finishes on its own once the pipes close
            return Err(FfmpegFailure::Cancelled);
        }
        match baby.as_inner_mut().try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = baby.kill();
                return Err(FfmpegFailure::Exited(format!("could not wait on ffmpeg: {e}")));
            }
        }
    };

    let output = reader.join().unwrap_or_default();

    if status.success() {
        if !output.errors.is_empty() {
            tracing::debug!("ffmpeg exited cleanly but complained {} times.", output.errors.len());
        }
        return Ok(());
    }

    let diagnostics = if output.errors.is_empty() {
        Vec::from(output.tail).join("\n")
    } else {
        output.errors.join("\n")
    };
    Err(FfmpegFailure::Exited(format!("{status}: {diagnostics}")))
}

#[derive(Debug, Default)]
struct Output {
    errors: Vec<String>,
    tail: VecDeque<String>,
}

impl Output {
    fn collect(events: FfmpegIterator) -> Output {
        let mut output = Output::default();
        for event in events {
            match event {
                FfmpegEvent::Error(line)
                | FfmpegEvent::Log(LogLevel::Error, line)
                | FfmpegEvent::Log(LogLevel::Fatal, line) => {
                    tracing::debug!("ffmpeg: {line}");
                    output.errors.push(line);
                }
                FfmpegEvent::Log(_, line) => {
                    if output.tail.len() == TAIL_LINES {
                        output.tail.pop_front();
                    }
                    output.tail.push_back(line);
                }
                _ => {}
            }
        }
        output
    }
}
