//! Burn short text captions into vertical videos.
//!
//! [`Pipeline`] does one video end to end, [`JobQueue`] runs several at once.

pub mod captions;
pub mod composite;
pub mod config;
pub mod engine;
pub mod error;
pub mod ffmpeg_babysitter;
pub mod job;
pub mod logging;
pub mod media_helpers;
pub mod normalize;
pub mod pipeline;
pub mod probe;
pub mod queue;
pub mod source;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T = ()> = std::result::Result<T, Error>;

pub use config::{CaptionStyle, Config};
pub use error::{PipelineError, PipelineWarning};
pub use job::{Job, JobId};
pub use pipeline::{CancelToken, Pipeline, PipelineResult, Stage};
pub use queue::JobQueue;
pub use source::{process_single_video, Caption, CaptionSource, FixedCaption, VideoReport};
