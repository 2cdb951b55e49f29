use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_JOB: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl JobId {
    /// Ids only ever go up within a process.
    pub fn next() -> JobId {
        JobId(NEXT_JOB.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One video to caption.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub input: PathBuf,
    pub output: PathBuf,
    pub caption: String,
}

impl Job {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, caption: impl Into<String>) -> Job {
        Job {
            id: JobId::next(),
            input: input.into(),
            output: output.into(),
            caption: caption.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = Job::new("a.mp4", "out/a.mp4", "one");
        let b = Job::new("b.mp4", "out/b.mp4", "two");
        assert!(b.id > a.id);
        assert_eq!(format!("{}", JobId(7)), "#7");
    }
}
