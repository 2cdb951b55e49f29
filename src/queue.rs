use std::{
    collections::VecDeque,
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::sync::{RwLock, Semaphore};

use crate::error::PipelineError;
use crate::job::{Job, JobId};
use crate::pipeline::{CancelToken, Pipeline, PipelineResult};

type JobHandle = JobId;

/// Runs caption jobs on the blocking pool, a few at a time.
///
/// ffmpeg calls block for as long as the encode takes, so jobs never run on
/// the async worker threads.
pub struct JobQueue {
    pipeline: Arc<Pipeline>,
    queue: Arc<RwLock<VecDeque<JobHandle>>>,
    permits: Arc<Semaphore>,
    max_jobs: usize,
    timeout: Option<Duration>,
}

impl JobQueue {
    /// Concurrency and timeout come from the pipeline's config.
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let max_jobs = pipeline.config().max_jobs.max(1);
        let timeout = pipeline.config().job_timeout;
        Self {
            pipeline,
            queue: Default::default(),
            permits: Arc::new(Semaphore::new(max_jobs)),
            max_jobs,
            timeout,
        }
    }

    /// add `job` to the queue, wait for a free slot, and block till it's done
    ///
    /// Dropping the returned future, or running past the timeout, cancels the
    /// job: its ffmpeg gets killed and its temp files removed.
    pub async fn submit(&self, job: Job) -> PipelineResult {
        let id = job.id;
        self.queue.write().await.push_back(id);
        let waiting = QueueGuard {
            queue: Arc::downgrade(&self.queue),
            job: id,
        };

        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return PipelineResult::failed(&job.caption, PipelineError::Worker("job queue is closed".into()))
            }
        };
        drop(waiting);
        tracing::info!("Job {id} started ({} running).", self.running());

        let cancel = CancelToken::default();
        let _abandoned = CancelOnDrop(cancel.clone());

        let pipeline = self.pipeline.clone();
        let caption = job.caption.clone();
        let worker_cancel = cancel.clone();
        let mut handle = tokio::task::spawn_blocking(move || {
            // the slot stays taken until the blocking work is really over
            let _permit = permit;
            pipeline.process_with_cancel(&job.input, &job.output, &job.caption, &worker_cancel)
        });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!("Job {id} ran past {limit:?}, cancelling it.");
                    cancel.cancel();
                    handle.await
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Job {id} worker died: {e}");
                PipelineResult::failed(&caption, PipelineError::Worker(e.to_string()))
            }
        }
    }

    /// get position of `job` among jobs waiting for a slot, or None if it isn't waiting
    pub async fn position(&self, job: JobHandle) -> Option<usize> {
        let lock = self.queue.read().await;
        lock.iter().position(|other| *other == job)
    }

    /// Jobs waiting for a slot.
    pub async fn len(&self) -> usize {
        self.queue.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Jobs holding a slot right now.
    pub fn running(&self) -> usize {
        self.max_jobs - self.permits.available_permits()
    }
}

/// ensures that the job is removed when dropped
struct QueueGuard {
    queue: Weak<RwLock<VecDeque<JobHandle>>>,
    job: JobHandle,
}

impl Drop for QueueGuard {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.upgrade() {
            let job = self.job;
            let removed = match queue.try_write() {
                Ok(mut lock) => {
                    lock.retain(|other| *other != job);
                    true
                }
                Err(_) => false,
            };
            if removed {
                return;
            }
            // someone holds the lock, do it later
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    let mut lock = queue.write().await;
                    lock.retain(|other| *other != job);
                });
            }
        }
    }
}

/// Cancels the job if whoever awaited it gives up.
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn broken_pipeline(temp: &std::path::Path, max_jobs: usize) -> Arc<Pipeline> {
        let config = Config::default()
            .with_ffmpeg_path("/nowhere/bin/ffmpeg")
            .with_temp_dir(temp)
            .with_font_path(None)
            .with_max_jobs(max_jobs);
        Arc::new(Pipeline::new(config).unwrap())
    }

    #[tokio::test]
    async fn jobs_finish_and_leave_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let queue = JobQueue::new(broken_pipeline(dir.path(), 1));

        let job = |i: usize| Job::new(format!("in{i}.mp4"), dir.path().join(format!("out{i}.mp4")), "caption");
        let (a, b, c, d) = tokio::join!(
            queue.submit(job(0)),
            queue.submit(job(1)),
            queue.submit(job(2)),
            queue.submit(job(3))
        );
        let results = [a, b, c, d];

        assert_eq!(results.len(), 4);
        for result in results {
            assert!(!result.is_success());
            assert!(matches!(result.error, Some(PipelineError::DependencyMissing { .. })));
        }
        assert!(queue.is_empty().await);
        assert_eq!(queue.running(), 0);
    }

    #[tokio::test]
    async fn unknown_jobs_have_no_position() {
        let dir = tempfile::tempdir().unwrap();
        let queue = JobQueue::new(broken_pipeline(dir.path(), 2));
        assert_eq!(queue.position(JobId(u64::MAX)).await, None);
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn queue_guard_removes_the_job_even_while_locked() {
        let queue: Arc<RwLock<VecDeque<JobHandle>>> = Default::default();
        queue.write().await.extend([JobId(1), JobId(2)]);

        drop(QueueGuard {
            queue: Arc::downgrade(&queue),
            job: JobId(1),
        });
        assert_eq!(*queue.read().await, [JobId(2)]);

        // with a reader holding the lock the removal is deferred to a task
        let reading = queue.read().await;
        drop(QueueGuard {
            queue: Arc::downgrade(&queue),
            job: JobId(2),
        });
        assert_eq!(reading.len(), 1);
        drop(reading);

        for _ in 0..50 {
            if queue.read().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(queue.read().await.is_empty());
    }

    #[test]
    fn dropping_the_guard_cancels() {
        let token = CancelToken::default();
        {
            let _guard = CancelOnDrop(token.clone());
        }
        assert!(token.is_cancelled());
    }
}
