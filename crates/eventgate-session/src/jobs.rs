//! Background worker for fire-and-forget side effects.
//!
//! Closing a superseded or ended connection can block on a dead peer. The
//! session hands such work to a [`JobQueue`] instead of awaiting it while
//! holding its own lock; the worker runs jobs one at a time and logs any
//! that fail or time out.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;

/// Upper bound on a single job's runtime.
const JOB_TIMEOUT: Duration = Duration::from_secs(5);

type BoxJob = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

struct Job {
    name: &'static str,
    task: BoxJob,
}

/// Handle to the job worker. Cheap to clone; the worker exits once every
/// handle is dropped and the backlog is done.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl JobQueue {
    /// Spawns the worker on the current Tokio runtime.
    pub fn start() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_jobs(rx));
        Self { tx }
    }

    /// Queues a job. `name` shows up in failure logs.
    pub fn submit<F, E>(&self, name: &'static str, job: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display,
    {
        let task = Box::pin(async move { job.await.map_err(|e| e.to_string()) });
        if self.tx.send(Job { name, task }).is_err() {
            tracing::debug!(job = name, "job worker gone, job dropped");
        }
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue").finish_non_exhaustive()
    }
}

async fn run_jobs(mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        match tokio::time::timeout(JOB_TIMEOUT, job.task).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::debug!(job = job.name, %error, "job failed"),
            Err(_) => tracing::warn!(job = job.name, "job timed out"),
        }
    }
}
