//! Background work queue for facade operations.
//!
//! Every facade call is turned into a job and handed to a single worker task
//! over an unbounded mpsc channel, so submitting never blocks the caller.
//! The worker either spawns each job independently or runs them one at a
//! time in submission order, depending on [`DispatchMode`].

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// A unit of background work.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// How the worker runs submitted jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Each job runs as its own task; completion order is unspecified
    #[default]
    Concurrent,

    /// Jobs run one at a time in submission order
    Sequential,
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concurrent" => Ok(DispatchMode::Concurrent),
            "sequential" => Ok(DispatchMode::Sequential),
            other => Err(format!(
                "'{}' is not a dispatch mode (expected concurrent or sequential)",
                other
            )),
        }
    }
}

/// Owned background queue; one per facade instance.
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<Job>,
    worker: JoinHandle<()>,
    mode: DispatchMode,
}

impl WorkQueue {
    /// Start a queue on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(mode: DispatchMode) -> Self {
        Self::with_handle(&Handle::current(), mode)
    }

    /// Start a queue on the given runtime.
    pub fn with_handle(handle: &Handle, mode: DispatchMode) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = handle.spawn(run_worker(rx, mode));
        Self { tx, worker, mode }
    }

    /// Submit a job without waiting for it to run.
    pub fn dispatch<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tx.send(Box::pin(job)).is_err() {
            warn!("Work queue worker has stopped, dropping job");
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Stop accepting work and wait until every submitted job has finished.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "Work queue worker panicked");
        }
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<Job>, mode: DispatchMode) {
    debug!(mode = ?mode, "Work queue started");
    let mut completed: u64 = 0;

    match mode {
        DispatchMode::Sequential => {
            while let Some(job) = rx.recv().await {
                // A panicking job must not take the worker down with it
                if let Err(e) = tokio::spawn(job).await {
                    warn!(error = %e, "Background job panicked");
                }
                completed += 1;
            }
        }
        DispatchMode::Concurrent => {
            let mut tasks = JoinSet::new();
            loop {
                tokio::select! {
                    maybe_job = rx.recv() => {
                        match maybe_job {
                            Some(job) => {
                                tasks.spawn(job);
                            }
                            None => break,
                        }
                    }

                    Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                        if let Err(e) = result {
                            warn!(error = %e, "Background job panicked");
                        }
                        completed += 1;
                    }
                }
            }

            // Channel closed, drain in-flight jobs
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Background job panicked");
                }
                completed += 1;
            }
        }
    }

    info!(completed = completed, "Work queue drained");
}
