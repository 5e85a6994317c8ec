//! The job loop: fetch jobs, run them through the [`Handler`], report results.
//!
//! ## Concurrency
//!
//! Before every fetch the worker asks its [`ConcurrencyModifier`] how many
//! jobs it should hold given the number currently in flight, then requests
//! only the difference. Each job runs on its own task inside a [`JoinSet`], so the
//! loop keeps accepting work while conversions are in progress. In
//! [`Mode::Sequential`] the desired level is always 1.
//!
//! ## Failure policy
//!
//! Transport errors while fetching or reporting are logged and the loop
//! carries on: the platform owns retries and re-queues jobs it never heard
//! back about.

use crate::config::{Mode, WorkerConfig};
use crate::error::WorkerError;
use crate::handler::Handler;
use crate::job::{Job, JobOutput};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Maps the number of jobs in flight to the desired concurrency level.
pub type ConcurrencyModifier = Arc<dyn Fn(usize) -> usize + Send + Sync>;

/// A modifier that always answers `n`.
pub fn fixed(n: usize) -> ConcurrencyModifier {
    Arc::new(move |_current| n)
}

/// Where jobs come from and where their results go.
pub trait JobSource: Send + Sync {
    /// Take up to `max` jobs. An empty vector means no work right now.
    ///
    /// `in_progress` tells the platform whether this worker is already busy.
    fn fetch(&self, max: usize, in_progress: bool) -> BoxFuture<'_, Result<Vec<Job>, WorkerError>>;

    /// Deliver the output of a finished job.
    fn report<'a>(
        &'a self,
        job_id: &'a str,
        output: &'a JobOutput,
    ) -> BoxFuture<'a, Result<(), WorkerError>>;

    /// Signal liveness, listing the jobs currently in flight.
    fn heartbeat<'a>(&'a self, in_progress: &'a [String]) -> BoxFuture<'a, Result<(), WorkerError>>;
}

/// Totals for one [`Worker::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub succeeded: usize,
    pub failed: usize,
    /// Tasks that panicked outside the handler (should stay at zero).
    pub aborted: usize,
}

/// Runs jobs from a [`JobSource`] until shut down.
pub struct Worker {
    handler: Handler,
    config: WorkerConfig,
    modifier: ConcurrencyModifier,
}

impl Worker {
    pub fn new(handler: Handler, config: WorkerConfig) -> Self {
        let modifier = fixed(config.effective_concurrency());
        Self {
            handler,
            config,
            modifier,
        }
    }

    /// Replace the default fixed modifier. Ignored in [`Mode::Sequential`].
    pub fn with_concurrency_modifier(mut self, modifier: ConcurrencyModifier) -> Self {
        self.modifier = modifier;
        self
    }

    /// Desired number of in-flight jobs given the `current` in-flight count (≥ 1).
    pub fn desired_concurrency(&self, current: usize) -> usize {
        match self.config.mode {
            Mode::Sequential => 1,
            Mode::Concurrent => (self.modifier)(current).max(1),
        }
    }

    /// Run until `shutdown` resolves, then finish in-flight jobs and return.
    ///
    /// Shutdown is observed between takes and while idle, never in the middle
    /// of a take, so a job the platform has handed out is always run and
    /// reported.
    pub async fn run<F>(&self, source: Arc<dyn JobSource>, shutdown: F) -> RunStats
    where
        F: Future<Output = ()>,
    {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let in_flight: Arc<Mutex<HashSet<String>>> = Arc::default();
        let heartbeat = self.spawn_heartbeat(Arc::clone(&source), Arc::clone(&in_flight));

        let mut tasks: JoinSet<bool> = JoinSet::new();
        let mut stats = RunStats::default();
        tokio::pin!(shutdown);

        info!(
            "Worker started: mode={:?} concurrency={}",
            self.config.mode,
            self.config.effective_concurrency()
        );

        loop {
            while let Some(res) = tasks.try_join_next() {
                tally(&mut stats, res);
            }

            // A take that has been issued is always completed: the platform
            // considers its jobs handed out as soon as it answers.
            if shutdown.as_mut().now_or_never().is_some() {
                break;
            }

            let desired = self.desired_concurrency(tasks.len());
            let capacity = desired.saturating_sub(tasks.len());

            let mut fetched = 0;
            if capacity > 0 {
                match source.fetch(capacity, !tasks.is_empty()).await {
                    Ok(jobs) => {
                        fetched = jobs.len();
                        for job in jobs {
                            self.spawn_job(&mut tasks, job, &source, &in_flight);
                        }
                    }
                    Err(e) => warn!("Failed to fetch jobs: {}", e),
                }
            }

            if fetched == 0 {
                tokio::select! {
                    _ = &mut shutdown => break,
                    Some(res) = tasks.join_next(), if !tasks.is_empty() => tally(&mut stats, res),
                    _ = tokio::time::sleep(poll), if tasks.is_empty() || capacity > 0 => {}
                }
            }
        }

        info!("Shutdown requested; draining {} in-flight jobs", tasks.len());
        while let Some(res) = tasks.join_next().await {
            tally(&mut stats, res);
        }
        heartbeat.abort();

        info!(
            "Worker stopped: {} succeeded, {} failed",
            stats.succeeded, stats.failed
        );
        stats
    }

    fn spawn_job(
        &self,
        tasks: &mut JoinSet<bool>,
        job: Job,
        source: &Arc<dyn JobSource>,
        in_flight: &Arc<Mutex<HashSet<String>>>,
    ) {
        debug!(job_id = %job.id, "Accepted job");
        lock(in_flight).insert(job.id.clone());

        let handler = self.handler.clone();
        let source = Arc::clone(source);
        let in_flight = Arc::clone(in_flight);
        tasks.spawn(async move {
            let output = handler.handle(&job).await;
            if let Err(e) = source.report(&job.id, &output).await {
                error!(job_id = %job.id, "Failed to report result: {}", e);
            }
            lock(&in_flight).remove(&job.id);
            !output.is_error()
        });
    }

    fn spawn_heartbeat(
        &self,
        source: Arc<dyn JobSource>,
        in_flight: Arc<Mutex<HashSet<String>>>,
    ) -> tokio::task::JoinHandle<()> {
        let every = Duration::from_millis(self.config.ping_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let ids: Vec<String> = lock(&in_flight).iter().cloned().collect();
                if let Err(e) = source.heartbeat(&ids).await {
                    debug!("Heartbeat failed: {}", e);
                }
            }
        })
    }
}

/// Run a single job without a platform (local testing).
pub async fn run_local(handler: &Handler, job: &Job) -> JobOutput {
    info!(job_id = %job.id, "Running job locally");
    handler.handle(job).await
}

fn tally(stats: &mut RunStats, res: Result<bool, JoinError>) {
    match res {
        Ok(true) => stats.succeeded += 1,
        Ok(false) => stats.failed += 1,
        Err(e) => {
            error!("Job task aborted: {}", e);
            stats.aborted += 1;
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
