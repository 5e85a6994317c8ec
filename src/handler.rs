//! Single-job handling: payload → temp file → converter → output.
//!
//! [`Handler::handle`] never fails: every error becomes a
//! `{"error": "..."}` [`JobOutput`] so the job loop can report it and move
//! on to the next job.

use crate::converter::Converter;
use crate::error::JobError;
use crate::job::{Job, JobInput, JobOutput};
use crate::payload::{decode_pdf, StagedPdf};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::AbortHandle;
use tracing::{info, warn};

/// Runs jobs against a shared [`Converter`].
#[derive(Clone)]
pub struct Handler {
    converter: Arc<dyn Converter>,
    staging_dir: Option<PathBuf>,
}

impl Handler {
    pub fn new(converter: Arc<dyn Converter>) -> Self {
        Self {
            converter,
            staging_dir: None,
        }
    }

    /// Stage PDFs in `dir` instead of the system temp dir.
    pub fn with_staging_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.staging_dir = dir;
        self
    }

    /// Process one job.
    ///
    /// The conversion runs on its own task so a slow document does not hold
    /// up the caller; a panic inside the converter is reported as an error.
    pub async fn handle(&self, job: &Job) -> JobOutput {
        let start = Instant::now();
        let result = self.run(job).await;
        let elapsed_ms = start.elapsed().as_millis();

        match &result {
            Ok(md) => info!(
                job_id = %job.id,
                "Job complete: {} chars of markdown in {}ms",
                md.len(),
                elapsed_ms
            ),
            Err(e) => warn!(job_id = %job.id, "Job failed after {}ms: {}", elapsed_ms, e),
        }
        result.into()
    }

    /// Synchronous wrapper around [`Handler::handle`].
    ///
    /// Creates a current-thread tokio runtime internally. Called from inside
    /// an async context it returns an error output instead of blocking the
    /// caller's runtime.
    pub fn handle_sync(&self, job: &Job) -> JobOutput {
        if tokio::runtime::Handle::try_current().is_ok() {
            warn!(job_id = %job.id, "handle_sync called from within a tokio runtime");
            return JobOutput::error(
                "handle_sync cannot run inside an async runtime; use handle instead",
            );
        }
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt.block_on(self.handle(job)),
            Err(e) => JobOutput::error(format!("Failed to create tokio runtime: {e}")),
        }
    }

    async fn run(&self, job: &Job) -> Result<String, JobError> {
        let input = JobInput::from_job(job);
        let payload = input.require_pdf()?;
        let bytes = decode_pdf(payload)?;
        info!(job_id = %job.id, "Received PDF: {} bytes", bytes.len());

        // Dropped at the end of this function whatever the outcome, which
        // deletes the file.
        let staged = StagedPdf::write(&bytes, self.staging_dir.as_deref())?;
        drop(bytes);

        let converter = Arc::clone(&self.converter);
        let path = staged.to_path_buf();
        let task = tokio::spawn(async move { converter.convert(&path).await });
        // Declared after `staged` so the task is cancelled before the file goes.
        let _abort = AbortOnDrop(task.abort_handle());

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(JobError::TaskAborted("converter panicked".into())),
            Err(e) => Err(JobError::TaskAborted(e.to_string())),
        }
    }
}

/// Cancels the conversion task when the job future is dropped early.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
