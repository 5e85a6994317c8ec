//! Configuration types for the worker.
//!
//! * [`ConverterSettings`] — knobs forwarded to the VLM conversion pipeline.
//! * [`WorkerConfig`] — job-loop behaviour (mode, concurrency, polling).
//! * [`WebhookConfig`] — platform endpoints and credentials.
//!
//! `WorkerConfig` is built through [`WorkerConfigBuilder`], whose setters
//! clamp values into range and whose `build()` rejects combinations that
//! cannot work.

use crate::error::WorkerError;
use std::fmt;
use std::path::PathBuf;

/// Settings for the document converter.
///
/// The converter is created once per process from these settings and shared
/// by every job, so the provider and model are initialised only once.
#[derive(Debug, Clone, PartialEq)]
pub struct ConverterSettings {
    /// VLM model identifier. If `None`, the provider default is used.
    pub model: Option<String>,

    /// Provider name (e.g. "openai", "ollama"). If `None`, auto-detected
    /// from the environment.
    pub provider: Option<String>,

    /// Rendering DPI for page rasterisation. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Concurrent VLM calls per document. Default: 2.
    ///
    /// Kept low because the worker already runs several documents at once;
    /// total in-flight calls are roughly `concurrency × page_concurrency`.
    pub page_concurrency: usize,

    /// Maximum tokens the VLM may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Retries per page on a transient VLM failure. Default: 3.
    pub max_retries: u32,

    /// Per-VLM-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Custom system prompt. If `None`, the pipeline's built-in prompt.
    pub system_prompt: Option<String>,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            model: None,
            provider: None,
            dpi: 150,
            page_concurrency: 2,
            max_tokens: 4096,
            temperature: 0.1,
            max_retries: 3,
            api_timeout_secs: 60,
            system_prompt: None,
        }
    }
}

/// How the worker schedules jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Several jobs in flight, bounded by the concurrency modifier. (default)
    #[default]
    Concurrent,
    /// One job at a time.
    Sequential,
}

/// Job-loop configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub mode: Mode,

    /// Jobs held in flight in [`Mode::Concurrent`]. Default: 10.
    ///
    /// A 24 GB GPU comfortably holds ten instances of a small (~256M
    /// parameter) document model.
    pub concurrency: usize,

    /// Idle sleep between empty polls, in milliseconds. Default: 1000.
    pub poll_interval_ms: u64,

    /// Heartbeat period in milliseconds. Default: 10 000.
    pub ping_interval_ms: u64,

    /// Directory for staged PDFs. `None` means the system temp dir.
    pub staging_dir: Option<PathBuf>,

    pub converter: ConverterSettings,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            concurrency: 10,
            poll_interval_ms: 1000,
            ping_interval_ms: 10_000,
            staging_dir: None,
            converter: ConverterSettings::default(),
        }
    }
}

impl WorkerConfig {
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder {
            config: Self::default(),
        }
    }

    /// The concurrency the job loop starts from: 1 in sequential mode.
    pub fn effective_concurrency(&self) -> usize {
        match self.mode {
            Mode::Concurrent => self.concurrency,
            Mode::Sequential => 1,
        }
    }
}

/// Builder for [`WorkerConfig`].
#[derive(Debug)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn ping_interval_ms(mut self, ms: u64) -> Self {
        self.config.ping_interval_ms = ms;
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = Some(dir.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.converter.model = Some(model.into());
        self
    }

    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.config.converter.provider = Some(name.into());
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.converter.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn page_concurrency(mut self, n: usize) -> Self {
        self.config.converter.page_concurrency = n.max(1);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.converter.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.converter.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.converter.max_retries = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.converter.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.converter.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<WorkerConfig, WorkerError> {
        let c = &self.config;
        if c.poll_interval_ms == 0 {
            return Err(WorkerError::InvalidConfig(
                "Poll interval must be ≥ 1ms".into(),
            ));
        }
        if c.ping_interval_ms == 0 {
            return Err(WorkerError::InvalidConfig(
                "Ping interval must be ≥ 1ms".into(),
            ));
        }
        if c.converter.max_tokens == 0 {
            return Err(WorkerError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if let Some(ref dir) = c.staging_dir {
            if !dir.is_dir() {
                return Err(WorkerError::InvalidConfig(format!(
                    "Staging directory '{}' does not exist",
                    dir.display()
                )));
            }
        }
        Ok(self.config)
    }
}

/// Platform webhook endpoints.
///
/// URL templates follow the platform's conventions: `$ID` in
/// `get_job_url` is the worker id, `$ID` in `post_output_url` is the job id,
/// and `$RUNPOD_POD_ID` in `ping_url` is the worker id.
#[derive(Clone)]
pub struct WebhookConfig {
    pub get_job_url: String,
    pub post_output_url: String,
    pub ping_url: Option<String>,
    /// Sent verbatim in the `Authorization` header.
    pub api_key: Option<String>,
    pub worker_id: String,
    /// Per-request timeout in seconds. Default: 90.
    ///
    /// Job-take requests long-poll on the platform side, so this must exceed
    /// the platform's hold time.
    pub request_timeout_secs: u64,
}

impl WebhookConfig {
    pub fn new(
        get_job_url: impl Into<String>,
        post_output_url: impl Into<String>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            get_job_url: get_job_url.into(),
            post_output_url: post_output_url.into(),
            ping_url: None,
            api_key: None,
            worker_id: worker_id.into(),
            request_timeout_secs: 90,
        }
    }

    pub fn with_ping_url(mut self, url: impl Into<String>) -> Self {
        self.ping_url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("get_job_url", &self.get_job_url)
            .field("post_output_url", &self.post_output_url)
            .field("ping_url", &self.ping_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("worker_id", &self.worker_id)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}
