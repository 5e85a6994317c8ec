//! CLI binary for pdf2md-worker.
//!
//! A thin shim over the library crate that maps CLI flags and platform
//! environment variables to `WorkerConfig` / `WebhookConfig`, then either
//! runs a single local test job or serves the platform until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use pdf2md_worker::{
    ensure_engine, run_local, Handler, Job, Mode, VlmConverter, WebhookConfig, WebhookSource,
    Worker, WorkerConfig,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// File picked up in local mode when `--test-input` is not given.
const TEST_INPUT_FILE: &str = "test_input.json";

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve the platform (webhook URLs come from the environment)
  pdf2md-worker

  # One local job, inline
  pdf2md-worker --test-input '{"input": {"pdf_base64": "JVBERi0xLjQK..."}}'

  # One local job from ./test_input.json
  pdf2md-worker

  # One job at a time
  pdf2md-worker --mode sequential

JOB FORMAT:
  input   {"pdf_base64": "<base64 PDF>"}
  output  {"markdown": "..."}  or  {"error": "..."}

ENVIRONMENT VARIABLES:
  RUNPOD_WEBHOOK_GET_JOB      Job-take URL ($ID = worker id). Unset → local mode
  RUNPOD_WEBHOOK_POST_OUTPUT  Job-done URL ($ID = job id)
  RUNPOD_WEBHOOK_PING         Heartbeat URL ($RUNPOD_POD_ID = worker id)
  RUNPOD_AI_API_KEY           Sent in the Authorization header
  RUNPOD_POD_ID               Worker id
  RUNPOD_PING_INTERVAL        Heartbeat period in ms (default 10000)
  OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY   VLM provider keys
  PDFIUM_LIB_PATH             Path to an existing libpdfium — skips auto-download
"#;

/// Serverless worker: base64 PDF in, Markdown out.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2md-worker",
    version,
    about = "Serverless job worker converting base64 PDFs to Markdown with a Vision LLM",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Job scheduling: concurrent or sequential.
    #[arg(long, env = "PDF2MD_WORKER_MODE", value_enum, default_value = "concurrent")]
    mode: ModeArg,

    /// Jobs held in flight in concurrent mode.
    #[arg(short, long, env = "PDF2MD_WORKER_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// VLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// VLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2MD_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Concurrent VLM calls per document.
    #[arg(long, env = "PDF2MD_PAGE_CONCURRENCY", default_value_t = 2)]
    page_concurrency: usize,

    /// Max LLM output tokens per page.
    #[arg(long, env = "PDF2MD_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2MD_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per page on LLM failure.
    #[arg(long, env = "PDF2MD_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-page LLM call timeout in seconds.
    #[arg(long, env = "PDF2MD_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDF2MD_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Directory for staged PDFs (default: system temp dir).
    #[arg(long, env = "PDF2MD_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// Idle delay between empty job polls, in milliseconds.
    #[arg(long, env = "PDF2MD_POLL_INTERVAL", default_value_t = 1000)]
    poll_interval: u64,

    /// Run one job locally from this JSON (`{"input": {...}}`) and exit.
    #[arg(long, alias = "test_input")]
    test_input: Option<String>,

    #[arg(long, env = "RUNPOD_WEBHOOK_GET_JOB", hide = true)]
    get_job_url: Option<String>,

    #[arg(long, env = "RUNPOD_WEBHOOK_POST_OUTPUT", hide = true)]
    post_output_url: Option<String>,

    #[arg(long, env = "RUNPOD_WEBHOOK_PING", hide = true)]
    ping_url: Option<String>,

    #[arg(long, env = "RUNPOD_AI_API_KEY", hide = true, hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "RUNPOD_POD_ID", hide = true, default_value = "local-worker")]
    worker_id: String,

    #[arg(long, env = "RUNPOD_PING_INTERVAL", hide = true, default_value_t = 10_000)]
    ping_interval: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2MD_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ModeArg {
    Concurrent,
    Sequential,
}

impl From<ModeArg> for Mode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Concurrent => Mode::Concurrent,
            ModeArg::Sequential => Mode::Sequential,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config & converter (once per process) ──────────────────────
    let config = build_config(&cli).await?;
    ensure_engine().await.context("PDFium engine unavailable")?;
    let converter = VlmConverter::new(&config.converter).context("Invalid converter settings")?;
    let handler = Handler::new(Arc::new(converter)).with_staging_dir(config.staging_dir.clone());

    // ── Local mode ───────────────────────────────────────────────────────
    if cli.test_input.is_some() || cli.get_job_url.is_none() {
        let job = load_local_job(cli.test_input.as_deref(), Path::new(TEST_INPUT_FILE)).await?;
        let output = run_local(&handler, &job).await;
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
        return Ok(());
    }

    // ── Platform mode ────────────────────────────────────────────────────
    let webhook = build_webhook(&cli)?;
    info!("Serving platform as worker '{}'", webhook.worker_id);
    let source = Arc::new(WebhookSource::new(webhook).context("Failed to build webhook client")?);

    let worker = Worker::new(handler, config);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let stats = worker.run(source, shutdown).await;
    info!(
        "Processed {} jobs ({} failed)",
        stats.succeeded + stats.failed,
        stats.failed
    );

    Ok(())
}

/// Map CLI args to `WorkerConfig`.
async fn build_config(cli: &Cli) -> Result<WorkerConfig> {
    let mut builder = WorkerConfig::builder()
        .mode(cli.mode.clone().into())
        .concurrency(cli.concurrency)
        .dpi(cli.dpi)
        .page_concurrency(cli.page_concurrency)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .poll_interval_ms(cli.poll_interval)
        .ping_interval_ms(cli.ping_interval);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider(provider);
    }
    if let Some(ref dir) = cli.staging_dir {
        builder = builder.staging_dir(dir);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

/// Map the platform environment to `WebhookConfig`.
fn build_webhook(cli: &Cli) -> Result<WebhookConfig> {
    let get_job = cli
        .get_job_url
        .clone()
        .context("RUNPOD_WEBHOOK_GET_JOB is not set")?;
    let post_output = cli
        .post_output_url
        .clone()
        .context("RUNPOD_WEBHOOK_POST_OUTPUT is not set")?;

    let mut webhook = WebhookConfig::new(get_job, post_output, cli.worker_id.clone());
    if let Some(ref ping) = cli.ping_url {
        webhook = webhook.with_ping_url(ping);
    }
    match cli.api_key {
        Some(ref key) => webhook = webhook.with_api_key(key),
        None => warn!("RUNPOD_AI_API_KEY is not set; requests will be unauthenticated"),
    }
    Ok(webhook)
}

/// Load the local test job from `--test-input` or the fallback file.
///
/// Accepts `{"input": {...}}` (id optional) or a full job with `id`.
async fn load_local_job(inline: Option<&str>, fallback: &Path) -> Result<Job> {
    let raw = match inline {
        Some(s) => s.to_string(),
        None => tokio::fs::read_to_string(fallback).await.with_context(|| {
            format!(
                "No webhook configured and no test input: pass --test-input or create {}",
                fallback.display()
            )
        })?,
    };

    let mut value: serde_json::Value =
        serde_json::from_str(&raw).context("Test input is not valid JSON")?;
    if let Some(obj) = value.as_object_mut() {
        obj.entry("id")
            .or_insert_with(|| serde_json::Value::String("local_test".into()));
    }
    serde_json::from_value(value).context("Test input is not a job ({\"input\": {...}})")
}
