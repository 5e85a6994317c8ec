//! # pdf2md-worker
//!
//! A serverless job worker that turns base64-encoded PDFs into Markdown.
//!
//! The heavy lifting (rasterising pages, asking a vision LLM to read them,
//! polishing the Markdown) is done by the `edgequake-pdf2md` pipeline. This
//! crate is everything around it: taking jobs from the platform, staging
//! each payload as a temporary file, running conversions concurrently and
//! reporting results.
//!
//! ## Job flow
//!
//! ```text
//! platform ──job──▶ worker ─┬─ 1. Decode   base64 → bytes, check %PDF magic
//!                           ├─ 2. Stage    write a temp *.pdf (deleted on drop)
//!                           ├─ 3. Convert  VLM pipeline on its own task
//!                           ├─ 4. Output   {"markdown": …} or {"error": …}
//!                           └─ 5. Report   job-done webhook
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2md_worker::{Handler, Job, VlmConverter, WorkerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WorkerConfig::default();
//!     let converter = VlmConverter::new(&config.converter)?;
//!     let handler = Handler::new(Arc::new(converter));
//!
//!     let job: Job = serde_json::from_str(
//!         r#"{"id": "local", "input": {"pdf_base64": "JVBERi0xLjQK..."}}"#,
//!     )?;
//!     let output = handler.handle(&job).await;
//!     println!("{}", serde_json::to_string(&output)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2md-worker` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod converter;
pub mod error;
pub mod handler;
pub mod job;
pub mod payload;
pub mod webhook;
pub mod worker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConverterSettings, Mode, WebhookConfig, WorkerConfig, WorkerConfigBuilder};
pub use converter::{ensure_engine, Converter, VlmConverter};
pub use error::{JobError, WorkerError, MISSING_PAYLOAD_MESSAGE};
pub use handler::Handler;
pub use job::{Job, JobInput, JobOutput};
pub use payload::{decode_pdf, StagedPdf};
pub use webhook::WebhookSource;
pub use worker::{fixed, run_local, ConcurrencyModifier, JobSource, RunStats, Worker};
