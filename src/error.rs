//! Error types for the pdf2md worker.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`JobError`] — **Per-job**: this one job cannot be converted (bad
//!   payload, not a PDF, the pipeline failed). It never stops the worker;
//!   its `Display` text becomes the `{"error": ...}` output reported back to
//!   the platform.
//!
//! * [`WorkerError`] — **Worker-level**: configuration is invalid or the
//!   platform transport failed. Returned as `Err(WorkerError)` from the
//!   worker and webhook APIs.

use std::path::PathBuf;
use thiserror::Error;

/// Message returned when a job carries no `pdf_base64` field.
pub const MISSING_PAYLOAD_MESSAGE: &str = "Invalid payload: Missing 'pdf_base64'.";

/// A failure confined to a single job.
///
/// The handler turns every variant into a `{"error": "<Display>"}` output,
/// so messages are written for the caller who submitted the job.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    // ── Payload errors ────────────────────────────────────────────────────
    /// The job input has no (or an empty) `pdf_base64` field.
    #[error("Invalid payload: Missing 'pdf_base64'.")]
    MissingPayload,

    /// `pdf_base64` is not valid base64.
    #[error("Invalid payload: 'pdf_base64' is not valid base64: {detail}")]
    InvalidBase64 { detail: String },

    /// The decoded bytes are not a PDF.
    #[error("Invalid payload: decoded data is not a PDF (first bytes: {magic:?})")]
    NotAPdf { magic: Vec<u8> },

    // ── Staging errors ────────────────────────────────────────────────────
    /// The temporary PDF file could not be created or written.
    #[error("Failed to stage PDF in '{dir}': {detail}")]
    Staging { dir: PathBuf, detail: String },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The conversion pipeline returned an error.
    #[error("{0}")]
    Conversion(String),

    /// The conversion task panicked or was cancelled.
    #[error("Conversion task aborted: {0}")]
    TaskAborted(String),
}

/// All worker-level errors.
#[derive(Debug, Error)]
pub enum WorkerError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Transport errors ──────────────────────────────────────────────────
    /// The request never got a response (DNS, connect, timeout, TLS).
    #[error("Request to '{url}' failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The platform answered with a non-success status code.
    #[error("Platform returned HTTP {status} for '{url}'")]
    Http { status: u16, url: String },

    /// The platform sent a body that is not a job (or list of jobs).
    #[error("Malformed job payload from '{url}': {detail}")]
    MalformedJob { url: String, detail: String },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// The PDFium engine library could not be made available.
    #[error(
        "Failed to prepare the PDFium engine: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy, or check\n\
that the worker can reach the internet on first start.\n"
    )]
    EngineUnavailable(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
