//! Job data model: what the platform delivers and what the worker returns.

use crate::error::JobError;
use serde::{Deserialize, Serialize};

/// A job as delivered by the serverless platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Platform-assigned job identifier, echoed back when reporting.
    pub id: String,
    /// Caller-supplied payload. Only [`JobInput`]'s fields are read.
    #[serde(default)]
    pub input: serde_json::Value,
}

impl Job {
    pub fn new(id: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            input,
        }
    }
}

/// The fields this worker reads from [`Job::input`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JobInput {
    /// The PDF document, base64-encoded.
    #[serde(default)]
    pub pdf_base64: Option<String>,
}

impl JobInput {
    /// Extract the input fields from a job.
    ///
    /// A non-object or otherwise malformed `input` yields an empty
    /// `JobInput`, which the handler reports as a missing payload.
    pub fn from_job(job: &Job) -> Self {
        serde_json::from_value(job.input.clone()).unwrap_or_default()
    }

    /// The base64 payload, or [`JobError::MissingPayload`] when absent or empty.
    pub fn require_pdf(&self) -> Result<&str, JobError> {
        match self.pdf_base64.as_deref() {
            Some(s) if !s.trim().is_empty() => Ok(s),
            _ => Err(JobError::MissingPayload),
        }
    }
}

/// The result of one job: exactly one of `markdown` or `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobOutput {
    Markdown { markdown: String },
    Error { error: String },
}

impl JobOutput {
    pub fn markdown(markdown: impl Into<String>) -> Self {
        JobOutput::Markdown {
            markdown: markdown.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        JobOutput::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, JobOutput::Error { .. })
    }
}

impl From<Result<String, JobError>> for JobOutput {
    fn from(result: Result<String, JobError>) -> Self {
        match result {
            Ok(md) => JobOutput::markdown(md),
            Err(e) => JobOutput::error(e.to_string()),
        }
    }
}
