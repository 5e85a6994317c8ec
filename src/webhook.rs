//! HTTP transport to the serverless platform's worker webhooks.
//!
//! Three endpoints, all authenticated with the raw API key in the
//! `Authorization` header:
//!
//! | Call      | Request                                              | Response                     |
//! |-----------|------------------------------------------------------|------------------------------|
//! | fetch     | `GET  job-take/{worker}?job_in_progress=0 or 1`      | job, `[job…]`, 204 or empty  |
//! | report    | `POST job-done/{job}?isStream=false` + JSON body     | any 2xx                      |
//! | heartbeat | `GET  ping/{worker}?job_id=a,b,c`                    | any 2xx                      |
//!
//! When more than one job is wanted, the batch variant of job-take is used
//! (`job-take-batch/…&batch_size=N`).

use crate::config::WebhookConfig;
use crate::error::WorkerError;
use crate::job::{Job, JobOutput};
use crate::worker::JobSource;
use futures::future::BoxFuture;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, trace};

/// [`JobSource`] backed by the platform webhooks.
#[derive(Debug, Clone)]
pub struct WebhookSource {
    client: Client,
    config: WebhookConfig,
}

impl WebhookSource {
    pub fn new(config: WebhookConfig) -> Result<Self, WorkerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| WorkerError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// The job-take URL for a request of `max` jobs.
    pub fn job_take_url(&self, max: usize) -> String {
        let url = self.config.get_job_url.replace("$ID", &self.config.worker_id);
        if max > 1 {
            url.replacen("/job-take/", "/job-take-batch/", 1)
        } else {
            url
        }
    }

    pub fn job_done_url(&self, job_id: &str) -> String {
        self.config.post_output_url.replace("$ID", job_id)
    }

    pub fn ping_url(&self) -> Option<String> {
        self.config
            .ping_url
            .as_ref()
            .map(|u| u.replace("$RUNPOD_POD_ID", &self.config.worker_id))
    }

    fn authorised(&self, req: RequestBuilder) -> RequestBuilder {
        match self.config.api_key {
            Some(ref key) => req.header(AUTHORIZATION, key),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder, url: &str) -> Result<Response, WorkerError> {
        let response = self
            .authorised(req)
            .send()
            .await
            .map_err(|e| WorkerError::Request {
                url: url.to_string(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(WorkerError::Http {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn take_jobs(&self, max: usize, in_progress: bool) -> Result<Vec<Job>, WorkerError> {
        let url = self.job_take_url(max);
        let mut query = vec![("job_in_progress", if in_progress { "1" } else { "0" }.to_string())];
        if max > 1 {
            query.push(("batch_size", max.to_string()));
        }

        let response = self.send(self.client.get(&url).query(&query), &url).await?;
        if response.status() == StatusCode::NO_CONTENT {
            trace!("No job available");
            return Ok(Vec::new());
        }

        let body = response.bytes().await.map_err(|e| WorkerError::Request {
            url: url.clone(),
            source: e,
        })?;
        let jobs = parse_jobs(&body).map_err(|detail| WorkerError::MalformedJob {
            url: url.clone(),
            detail,
        })?;
        if !jobs.is_empty() {
            debug!("Took {} job(s)", jobs.len());
        }
        Ok(jobs)
    }

    async fn post_output(&self, job_id: &str, output: &JobOutput) -> Result<(), WorkerError> {
        let url = self.job_done_url(job_id);
        let req = self
            .client
            .post(&url)
            .query(&[("isStream", "false")])
            .json(&result_body(output));
        self.send(req, &url).await?;
        debug!(job_id, "Result delivered");
        Ok(())
    }

    async fn ping(&self, in_progress: &[String]) -> Result<(), WorkerError> {
        let Some(url) = self.ping_url() else {
            return Ok(());
        };
        let req = self
            .client
            .get(&url)
            .query(&[("job_id", in_progress.join(","))]);
        self.send(req, &url).await?;
        Ok(())
    }
}

impl JobSource for WebhookSource {
    fn fetch(&self, max: usize, in_progress: bool) -> BoxFuture<'_, Result<Vec<Job>, WorkerError>> {
        Box::pin(self.take_jobs(max, in_progress))
    }

    fn report<'a>(
        &'a self,
        job_id: &'a str,
        output: &'a JobOutput,
    ) -> BoxFuture<'a, Result<(), WorkerError>> {
        Box::pin(self.post_output(job_id, output))
    }

    fn heartbeat<'a>(&'a self, in_progress: &'a [String]) -> BoxFuture<'a, Result<(), WorkerError>> {
        Box::pin(self.ping(in_progress))
    }
}

/// Parse a job-take response body: empty, `null`, one job or an array of jobs.
pub fn parse_jobs(body: &[u8]) -> Result<Vec<Job>, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(|e| e.to_string()))
            .collect(),
        obj @ Value::Object(_) => serde_json::from_value(obj)
            .map(|job| vec![job])
            .map_err(|e| e.to_string()),
        other => Err(format!("expected a job object or array, got {other}")),
    }
}

/// The job-done body: `{"output": {...}}` on success, `{"error": "..."}` on failure.
pub fn result_body(output: &JobOutput) -> Value {
    match output {
        JobOutput::Error { error } => json!({ "error": error }),
        ok => json!({ "output": ok }),
    }
}
