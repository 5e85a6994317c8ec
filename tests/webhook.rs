//! Integration tests: the worker loop against a mock platform.
//!
//! An axum server plays the platform's job-take / job-done / ping webhooks;
//! a stub converter stands in for the VLM pipeline.

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::future::BoxFuture;
use pdf2md_worker::{
    Converter, Handler, JobError, JobSource, Mode, WebhookConfig, WebhookSource, Worker,
    WorkerConfig, WorkerError,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

const API_KEY: &str = "test-api-key";

struct Echo;

impl Converter for Echo {
    fn convert<'a>(&'a self, pdf: &'a Path) -> BoxFuture<'a, Result<String, JobError>> {
        Box::pin(async move {
            let bytes = tokio::fs::read(pdf)
                .await
                .map_err(|e| JobError::Conversion(e.to_string()))?;
            Ok(format!("# Converted\n\n{} bytes\n", bytes.len()))
        })
    }
}

/// Takes long enough for several heartbeats to fire mid-conversion.
struct Sluggish;

impl Converter for Sluggish {
    fn convert<'a>(&'a self, _pdf: &'a Path) -> BoxFuture<'a, Result<String, JobError>> {
        Box::pin(async {
            tokio::time::sleep(std::time::Duration::from_millis(150)).await;
            Ok("# Slow\n".to_string())
        })
    }
}

#[derive(Clone, Default)]
struct Platform {
    queue: Arc<Mutex<VecDeque<Value>>>,
    done: Arc<Mutex<HashMap<String, Value>>>,
    takes: Arc<Mutex<Vec<HashMap<String, String>>>>,
    pings: Arc<Mutex<Vec<String>>>,
    unauthorised: Arc<Mutex<usize>>,
    expected: usize,
    all_done: Arc<Notify>,
}

fn authorised(headers: &HeaderMap, state: &Platform) -> bool {
    let ok = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some(API_KEY);
    if !ok {
        *state.unauthorised.lock().unwrap() += 1;
    }
    ok
}

async fn job_take(
    State(state): State<Platform>,
    headers: HeaderMap,
    UrlPath(_worker): UrlPath<String>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if !authorised(&headers, &state) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.takes.lock().unwrap().push(q);
    match state.queue.lock().unwrap().pop_front() {
        Some(job) => Json(job).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn job_take_batch(
    State(state): State<Platform>,
    headers: HeaderMap,
    UrlPath(_worker): UrlPath<String>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if !authorised(&headers, &state) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let n: usize = q
        .get("batch_size")
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);
    state.takes.lock().unwrap().push(q);
    let mut queue = state.queue.lock().unwrap();
    let take = n.min(queue.len());
    if take == 0 {
        return StatusCode::NO_CONTENT.into_response();
    }
    let jobs: Vec<Value> = queue.drain(..take).collect();
    Json(Value::Array(jobs)).into_response()
}

async fn job_done(
    State(state): State<Platform>,
    headers: HeaderMap,
    UrlPath(job_id): UrlPath<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    if !authorised(&headers, &state) {
        return StatusCode::UNAUTHORIZED;
    }
    let mut done = state.done.lock().unwrap();
    done.insert(job_id, body);
    if done.len() == state.expected {
        state.all_done.notify_one();
    }
    StatusCode::OK
}

async fn ping(
    State(state): State<Platform>,
    Query(q): Query<HashMap<String, String>>,
) -> StatusCode {
    state
        .pings
        .lock()
        .unwrap()
        .push(q.get("job_id").cloned().unwrap_or_default());
    StatusCode::OK
}

/// Start the mock platform; `None` when sockets are not permitted here.
async fn spawn_platform(jobs: Vec<Value>) -> Option<(String, Platform)> {
    let state = Platform {
        expected: jobs.len(),
        queue: Arc::new(Mutex::new(jobs.into())),
        ..Default::default()
    };
    let app = Router::new()
        .route("/v2/ep/job-take/{worker}", get(job_take))
        .route("/v2/ep/job-take-batch/{worker}", get(job_take_batch))
        .route("/v2/ep/job-done/{job_id}", post(job_done))
        .route("/v2/ep/ping/{worker}", get(ping))
        .with_state(state.clone());

    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!("skipping webhook tests: local socket bind is not permitted");
            return None;
        }
        Err(err) => panic!("bind failed: {err}"),
    };
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Some((format!("http://{addr}/v2/ep"), state))
}

fn webhook_config(base: &str) -> WebhookConfig {
    WebhookConfig::new(
        format!("{base}/job-take/$ID"),
        format!("{base}/job-done/$ID"),
        "worker-1",
    )
    .with_ping_url(format!("{base}/ping/$RUNPOD_POD_ID"))
    .with_api_key(API_KEY)
}

fn worker(mode: Mode, concurrency: usize) -> Worker {
    worker_with(Arc::new(Echo), mode, concurrency)
}

fn worker_with(converter: Arc<dyn Converter>, mode: Mode, concurrency: usize) -> Worker {
    let config = WorkerConfig::builder()
        .mode(mode)
        .concurrency(concurrency)
        .poll_interval_ms(10)
        .ping_interval_ms(20)
        .build()
        .unwrap();
    Worker::new(Handler::new(converter), config)
}

#[tokio::test]
async fn worker_takes_converts_and_reports() {
    let jobs = vec![
        json!({ "id": "ok-1", "input": { "pdf_base64": "JVBERi0xLjQK" } }),
        json!({ "id": "missing", "input": { "other": true } }),
        json!({ "id": "ok-2", "input": { "pdf_base64": "JVBERi0xLjcK" } }),
    ];
    let Some((base, platform)) = spawn_platform(jobs).await else {
        return;
    };
    let source = Arc::new(WebhookSource::new(webhook_config(&base)).unwrap());

    let done = Arc::clone(&platform.all_done);
    let stats = worker(Mode::Concurrent, 3)
        .run(source, async move { done.notified().await })
        .await;

    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.failed, 1);

    let results = platform.done.lock().unwrap();
    assert_eq!(
        results["ok-1"],
        json!({ "output": { "markdown": "# Converted\n\n9 bytes\n" } })
    );
    assert_eq!(
        results["missing"],
        json!({ "error": "Invalid payload: Missing 'pdf_base64'." })
    );
    assert!(results.contains_key("ok-2"));
    assert_eq!(*platform.unauthorised.lock().unwrap(), 0);

    let takes = platform.takes.lock().unwrap();
    assert_eq!(takes[0].get("batch_size").map(String::as_str), Some("3"));
    assert_eq!(takes[0].get("job_in_progress").map(String::as_str), Some("0"));
}

#[tokio::test]
async fn sequential_worker_uses_single_job_take() {
    let jobs = vec![
        json!({ "id": "a", "input": { "pdf_base64": "JVBERi0xLjQK" } }),
        json!({ "id": "b", "input": { "pdf_base64": "JVBERi0xLjQK" } }),
    ];
    let Some((base, platform)) = spawn_platform(jobs).await else {
        return;
    };
    let source = Arc::new(WebhookSource::new(webhook_config(&base)).unwrap());

    let done = Arc::clone(&platform.all_done);
    let stats = worker(Mode::Sequential, 10)
        .run(source, async move { done.notified().await })
        .await;

    assert_eq!(stats.succeeded, 2);
    let takes = platform.takes.lock().unwrap();
    assert!(takes.iter().all(|q| !q.contains_key("batch_size")));
}

#[tokio::test]
async fn heartbeat_reaches_platform() {
    let Some((base, platform)) = spawn_platform(Vec::new()).await else {
        return;
    };
    let source = Arc::new(WebhookSource::new(webhook_config(&base)).unwrap());

    worker(Mode::Concurrent, 1)
        .run(
            source,
            tokio::time::sleep(std::time::Duration::from_millis(100)),
        )
        .await;

    assert!(!platform.pings.lock().unwrap().is_empty());
}

#[tokio::test]
async fn heartbeat_lists_jobs_in_progress() {
    let jobs = vec![json!({ "id": "long-1", "input": { "pdf_base64": "JVBERi0xLjQK" } })];
    let Some((base, platform)) = spawn_platform(jobs).await else {
        return;
    };
    let source = Arc::new(WebhookSource::new(webhook_config(&base)).unwrap());

    let done = Arc::clone(&platform.all_done);
    let stats = worker_with(Arc::new(Sluggish), Mode::Concurrent, 2)
        .run(source, async move { done.notified().await })
        .await;

    assert_eq!(stats.succeeded, 1);
    let pings = platform.pings.lock().unwrap();
    assert!(
        pings.iter().any(|ids| ids.split(',').any(|id| id == "long-1")),
        "pings: {pings:?}"
    );
}

#[tokio::test]
async fn wrong_api_key_is_an_http_error() {
    let Some((base, _platform)) = spawn_platform(Vec::new()).await else {
        return;
    };
    let config = WebhookConfig::new(
        format!("{base}/job-take/$ID"),
        format!("{base}/job-done/$ID"),
        "worker-1",
    )
    .with_api_key("wrong");
    let source = WebhookSource::new(config).unwrap();

    let err = source.fetch(1, false).await.unwrap_err();
    assert!(
        matches!(err, WorkerError::Http { status: 401, .. }),
        "got: {err:?}"
    );
}

#[tokio::test]
async fn empty_queue_yields_no_jobs() {
    let Some((base, _platform)) = spawn_platform(Vec::new()).await else {
        return;
    };
    let source = WebhookSource::new(webhook_config(&base)).unwrap();
    assert!(source.fetch(1, false).await.unwrap().is_empty());
    assert!(source.fetch(5, true).await.unwrap().is_empty());
}
