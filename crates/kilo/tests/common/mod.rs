//! Test utilities and common setup.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, header},
};
use futures::stream;
use kilo::agent::{AgentError, AgentEvent, AgentEventStream, AgentInvoker, AgentRunner, AgentStreamer};
use kilo::api::{self, AppState, FileIndexClient};
use kilo_protocol::Mode;
use serde_json::Value;
use tokio::net::TcpListener;
use tower::ServiceExt;

/// Address nothing listens on.
pub const UNREACHABLE: &str = "http://127.0.0.1:1";

/// One scripted streaming step.
#[derive(Debug, Clone)]
pub enum Step {
    Chunk(&'static str),
    /// A chunk carrying the mode the stream was opened with.
    EchoMode,
    Done,
    /// Fail with `AgentError::Failed`.
    Fail(&'static str),
    /// Fail with `AgentError::StreamInterrupted`.
    Interrupt,
    /// Never produce another event.
    Hang,
}

/// In-process agent capability with a canned reply and a scripted stream.
pub struct FakeAgent {
    reply: Mutex<Result<Value, String>>,
    unavailable: AtomicBool,
    script: Vec<Step>,
    pub calls: Mutex<Vec<(Mode, Value)>>,
    pub streams_opened: AtomicUsize,
    pub streams_released: Arc<AtomicUsize>,
}

impl FakeAgent {
    pub fn new() -> Self {
        Self {
            reply: Mutex::new(Ok(Value::Null)),
            unavailable: AtomicBool::new(false),
            script: vec![Step::Done],
            calls: Mutex::new(Vec::new()),
            streams_opened: AtomicUsize::new(0),
            streams_released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn replying(self, reply: Value) -> Self {
        *self.reply.lock().unwrap() = Ok(reply);
        self
    }

    pub fn failing(self, message: &str) -> Self {
        *self.reply.lock().unwrap() = Err(message.to_string());
        self
    }

    /// Every call fails as if the backend were down.
    pub fn unavailable(self) -> Self {
        self.unavailable.store(true, Ordering::SeqCst);
        self
    }

    pub fn streaming(mut self, script: Vec<Step>) -> Self {
        self.script = script;
        self
    }

    pub fn calls(&self) -> Vec<(Mode, Value)> {
        self.calls.lock().unwrap().clone()
    }

    fn check_available(&self) -> Result<(), AgentError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AgentError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AgentRunner for FakeAgent {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn run(&self, mode: Mode, input: Value) -> Result<Value, AgentError> {
        self.check_available()?;
        self.calls.lock().unwrap().push((mode, input));
        self.reply
            .lock()
            .unwrap()
            .clone()
            .map_err(AgentError::Failed)
    }
}

/// Counts a release when the stream holding it is dropped.
struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AgentStreamer for FakeAgent {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn run_stream(&self, mode: Mode, input: Value) -> Result<AgentEventStream, AgentError> {
        self.check_available()?;
        self.calls.lock().unwrap().push((mode, input));
        self.streams_opened.fetch_add(1, Ordering::SeqCst);

        let steps: VecDeque<Step> = self.script.iter().cloned().collect();
        let guard = ReleaseGuard(self.streams_released.clone());

        Ok(Box::pin(stream::unfold(
            (steps, guard),
            move |(mut steps, guard)| async move {
                let event = match steps.pop_front()? {
                    Step::Chunk(text) => Ok(AgentEvent::Chunk(text.to_string())),
                    Step::EchoMode => Ok(AgentEvent::Chunk(mode.to_string())),
                    Step::Done => Ok(AgentEvent::Done),
                    Step::Fail(message) => Err(AgentError::Failed(message.to_string())),
                    Step::Interrupt => Err(AgentError::StreamInterrupted),
                    Step::Hang => std::future::pending().await,
                };
                Some((event, (steps, guard)))
            },
        )))
    }
}

/// Router backed by `agent`, with the file index pointed at `files_url`.
pub fn test_app_with_files(agent: Arc<FakeAgent>, files_url: &str) -> Router {
    let invoker = AgentInvoker::new(agent.clone(), agent);
    let files = FileIndexClient::new(files_url).unwrap();
    api::create_router(AppState::new(invoker, files))
}

pub fn test_app(agent: Arc<FakeAgent>) -> Router {
    test_app_with_files(agent, UNREACHABLE)
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub async fn post_json(app: Router, uri: &str, body: &Value) -> Response<Body> {
    post_raw(app, uri, serde_json::to_string(body).unwrap()).await
}

pub async fn post_raw(app: Router, uri: &str, body: impl Into<Body>) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .uri(uri)
            .method(Method::POST)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}
