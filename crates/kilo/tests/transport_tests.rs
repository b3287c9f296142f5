//! Agent transports against real local endpoints: the HTTP agent service,
//! the process bridge and the `kilo-bridge` binary.

use axum::{
    Json, Router,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::post,
};
use futures::StreamExt;
use kilo::agent::{AgentError, AgentEvent, AgentRunner, AgentStreamer, HttpAgent};
use kilo_protocol::Mode;
use serde_json::{Value, json};

mod common;
use common::{UNREACHABLE, spawn_server};

const SSE: [(header::HeaderName, &str); 1] = [(header::CONTENT_TYPE, "text/event-stream")];

/// Stub agent service: `/agent/run` echoes the request, `/agent/stream`
/// streams `frames` verbatim.
async fn agent_service(frames: &'static str) -> String {
    let router = Router::new()
        .route(
            "/agent/run",
            post(|Json(body): Json<Value>| async move {
                if body["input"] == "fail" {
                    return (StatusCode::INTERNAL_SERVER_ERROR, "model crashed").into_response();
                }
                if body["input"] == "busy" {
                    return (StatusCode::SERVICE_UNAVAILABLE, "overloaded").into_response();
                }
                Json(json!({"content": "ok", "echo": body})).into_response()
            }),
        )
        .route("/agent/stream", post(move || async move { (SSE, frames) }));
    spawn_server(router).await
}

#[tokio::test]
async fn http_agent_runs_and_echoes_request() {
    let url = agent_service("").await;
    let agent = HttpAgent::new(&url).unwrap();

    let result = agent.run(Mode::Debugger, json!({"messages": []})).await.unwrap();
    assert_eq!(result["content"], "ok");
    assert_eq!(result["echo"], json!({"mode": "debugger", "input": {"messages": []}}));
}

#[tokio::test]
async fn http_agent_maps_error_statuses() {
    let url = agent_service("").await;
    let agent = HttpAgent::new(&url).unwrap();

    let err = agent.run(Mode::Coder, json!("fail")).await.unwrap_err();
    assert!(matches!(err, AgentError::Failed(ref msg) if msg.contains("model crashed")), "{err}");

    let err = agent.run(Mode::Coder, json!("busy")).await.unwrap_err();
    assert!(matches!(err, AgentError::Unavailable(_)), "{err}");
}

#[tokio::test]
async fn http_agent_unreachable_is_unavailable() {
    let agent = HttpAgent::new(UNREACHABLE).unwrap();
    let err = agent.run(Mode::Coder, Value::Null).await.unwrap_err();
    assert!(matches!(err, AgentError::Unavailable(_)));

    let err = agent.run_stream(Mode::Coder, Value::Null).await.err().unwrap();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn http_agent_streams_tokens_until_done() {
    let url = agent_service(
        "data: {\"delta\":\"Hel\"}\n\ndata: {\"delta\":\"lo\"}\n\n: keep-alive\n\ndata: plain text\n\ndata: [DONE]\n\ndata: ignored\n\n",
    )
    .await;
    let agent = HttpAgent::new(&url).unwrap();

    let events: Vec<AgentEvent> = agent
        .run_stream(Mode::Coder, json!({"plan": ["x"]}))
        .await
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(
        events,
        vec![
            AgentEvent::Chunk("Hel".into()),
            AgentEvent::Chunk("lo".into()),
            AgentEvent::Chunk("plain text".into()),
            AgentEvent::Done,
        ]
    );
}

#[tokio::test]
async fn http_agent_stream_without_done_is_interrupted() {
    let url = agent_service("data: partial\n\n").await;
    let agent = HttpAgent::new(&url).unwrap();

    let events: Vec<_> = agent
        .run_stream(Mode::Coder, Value::Null)
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].as_ref().unwrap(), &AgentEvent::Chunk("partial".into()));
    assert!(matches!(events[1], Err(AgentError::StreamInterrupted)));
}

#[cfg(unix)]
mod bridge {
    use super::*;
    use std::sync::Arc;

    use kilo::bridge::{ProcessBridge, ProcessBridgeConfig};
    use tokio::process::Command;

    const BRIDGE_BIN: &str = env!("CARGO_BIN_EXE_kilo-bridge");

    fn input_file(body: &Value) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), body.to_string()).unwrap();
        file
    }

    #[tokio::test]
    async fn bridge_binary_prints_agent_result() {
        let url = agent_service("").await;
        let file = input_file(&json!({"mode": "coder", "input": "add a test"}));

        let output = Command::new(BRIDGE_BIN)
            .arg("--backend-url")
            .arg(&url)
            .arg(file.path())
            .output()
            .await
            .unwrap();

        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        let result: Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(result["content"], "ok");
        assert_eq!(result["echo"], json!({"mode": "coder", "input": "add a test"}));
    }

    #[tokio::test]
    async fn bridge_binary_fails_on_missing_file() {
        let output = Command::new(BRIDGE_BIN)
            .arg("--backend-url")
            .arg(UNREACHABLE)
            .arg("/nonexistent/kilo-input.json")
            .output()
            .await
            .unwrap();

        assert!(!output.status.success());
        assert!(output.stdout.is_empty());
        assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
    }

    #[tokio::test]
    async fn bridge_binary_requires_input_path() {
        let output = Command::new(BRIDGE_BIN)
            .arg("--backend-url")
            .arg(UNREACHABLE)
            .output()
            .await
            .unwrap();

        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("Missing input path"));
    }

    #[tokio::test]
    async fn bridge_binary_reports_agent_failure() {
        let url = agent_service("").await;
        let file = input_file(&json!({"mode": "coder", "input": "fail"}));

        let output = Command::new(BRIDGE_BIN)
            .arg("--backend-url")
            .arg(&url)
            .arg(file.path())
            .output()
            .await
            .unwrap();

        assert!(!output.status.success());
        assert!(output.stdout.is_empty());
        assert!(String::from_utf8_lossy(&output.stderr).contains("Agent error"));
    }

    #[tokio::test]
    async fn process_bridge_drives_bridge_binary() {
        let url = agent_service("").await;
        let bridge = ProcessBridge::new(ProcessBridgeConfig {
            program: BRIDGE_BIN.into(),
            args: vec!["--backend-url".into(), url],
            ..Default::default()
        });

        let result = bridge.run(Mode::Ask, json!("why?")).await.unwrap();
        assert_eq!(result["echo"], json!({"mode": "ask", "input": "why?"}));
    }

    #[tokio::test]
    async fn concurrent_bridge_calls_do_not_share_files() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Arc::new(ProcessBridge::new(ProcessBridgeConfig {
            program: "cat".into(),
            temp_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        }));

        let calls = (0..8).map(|i| {
            let bridge = bridge.clone();
            let mode = if i % 2 == 0 { Mode::Coder } else { Mode::Debugger };
            async move { (i, mode, bridge.call(mode, json!({"call": i})).await.unwrap()) }
        });

        for (i, mode, result) in futures::future::join_all(calls).await {
            assert_eq!(result, json!({"mode": mode, "input": {"call": i}}));
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
