//! HTTP handlers for the gateway routes.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{Uri, header},
    response::{IntoResponse, Response},
};
use kilo_protocol::{ChatMeta, ChatRequest, ChatResponse, ExecutionRequest, Plan, PlanRequest};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use super::stream::sse_response;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub transport: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        transport: state.transport(),
    })
}

/// Single-turn blocking chat.
#[instrument(skip_all)]
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatResponse>> {
    let Json(request) = payload?;
    if request.messages.is_empty() {
        return Err(ApiError::invalid_request("messages must not be empty"));
    }

    let mut input = Map::new();
    input.insert("messages".into(), to_json(&request.messages)?);
    if let Some(context) = &request.project_context {
        input.insert("projectContext".into(), to_json(context)?);
    }

    let result = state.invoker.invoke(request.mode, Value::Object(input)).await?;
    Ok(Json(ChatResponse {
        content: reply_text(result),
        meta: ChatMeta { mode: request.mode },
    }))
}

/// Stream a reply to chat history.
#[instrument(skip_all)]
pub async fn chat_stream(
    State(state): State<AppState>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;
    let events = state.relay.execute(request).await?;
    sse_response(events).await
}

/// Execute a confirmed plan.
#[instrument(skip_all)]
pub async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;
    debug!(
        mode = %request.mode,
        steps = request.plan.as_ref().map_or(0, Vec::len),
        "executing plan"
    );
    let events = state.relay.execute(request).await?;
    sse_response(events).await
}

#[instrument(skip_all)]
pub async fn plan(
    State(state): State<AppState>,
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> ApiResult<Json<Plan>> {
    let Json(request) = payload?;
    if request.messages.is_empty() {
        return Err(ApiError::invalid_request("messages must not be empty"));
    }
    Ok(Json(state.plans.plan(request.messages).await?))
}

/// Forward to the file-index capability.
#[instrument(skip_all)]
pub async fn index_files(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = payload?;
    let (status, body) = state.files.index(body).await?;
    Ok((status, [(header::CONTENT_TYPE, "application/json")], body))
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(uri.path().to_string())
}

fn to_json<T: Serialize>(value: &T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|err| ApiError::internal(err.to_string()))
}

/// Text of a blocking agent reply: its `content` string, the reply itself
/// when it is a string, or else its JSON text.
fn reply_text(result: Value) -> String {
    match result {
        Value::String(text) => text,
        Value::Object(mut fields) => match fields.remove("content") {
            Some(Value::String(text)) => text,
            Some(other) => {
                fields.insert("content".into(), other);
                Value::Object(fields).to_string()
            }
            None => Value::Object(fields).to_string(),
        },
        other => other.to_string(),
    }
}
