//! Relay stream to `text/event-stream` response.

use std::io;

use axum::{
    body::{Body, Bytes},
    http::{StatusCode, header},
    response::Response,
};
use futures::{Stream, StreamExt, future, stream};
use kilo_protocol::encode_frame;
use tracing::{error, warn};

use super::error::{ApiError, ApiResult};
use crate::relay::RelayStream;

/// Turn a relay stream into an SSE response.
///
/// The first item is awaited before the head is sent, so a run that fails
/// straight away is answered with an error status. Failures after that
/// abort the body; the client sees the connection close without `[DONE]`.
pub async fn sse_response(mut events: RelayStream) -> ApiResult<Response> {
    let first = match events.next().await {
        Some(Ok(event)) => event,
        Some(Err(err)) => return Err(err.into()),
        None => {
            return Err(ApiError::StreamInterrupted(
                "agent stream closed before any output".to_string(),
            ));
        }
    };

    let frames = stream::once(future::ready(Ok(first)))
        .chain(events)
        .map(|item| match item {
            Ok(event) => Ok(Bytes::from(encode_frame(&event))),
            Err(err) => {
                warn!("aborting event stream: {}", err);
                Err(io::Error::other(err.to_string()))
            }
        });

    build_sse_response(frames)
}

fn build_sse_response(
    frames: impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static,
) -> ApiResult<Response> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(frames))
        .map_err(|err| {
            error!("failed to build SSE response: {:?}", err);
            ApiError::internal("failed to build event stream")
        })
}
