//! HTTP transport.
//!
//! `/cgi-bin/sendmsg.lua` keeps the path and answer format of the vendor
//! bridge so existing clients work unchanged.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::{CONNECTION, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::Value;
use stovelink_core::{BackupOutcome, BridgeStatus, ResultEnvelope};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::bridge::BridgeHandle;
use crate::error::ApiError;

pub const SENDMSG_PATH: &str = "/cgi-bin/sendmsg.lua";

/// Content type of every envelope answer.
pub const ENVELOPE_CONTENT_TYPE: &str = "text/json";

pub fn router(handle: BridgeHandle) -> Router {
    Router::new()
        .route(SENDMSG_PATH, get(sendmsg_get).post(sendmsg_post))
        .route("/events", get(event_stream))
        .route("/status", get(status))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(handle)
}

#[derive(Debug, Default, Deserialize)]
pub struct SendMsgQuery {
    #[serde(default)]
    pub cmd: String,
}

/// `GET /cgi-bin/sendmsg.lua?cmd=...`. Backups are only reachable here.
async fn sendmsg_get(
    State(handle): State<BridgeHandle>,
    Query(query): Query<SendMsgQuery>,
) -> Result<Response, ApiError> {
    if let Some(outcome) = handle.backup(query.cmd.as_str()).await? {
        return Ok(backup_response(outcome));
    }
    let envelope = handle.execute(query.cmd, false).await?;
    Ok(envelope_response(&envelope))
}

/// `POST /cgi-bin/sendmsg.lua` with `{"command": "..."}`.
async fn sendmsg_post(
    State(handle): State<BridgeHandle>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let envelope = handle.execute(command_from_body(&body), false).await?;
    Ok(envelope_response(&envelope))
}

/// Extract `command` from a JSON body. Anything unusable yields an empty
/// command, which the engine answers as unknown.
pub fn command_from_body(body: &[u8]) -> String {
    match serde_json::from_slice::<Value>(body) {
        Ok(doc) => match doc.get("command") {
            Some(Value::String(cmd)) => cmd.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        },
        Err(e) => {
            tracing::debug!(category = "http", error = %e, "Malformed sendmsg body");
            String::new()
        }
    }
}

fn envelope_response(envelope: &ResultEnvelope) -> Response {
    (
        [(CONTENT_TYPE, ENVELOPE_CONTENT_TYPE), (CONNECTION, "close")],
        envelope.to_json(),
    )
        .into_response()
}

fn backup_response(outcome: BackupOutcome) -> Response {
    let disposition = outcome.content_disposition();
    match outcome {
        BackupOutcome::File {
            content_type, body, ..
        } => (
            [
                (CONTENT_TYPE, content_type.to_string()),
                (CONTENT_DISPOSITION, disposition.unwrap_or_default()),
                (CONNECTION, "close".to_string()),
            ],
            body,
        )
            .into_response(),
        BackupOutcome::Envelope(envelope) => envelope_response(&envelope),
    }
}

/// Server-sent stream of published `DATA` objects.
async fn event_stream(
    State(handle): State<BridgeHandle>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = handle.events().subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(data) => yield Ok::<_, Infallible>(Event::default().data(data)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(category = "http", skipped, "Event stream subscriber lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keepalive"),
    )
}

async fn status(State(handle): State<BridgeHandle>) -> Result<Json<BridgeStatus>, ApiError> {
    Ok(Json(handle.status().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_from_body() {
        assert_eq!(command_from_body(br#"{"command":"GET STAT"}"#), "GET STAT");
        assert_eq!(command_from_body(br#"{"command":42}"#), "42");
        assert_eq!(command_from_body(br#"{"command":null}"#), "");
        assert_eq!(command_from_body(br#"{"cmd":"GET STAT"}"#), "");
        assert_eq!(command_from_body(b"GET STAT"), "");
        assert_eq!(command_from_body(b""), "");
    }
}
