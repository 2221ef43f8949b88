//! Transport-level errors.
//!
//! Protocol failures travel inside result envelopes with HTTP 200; only a
//! dead control loop surfaces as an HTTP error.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The control loop has stopped or dropped the request.
    #[error("Bridge control loop unavailable")]
    BridgeUnavailable,

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("MQTT error: {0}")]
    Mqtt(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BridgeUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
