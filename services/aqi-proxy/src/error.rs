use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::types::ErrorResp;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Too many requests")]
    RateLimited,
    #[error("Invalid sensor id")]
    InvalidSensorId,
    #[error("Failed to fetch sensor data")]
    Upstream(#[from] UpstreamError),
    #[error("Sensor payload has no PM2.5 reading")]
    MissingReading,
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::InvalidSensorId => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::MissingReading => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = ErrorResp {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream returned {0}")]
    Status(reqwest::StatusCode),
    #[error("upstream request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("upstream body was not valid JSON: {0}")]
    Decode(#[source] reqwest::Error),
}
