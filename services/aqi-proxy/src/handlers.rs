use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
};
use serde_json::Value;

use crate::error::ProxyError;
use crate::state::SharedState;
use crate::types::{HealthResp, SensorReading};

fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

// Forwarding headers count only when trusted; otherwise the TCP peer is the client.
pub fn client_id(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded: bool,
) -> String {
    if trust_forwarded {
        if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
            if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
                return first.to_string();
            }
        }
        if let Some(real_ip) = header_str(headers, "x-real-ip") {
            return real_ip.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".into())
}

fn parse_sensor_id(raw: &str) -> Result<u64, ProxyError> {
    match raw.trim().parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ProxyError::InvalidSensorId),
    }
}

async fn fetch_for_client(
    state: &SharedState,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    raw_id: &str,
) -> Result<(u64, Value), ProxyError> {
    let request_id = request_id(headers);
    let client = client_id(headers, peer, state.trusts_forwarded_headers());
    let sensor_id = parse_sensor_id(raw_id).inspect_err(|_| {
        tracing::warn!(%request_id, %client, raw_id, "rejecting invalid sensor id");
    })?;

    if !state.allow(&client).await {
        tracing::warn!(%request_id, %client, sensor_id, "rate limit exceeded");
        return Err(ProxyError::RateLimited);
    }

    let payload = state.sensor_payload(sensor_id).await?;
    tracing::info!(%request_id, %client, sensor_id, "sensor data served");
    Ok((sensor_id, payload))
}

pub async fn sensor(
    State(state): State<SharedState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Path(sensor_id): Path<String>,
) -> Result<Json<Value>, ProxyError> {
    let peer = peer.map(|ConnectInfo(addr)| addr);
    let (_, payload) = fetch_for_client(&state, &headers, peer, &sensor_id).await?;
    Ok(Json(payload))
}

pub async fn sensor_aqi(
    State(state): State<SharedState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Path(sensor_id): Path<String>,
) -> Result<Json<SensorReading>, ProxyError> {
    let peer = peer.map(|ConnectInfo(addr)| addr);
    let (sensor_id, payload) = fetch_for_client(&state, &headers, peer, &sensor_id).await?;
    let reading = SensorReading::from_payload(sensor_id, &payload).ok_or_else(|| {
        tracing::warn!(request_id = %request_id(&headers), sensor_id, "payload has no PM2.5 field");
        ProxyError::MissingReading
    })?;
    Ok(Json(reading))
}

pub async fn healthz() -> Json<HealthResp> {
    Json(HealthResp { status: "ok" })
}
