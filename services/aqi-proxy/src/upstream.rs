use reqwest::Client;
use serde_json::Value;

use crate::error::UpstreamError;

#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    api_key_header: String,
    api_key: String,
}

impl UpstreamClient {
    pub fn new(client: Client, base_url: &str, api_key_header: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key_header: api_key_header.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn sensor_url(&self, sensor_id: u64) -> String {
        format!("{}/v1/sensors/{}", self.base_url, sensor_id)
    }

    pub async fn fetch_sensor(&self, sensor_id: u64) -> Result<Value, UpstreamError> {
        let response = self
            .client
            .get(self.sensor_url(sensor_id))
            .header(self.api_key_header.as_str(), self.api_key.as_str())
            .send()
            .await
            .map_err(UpstreamError::Transport)?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status()));
        }

        response.json::<Value>().await.map_err(UpstreamError::Decode)
    }
}
