use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aqi::{self, AqiCategory};

// Tried in order inside `sensor`.
const PM25_FIELDS: [&str; 3] = ["pm2.5", "pm2.5_atm", "pm2.5_cf_1"];

#[derive(Serialize)]
pub struct ErrorResp {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResp {
    pub status: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub pm25: f64,
    pub aqi: u32,
    pub category: AqiCategory,
    pub label: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
}

impl SensorReading {
    pub fn from_payload(sensor_id: u64, payload: &Value) -> Option<Self> {
        let sensor = payload.get("sensor")?;
        let pm25 = PM25_FIELDS
            .iter()
            .find_map(|key| sensor.get(*key).and_then(Value::as_f64))?;
        let index = aqi::index(pm25);
        let category = aqi::category(index);
        Some(Self {
            sensor_id,
            name: sensor.get("name").and_then(Value::as_str).map(str::to_string),
            pm25,
            aqi: index,
            category,
            label: category.label().to_string(),
            color: category.color().to_string(),
            temperature: sensor.get("temperature").and_then(Value::as_f64),
            humidity: sensor.get("humidity").and_then(Value::as_f64),
        })
    }
}
