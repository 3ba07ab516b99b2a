use serde::{Deserialize, Serialize};

use crate::types::ThermostatState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub poll_interval_ms: u64,
    pub sensor_timeout_ms: u64,
    pub actuation_timeout_ms: u64,
    pub escalation_threshold: u32,
    pub persist_on_transition: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 60_000,
            sensor_timeout_ms: 10_000,
            actuation_timeout_ms: 5_000,
            escalation_threshold: 5,
            persist_on_transition: true,
        }
    }
}

impl EngineConfig {
    pub fn sanitize(&mut self) {
        self.poll_interval_ms = self.poll_interval_ms.max(1_000);
        self.sensor_timeout_ms = self.sensor_timeout_ms.clamp(100, self.poll_interval_ms);
        self.actuation_timeout_ms = self.actuation_timeout_ms.clamp(100, 60_000);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpConfig {
    pub hostname: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SensorConfig {
    pub url: String,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8081/devices/thermostat".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    pub http: HttpConfig,
    pub sensor: SensorConfig,
    pub engine: EngineConfig,
    pub network: NetworkConfig,
    pub thermostat_state: ThermostatState,
}
