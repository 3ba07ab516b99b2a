use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use thermostat_common::{
    ConfigStore, Evaluation, RelayActuator, SensorFetchError, TemperatureSource,
};

use crate::handle::ThermostatHandle;

// The device reports a lot more (humidity, firmware, ...); only the
// temperature is read.
#[derive(Debug, Deserialize)]
struct DeviceResponse {
    temperature: f32,
}

pub fn parse_device_response(body: &[u8]) -> Result<f32, SensorFetchError> {
    let response: DeviceResponse = serde_json::from_slice(body)
        .map_err(|err| SensorFetchError::Malformed(err.to_string()))?;
    if !response.temperature.is_finite() {
        return Err(SensorFetchError::Malformed(format!(
            "temperature is not a finite number: {}",
            response.temperature
        )));
    }
    Ok(response.temperature)
}

pub struct HttpSensor {
    client: reqwest::Client,
    url: String,
    timeout_ms: u64,
}

impl HttpSensor {
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build sensor http client")?;
        Ok(Self {
            client,
            url,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        })
    }

    fn map_error(&self, err: reqwest::Error) -> SensorFetchError {
        if err.is_timeout() {
            SensorFetchError::TimedOut(self.timeout_ms)
        } else {
            SensorFetchError::Network(err.to_string())
        }
    }
}

impl TemperatureSource for HttpSensor {
    async fn read_temperature(&self) -> Result<f32, SensorFetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| self.map_error(err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SensorFetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|err| self.map_error(err))?;
        parse_device_response(&body)
    }
}

/// Fetches one reading per tick and feeds it to the engine. Ticks run in a
/// single task, so a slow fetch delays the next tick instead of overlapping it.
pub struct SensorPoller<T, R, S> {
    source: T,
    handle: ThermostatHandle<R, S>,
    interval: Duration,
}

impl<T, R, S> SensorPoller<T, R, S>
where
    T: TemperatureSource,
    R: RelayActuator + 'static,
    S: ConfigStore + 'static,
{
    pub fn new(source: T, handle: ThermostatHandle<R, S>, interval: Duration) -> Self {
        Self {
            source,
            handle,
            interval,
        }
    }

    pub async fn poll_once(&self) -> Option<Evaluation> {
        match self.source.read_temperature().await {
            Ok(temperature) => {
                debug!("sensor reported {temperature}");
                Some(self.handle.record_temperature(temperature).await)
            }
            Err(err) => {
                warn!("error while fetching sensor data, skipping cycle: {err}");
                None
            }
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately.
        loop {
            interval.tick().await;
            self.poll_once().await;
        }
    }
}
