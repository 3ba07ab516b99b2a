//! Collaborator fakes shared by the controller tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use thermostat_common::{
    ActuationError, ConfigStore, ConfigStoreError, RelayActuator, SensorFetchError, SwitchType,
    TemperatureSource, ThermostatState,
};

#[derive(Default)]
pub struct FakeRelay {
    sent: Mutex<Vec<SwitchType>>,
    failing: AtomicBool,
    delay_ms: u64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRelay {
    pub fn slow(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SwitchType> {
        self.sent.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl RelayActuator for FakeRelay {
    async fn activate(&self, command: SwitchType) -> Result<(), ActuationError> {
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(command);

        if self.failing.load(Ordering::SeqCst) {
            Err(ActuationError::Rejected {
                command,
                reason: "relay offline".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Vec<ThermostatState>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn saved(&self) -> Vec<ThermostatState> {
        self.saved.lock().unwrap().clone()
    }
}

impl ConfigStore for MemoryStore {
    async fn save(&self, state: &ThermostatState) -> Result<(), ConfigStoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ConfigStoreError::Io(std::io::Error::other("disk full")));
        }
        self.saved.lock().unwrap().push(*state);
        Ok(())
    }
}

#[derive(Default)]
pub struct ScriptedSensor {
    readings: Mutex<VecDeque<Result<f32, SensorFetchError>>>,
}

impl ScriptedSensor {
    pub fn new(readings: Vec<Result<f32, SensorFetchError>>) -> Self {
        Self {
            readings: Mutex::new(readings.into()),
        }
    }
}

impl TemperatureSource for ScriptedSensor {
    async fn read_temperature(&self) -> Result<f32, SensorFetchError> {
        self.readings
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SensorFetchError::Network("no more readings".to_string())))
    }
}
