pub mod collaborators;
pub mod config;
pub mod error;
pub mod retry;
pub mod state;
pub mod thermostat;
pub mod thresholds;
pub mod topics;
pub mod types;

pub use collaborators::{
    CollaboratorEvent, ConfigStore, ForecastSnapshot, RelayActuator, TemperatureSource,
};
pub use config::{EngineConfig, HttpConfig, NetworkConfig, RuntimeConfig, SensorConfig};
pub use error::{ActuationError, ConfigStoreError, SensorFetchError};
pub use retry::RetryEscalation;
pub use state::StateStore;
pub use thermostat::{Evaluation, EvaluationOutcome, ThermostatEngine, TransitionReason};
pub use thresholds::{HeatingThresholds, ThresholdInputs};
pub use topics::*;
pub use types::{
    ControllerStatus, HeatingCoolingMode, RelaySwitch, SwitchType, TemperatureDisplayUnits,
    ThermostatState,
};
