use crate::types::{HeatingCoolingMode, TemperatureDisplayUnits, ThermostatState};

pub const MIN_TARGET_TEMPERATURE: f32 = 10.0;
pub const MAX_TARGET_TEMPERATURE: f32 = 38.0;

/// Sole owner of the [`ThermostatState`].
///
/// Readers get copies through [`StateStore::snapshot`]. The current mode can
/// only be written from inside this crate, by the state machine.
#[derive(Debug, Clone)]
pub struct StateStore {
    state: ThermostatState,
}

impl StateStore {
    pub fn new(mut state: ThermostatState) -> Self {
        if state.target_temperature.is_finite() {
            state.target_temperature = state
                .target_temperature
                .clamp(MIN_TARGET_TEMPERATURE, MAX_TARGET_TEMPERATURE);
        } else {
            state.target_temperature = ThermostatState::default().target_temperature;
        }
        Self { state }
    }

    pub fn snapshot(&self) -> ThermostatState {
        self.state
    }

    pub fn current_temperature(&self) -> f32 {
        self.state.current_temperature
    }

    pub fn target_temperature(&self) -> f32 {
        self.state.target_temperature
    }

    pub fn current_mode(&self) -> HeatingCoolingMode {
        self.state.current_heating_cooling_state
    }

    pub fn target_mode(&self) -> HeatingCoolingMode {
        self.state.target_heating_cooling_state
    }

    pub fn record_temperature(&mut self, temperature: f32) {
        self.state.current_temperature = temperature;
    }

    /// Returns `None` for a non-finite value, otherwise whether the clamped
    /// setpoint differs from the previous one.
    pub fn set_target_temperature(&mut self, temperature: f32) -> Option<bool> {
        if !temperature.is_finite() {
            return None;
        }
        let clamped = temperature.clamp(MIN_TARGET_TEMPERATURE, MAX_TARGET_TEMPERATURE);
        if (self.state.target_temperature - clamped).abs() > f32::EPSILON {
            self.state.target_temperature = clamped;
            Some(true)
        } else {
            Some(false)
        }
    }

    pub fn set_target_mode(&mut self, mode: HeatingCoolingMode) -> bool {
        if self.state.target_heating_cooling_state != mode {
            self.state.target_heating_cooling_state = mode;
            true
        } else {
            false
        }
    }

    pub fn set_display_units(&mut self, units: TemperatureDisplayUnits) -> bool {
        if self.state.temperature_display_units != units {
            self.state.temperature_display_units = units;
            true
        } else {
            false
        }
    }

    pub(crate) fn set_current_mode(&mut self, mode: HeatingCoolingMode) {
        self.state.current_heating_cooling_state = mode;
    }
}
