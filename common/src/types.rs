use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HeatingCoolingMode {
    Off,
    Heat,
    Cool,
    Auto,
}

impl HeatingCoolingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Heat => "HEAT",
            Self::Cool => "COOL",
            Self::Auto => "AUTO",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "OFF" => Some(Self::Off),
            "HEAT" => Some(Self::Heat),
            "COOL" => Some(Self::Cool),
            "AUTO" => Some(Self::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TemperatureDisplayUnits {
    Celsius,
    Fahrenheit,
}

impl TemperatureDisplayUnits {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Celsius => "CELSIUS",
            Self::Fahrenheit => "FAHRENHEIT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "CELSIUS" | "C" => Some(Self::Celsius),
            "FAHRENHEIT" | "F" => Some(Self::Fahrenheit),
            _ => None,
        }
    }
}

/// Relay command and switch kind. `None` de-energises every output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwitchType {
    None,
    Heat,
    Cool,
}

impl SwitchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Heat => "HEAT",
            Self::Cool => "COOL",
        }
    }
}

impl std::fmt::Display for SwitchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySwitch {
    #[serde(rename = "type")]
    pub switch_type: SwitchType,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermostatState {
    pub current_temperature: f32,
    pub target_temperature: f32,
    pub current_heating_cooling_state: HeatingCoolingMode,
    pub target_heating_cooling_state: HeatingCoolingMode,
    pub temperature_display_units: TemperatureDisplayUnits,
    pub cooling_threshold_temperature: f32,
    pub heating_threshold_temperature: f32,
}

impl Default for ThermostatState {
    fn default() -> Self {
        Self {
            current_temperature: 0.0,
            target_temperature: 20.0,
            current_heating_cooling_state: HeatingCoolingMode::Off,
            target_heating_cooling_state: HeatingCoolingMode::Off,
            temperature_display_units: TemperatureDisplayUnits::Celsius,
            cooling_threshold_temperature: 20.0,
            heating_threshold_temperature: 20.5,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    #[serde(rename = "currentTemp")]
    pub current_temp: f32,
    #[serde(rename = "targetTemp")]
    pub target_temp: f32,
    #[serde(rename = "currentMode")]
    pub current_mode: &'static str,
    #[serde(rename = "targetMode")]
    pub target_mode: &'static str,
    pub units: &'static str,
    #[serde(rename = "heatingMin")]
    pub heating_min: f32,
    #[serde(rename = "heatingMax")]
    pub heating_max: f32,
    #[serde(rename = "coolingMin")]
    pub cooling_min: f32,
    #[serde(rename = "coolingMax")]
    pub cooling_max: f32,
    pub retries: u32,
    pub escalated: bool,
    pub switches: Vec<RelaySwitch>,
    #[serde(rename = "forecastAgeSecs")]
    pub forecast_age_secs: Option<i64>,
}
