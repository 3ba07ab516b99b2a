use serde::Serialize;

use crate::collaborators::ForecastSnapshot;

const HEATING_MAX_OFFSET: f32 = 1.0;
const HEATING_MIN_OFFSET: f32 = 0.5;
const COOLING_MAX_OFFSET: f32 = 0.5;
const COOLING_MIN_OFFSET: f32 = 1.0;

/// Hysteresis band around the setpoint. Recomputed on every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatingThresholds {
    pub heating_max: f32,
    pub heating_min: f32,
    pub cooling_max: f32,
    pub cooling_min: f32,
}

/// Everything the band may depend on. Only the target is read today; the
/// environment slots let callers pass more context without a signature change.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdInputs<'a> {
    pub target_temperature: f32,
    pub outdoor_temperature: Option<f32>,
    pub forecast: Option<&'a ForecastSnapshot>,
}

impl<'a> ThresholdInputs<'a> {
    pub fn new(target_temperature: f32) -> Self {
        Self {
            target_temperature,
            outdoor_temperature: None,
            forecast: None,
        }
    }

    pub fn with_outdoor_temperature(mut self, outdoor: f32) -> Self {
        self.outdoor_temperature = Some(outdoor);
        self
    }

    pub fn with_forecast(mut self, forecast: Option<&'a ForecastSnapshot>) -> Self {
        self.forecast = forecast;
        self
    }
}

impl HeatingThresholds {
    pub fn compute(inputs: &ThresholdInputs<'_>) -> Self {
        let target = inputs.target_temperature;
        Self {
            heating_max: target + HEATING_MAX_OFFSET,
            heating_min: target - HEATING_MIN_OFFSET,
            cooling_max: target + COOLING_MAX_OFFSET,
            cooling_min: target - COOLING_MIN_OFFSET,
        }
    }

    pub fn for_target(target_temperature: f32) -> Self {
        Self::compute(&ThresholdInputs::new(target_temperature))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn band_for_twenty_degrees() {
        assert_eq!(
            HeatingThresholds::for_target(20.0),
            HeatingThresholds {
                heating_max: 21.0,
                heating_min: 19.5,
                cooling_max: 20.5,
                cooling_min: 19.0,
            }
        );
    }

    #[test]
    fn environment_inputs_do_not_move_the_band_yet() {
        let forecast = ForecastSnapshot::new(serde_json::json!({ "temp": 31.0 }), Utc::now());
        let inputs = ThresholdInputs::new(22.0)
            .with_outdoor_temperature(-5.0)
            .with_forecast(Some(&forecast));

        assert_eq!(
            HeatingThresholds::compute(&inputs),
            HeatingThresholds::for_target(22.0)
        );
    }

    proptest! {
        #[test]
        fn band_follows_offsets(target in -50.0f32..60.0) {
            let band = HeatingThresholds::for_target(target);
            prop_assert_eq!(band.heating_max, target + 1.0);
            prop_assert_eq!(band.heating_min, target - 0.5);
            prop_assert_eq!(band.cooling_max, target + 0.5);
            prop_assert_eq!(band.cooling_min, target - 1.0);
        }

        #[test]
        fn band_is_never_inverted(target in -50.0f32..60.0) {
            let band = HeatingThresholds::for_target(target);
            prop_assert!(band.heating_min < band.heating_max);
            prop_assert!(band.cooling_min < band.cooling_max);
        }
    }
}
