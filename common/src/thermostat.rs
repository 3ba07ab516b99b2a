use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::{
    collaborators::{CollaboratorEvent, ForecastSnapshot, RelayActuator},
    config::EngineConfig,
    error::ActuationError,
    retry::RetryEscalation,
    state::StateStore,
    thresholds::{HeatingThresholds, ThresholdInputs},
    types::{
        ControllerStatus, HeatingCoolingMode, RelaySwitch, SwitchType, TemperatureDisplayUnits,
        ThermostatState,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    TargetOff,
    BelowHeatingMin,
    BelowTarget,
    AboveHeatingMax,
    AboveCoolingMax,
    BelowCoolingMin,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Transitioned,
    Unchanged,
    ActuationFailed(String),
    Skipped(&'static str),
}

/// Result of one pass of the decision procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub target_mode: HeatingCoolingMode,
    pub previous_mode: HeatingCoolingMode,
    pub current_mode: HeatingCoolingMode,
    pub thresholds: HeatingThresholds,
    /// Relay commands in the order they were sent, including a failed one.
    pub commands: Vec<SwitchType>,
    pub outcome: EvaluationOutcome,
    pub reason: Option<TransitionReason>,
    pub retries: u32,
    pub escalated: bool,
}

impl Evaluation {
    pub fn transitioned(&self) -> bool {
        self.outcome == EvaluationOutcome::Transitioned
    }
}

#[derive(Debug, Clone)]
pub struct ThermostatEngine {
    store: StateStore,
    retry: RetryEscalation,

    // Mirrored from relay updates, only read by the mutual-exclusion guard.
    switches: Vec<RelaySwitch>,
    forecast: Option<ForecastSnapshot>,
}

impl ThermostatEngine {
    pub fn new(config: &EngineConfig, state: ThermostatState) -> Self {
        Self {
            store: StateStore::new(state),
            retry: RetryEscalation::new(config.escalation_threshold),
            switches: Vec::new(),
            forecast: None,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn snapshot(&self) -> ThermostatState {
        self.store.snapshot()
    }

    pub fn retries(&self) -> u32 {
        self.retry.retries()
    }

    pub fn is_escalated(&self) -> bool {
        self.retry.should_escalate()
    }

    pub fn switches(&self) -> &[RelaySwitch] {
        &self.switches
    }

    pub fn latest_forecast(&self) -> Option<&ForecastSnapshot> {
        self.forecast.as_ref()
    }

    pub fn thresholds(&self) -> HeatingThresholds {
        let inputs = ThresholdInputs::new(self.store.target_temperature())
            .with_forecast(self.forecast.as_ref());
        HeatingThresholds::compute(&inputs)
    }

    pub fn update_sensor_data(&mut self, temperature: f32) {
        self.store.record_temperature(temperature);
    }

    pub fn set_target_temperature(&mut self, temperature: f32) -> Option<bool> {
        self.store.set_target_temperature(temperature)
    }

    pub fn set_target_mode(&mut self, mode: HeatingCoolingMode) -> bool {
        self.store.set_target_mode(mode)
    }

    pub fn set_display_units(&mut self, units: TemperatureDisplayUnits) -> bool {
        self.store.set_display_units(units)
    }

    pub fn apply_event(&mut self, event: CollaboratorEvent) {
        match event {
            CollaboratorEvent::RelayUpdate(switches) => {
                debug!("relay reported switches: {switches:?}");
                self.switches = switches;
            }
            CollaboratorEvent::Forecast(forecast) => {
                debug!("forecast received at {}", forecast.received_at);
                self.forecast = Some(forecast);
            }
        }
    }

    /// Runs the decision table once against the current state and issues the
    /// resulting relay commands. Never returns an error: actuation failures
    /// are folded into the retry counter and reported in the [`Evaluation`].
    pub async fn evaluate<R: RelayActuator>(&mut self, relay: &R) -> Evaluation {
        let state = self.store.snapshot();
        let thresholds = self.thresholds();

        info!(
            "current temperature: {}, target temperature: {}, target mode: {}, current mode: {}, thresholds: {thresholds:?}",
            state.current_temperature,
            state.target_temperature,
            state.target_heating_cooling_state.as_str(),
            state.current_heating_cooling_state.as_str(),
        );

        let mut evaluation = Evaluation {
            target_mode: state.target_heating_cooling_state,
            previous_mode: state.current_heating_cooling_state,
            current_mode: state.current_heating_cooling_state,
            thresholds,
            commands: Vec::new(),
            outcome: EvaluationOutcome::Unchanged,
            reason: None,
            retries: self.retry.retries(),
            escalated: false,
        };

        if !state.current_temperature.is_finite() {
            warn!(
                "skipping evaluation, current temperature is not a number: {}",
                state.current_temperature
            );
            evaluation.outcome = EvaluationOutcome::Skipped("current temperature is not finite");
        } else if let Err(err) = self
            .decide(relay, &state, &thresholds, &mut evaluation)
            .await
        {
            error!("relay actuation failed, trying again next cycle: {err}");
            self.retry.record_failure();
            evaluation.outcome = EvaluationOutcome::ActuationFailed(err.to_string());
            evaluation.reason = None;
        }

        evaluation.current_mode = self.store.current_mode();
        evaluation.retries = self.retry.retries();
        debug!("finished evaluation, retries: {}", evaluation.retries);

        if self.retry.should_escalate() {
            error!(
                "relay communication failed {} consecutive times, power off the master switch",
                evaluation.retries
            );
            evaluation.escalated = true;
        }

        evaluation
    }

    pub fn status(&self, now: DateTime<Utc>) -> ControllerStatus {
        let state = self.store.snapshot();
        let thresholds = self.thresholds();
        ControllerStatus {
            current_temp: state.current_temperature,
            target_temp: state.target_temperature,
            current_mode: state.current_heating_cooling_state.as_str(),
            target_mode: state.target_heating_cooling_state.as_str(),
            units: state.temperature_display_units.as_str(),
            heating_min: thresholds.heating_min,
            heating_max: thresholds.heating_max,
            cooling_min: thresholds.cooling_min,
            cooling_max: thresholds.cooling_max,
            retries: self.retry.retries(),
            escalated: self.retry.should_escalate(),
            switches: self.switches.clone(),
            forecast_age_secs: self
                .forecast
                .as_ref()
                .map(|forecast| (now - forecast.received_at).num_seconds()),
        }
    }

    async fn decide<R: RelayActuator>(
        &mut self,
        relay: &R,
        state: &ThermostatState,
        thresholds: &HeatingThresholds,
        evaluation: &mut Evaluation,
    ) -> Result<(), ActuationError> {
        let temperature = state.current_temperature;

        match state.target_heating_cooling_state {
            HeatingCoolingMode::Off => {
                debug!("target mode is OFF, releasing every relay");
                self.store.set_current_mode(HeatingCoolingMode::Off);
                self.actuate(relay, SwitchType::None, evaluation).await?;
                if state.current_heating_cooling_state != HeatingCoolingMode::Off {
                    evaluation.outcome = EvaluationOutcome::Transitioned;
                    evaluation.reason = Some(TransitionReason::TargetOff);
                }
            }
            HeatingCoolingMode::Heat => {
                if self.is_switch_active(SwitchType::Cool) {
                    debug!("cooling relay still active, releasing it before heating");
                    self.actuate(relay, SwitchType::None, evaluation).await?;
                }

                match state.current_heating_cooling_state {
                    HeatingCoolingMode::Heat if temperature >= thresholds.heating_max => {
                        self.transition(
                            relay,
                            SwitchType::None,
                            HeatingCoolingMode::Off,
                            TransitionReason::AboveHeatingMax,
                            evaluation,
                        )
                        .await?;
                    }
                    HeatingCoolingMode::Off if temperature <= thresholds.heating_min => {
                        self.transition(
                            relay,
                            SwitchType::Heat,
                            HeatingCoolingMode::Heat,
                            TransitionReason::BelowHeatingMin,
                            evaluation,
                        )
                        .await?;
                    }
                    HeatingCoolingMode::Off if temperature <= state.target_temperature => {
                        self.transition(
                            relay,
                            SwitchType::Heat,
                            HeatingCoolingMode::Heat,
                            TransitionReason::BelowTarget,
                            evaluation,
                        )
                        .await?;
                    }
                    _ => {}
                }
            }
            HeatingCoolingMode::Cool => {
                debug!("target mode is COOL, releasing relay before deciding");
                self.actuate(relay, SwitchType::None, evaluation).await?;

                match state.current_heating_cooling_state {
                    HeatingCoolingMode::Cool if temperature <= thresholds.cooling_min => {
                        self.transition(
                            relay,
                            SwitchType::None,
                            HeatingCoolingMode::Off,
                            TransitionReason::BelowCoolingMin,
                            evaluation,
                        )
                        .await?;
                    }
                    HeatingCoolingMode::Off if temperature >= thresholds.cooling_max => {
                        self.transition(
                            relay,
                            SwitchType::Cool,
                            HeatingCoolingMode::Cool,
                            TransitionReason::AboveCoolingMax,
                            evaluation,
                        )
                        .await?;
                    }
                    _ => {}
                }
            }
            HeatingCoolingMode::Auto => {
                // Forecast-aware control is not defined yet.
                debug!("target mode is AUTO, nothing to do");
            }
        }

        Ok(())
    }

    async fn transition<R: RelayActuator>(
        &mut self,
        relay: &R,
        command: SwitchType,
        next_mode: HeatingCoolingMode,
        reason: TransitionReason,
        evaluation: &mut Evaluation,
    ) -> Result<(), ActuationError> {
        self.actuate(relay, command, evaluation).await?;

        info!(
            "relay set to {command} ({reason:?}), mode {} -> {}",
            self.store.current_mode().as_str(),
            next_mode.as_str()
        );
        self.store.set_current_mode(next_mode);
        self.retry.reset();
        evaluation.outcome = EvaluationOutcome::Transitioned;
        evaluation.reason = Some(reason);
        Ok(())
    }

    async fn actuate<R: RelayActuator>(
        &self,
        relay: &R,
        command: SwitchType,
        evaluation: &mut Evaluation,
    ) -> Result<(), ActuationError> {
        let opposite = match command {
            SwitchType::Heat => Some(SwitchType::Cool),
            SwitchType::Cool => Some(SwitchType::Heat),
            SwitchType::None => None,
        };

        // HEAT and COOL are never energised together.
        if let Some(opposite) = opposite {
            if self.is_switch_active(opposite)
                && evaluation.commands.last() != Some(&SwitchType::None)
            {
                warn!("{opposite} relay still reported active, releasing it before {command}");
                evaluation.commands.push(SwitchType::None);
                relay.activate(SwitchType::None).await?;
            }
        }

        evaluation.commands.push(command);
        relay.activate(command).await
    }

    fn is_switch_active(&self, switch_type: SwitchType) -> bool {
        self.switches
            .iter()
            .any(|switch| switch.switch_type == switch_type && switch.active)
    }
}
