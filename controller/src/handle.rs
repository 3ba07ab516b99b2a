use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use thermostat_common::{
    CollaboratorEvent, ConfigStore, ConfigStoreError, ControllerStatus, Evaluation,
    HeatingCoolingMode, RelayActuator, TemperatureDisplayUnits, ThermostatEngine, ThermostatState,
};

#[derive(Debug, Error)]
pub enum HandleError {
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
    #[error(transparent)]
    Persist(#[from] ConfigStoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct EscalationAlert {
    pub retries: u32,
    #[serde(rename = "targetMode")]
    pub target_mode: &'static str,
    #[serde(rename = "currentMode")]
    pub current_mode: &'static str,
    pub message: String,
}

impl EscalationAlert {
    fn from_evaluation(evaluation: &Evaluation) -> Self {
        Self {
            retries: evaluation.retries,
            target_mode: evaluation.target_mode.as_str(),
            current_mode: evaluation.current_mode.as_str(),
            message: format!(
                "relay communication failed {} consecutive times, power off the master switch",
                evaluation.retries
            ),
        }
    }
}

/// Shared entry point to the engine. Every evaluation runs with the engine
/// lock held, so at most one relay command is in flight at a time.
pub struct ThermostatHandle<R, S> {
    engine: Arc<Mutex<ThermostatEngine>>,
    relay: Arc<R>,
    store: Arc<S>,
    alerts: broadcast::Sender<EscalationAlert>,
    persist_on_transition: bool,
}

impl<R, S> Clone for ThermostatHandle<R, S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            relay: Arc::clone(&self.relay),
            store: Arc::clone(&self.store),
            alerts: self.alerts.clone(),
            persist_on_transition: self.persist_on_transition,
        }
    }
}

impl<R, S> ThermostatHandle<R, S>
where
    R: RelayActuator + 'static,
    S: ConfigStore + 'static,
{
    pub fn new(
        engine: ThermostatEngine,
        relay: Arc<R>,
        store: Arc<S>,
        persist_on_transition: bool,
    ) -> Self {
        let (alerts, _) = broadcast::channel(16);
        Self {
            engine: Arc::new(Mutex::new(engine)),
            relay,
            store,
            alerts,
            persist_on_transition,
        }
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<EscalationAlert> {
        self.alerts.subscribe()
    }

    pub async fn snapshot(&self) -> ThermostatState {
        self.engine.lock().await.snapshot()
    }

    pub async fn status(&self) -> ControllerStatus {
        self.engine.lock().await.status(Utc::now())
    }

    pub async fn record_temperature(&self, temperature: f32) -> Evaluation {
        let evaluation = {
            let mut engine = self.engine.lock().await;
            engine.update_sensor_data(temperature);
            engine.evaluate(self.relay.as_ref()).await
        };
        self.after_evaluation(&evaluation).await;
        evaluation
    }

    pub async fn set_target_temperature(
        &self,
        temperature: f32,
    ) -> Result<Evaluation, HandleError> {
        let (changed, target, evaluation) = {
            let mut engine = self.engine.lock().await;
            let changed = engine
                .set_target_temperature(temperature)
                .ok_or(HandleError::InvalidValue("target temperature must be a number"))?;
            let target = engine.store().target_temperature();
            (changed, target, engine.evaluate(self.relay.as_ref()).await)
        };
        self.after_evaluation(&evaluation).await;

        if changed {
            info!("target temperature set to {target}");
            self.persist().await?;
        }
        Ok(evaluation)
    }

    pub async fn set_target_mode(
        &self,
        mode: HeatingCoolingMode,
    ) -> Result<Evaluation, HandleError> {
        let (changed, evaluation) = {
            let mut engine = self.engine.lock().await;
            let changed = engine.set_target_mode(mode);
            (changed, engine.evaluate(self.relay.as_ref()).await)
        };
        self.after_evaluation(&evaluation).await;

        if changed {
            info!("target mode set to {}", mode.as_str());
            self.persist().await?;
        }
        Ok(evaluation)
    }

    pub async fn set_display_units(
        &self,
        units: TemperatureDisplayUnits,
    ) -> Result<bool, HandleError> {
        let changed = self.engine.lock().await.set_display_units(units);
        if changed {
            self.persist().await?;
        }
        Ok(changed)
    }

    pub async fn apply_event(&self, event: CollaboratorEvent) {
        self.engine.lock().await.apply_event(event);
    }

    pub async fn persist(&self) -> Result<(), ConfigStoreError> {
        let snapshot = self.snapshot().await;
        self.store.save(&snapshot).await
    }

    async fn after_evaluation(&self, evaluation: &Evaluation) {
        if evaluation.escalated {
            // No subscribers is fine; the engine already logged the escalation.
            let _ = self.alerts.send(EscalationAlert::from_evaluation(evaluation));
        }

        if self.persist_on_transition && evaluation.transitioned() {
            if let Err(err) = self.persist().await {
                warn!("failed to persist state after transition: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use thermostat_common::{EngineConfig, EvaluationOutcome, SwitchType};

    use super::*;
    use crate::testing::{FakeRelay, MemoryStore};

    fn handle_with(
        relay: &Arc<FakeRelay>,
        store: &Arc<MemoryStore>,
        state: ThermostatState,
    ) -> ThermostatHandle<FakeRelay, MemoryStore> {
        ThermostatHandle::new(
            ThermostatEngine::new(&EngineConfig::default(), state),
            Arc::clone(relay),
            Arc::clone(store),
            true,
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_triggers_never_overlap_relay_commands() {
        let relay = Arc::new(FakeRelay::slow(20));
        let store = Arc::new(MemoryStore::default());
        let handle = handle_with(
            &relay,
            &store,
            ThermostatState {
                current_temperature: 19.0,
                ..ThermostatState::default()
            },
        );

        let mut tasks = Vec::new();
        for mode in [
            HeatingCoolingMode::Heat,
            HeatingCoolingMode::Cool,
            HeatingCoolingMode::Off,
            HeatingCoolingMode::Heat,
        ] {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move { handle.set_target_mode(mode).await }));
        }
        let reading = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.record_temperature(18.0).await })
        };

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        reading.await.unwrap();

        assert!(!relay.sent().is_empty());
        assert_eq!(relay.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn escalation_alert_is_broadcast_on_every_failing_cycle() {
        let relay = Arc::new(FakeRelay::default());
        relay.set_failing(true);
        let store = Arc::new(MemoryStore::default());
        let handle = handle_with(
            &relay,
            &store,
            ThermostatState {
                target_heating_cooling_state: HeatingCoolingMode::Heat,
                ..ThermostatState::default()
            },
        );
        let mut alerts = handle.subscribe_alerts();

        for _ in 0..5 {
            handle.record_temperature(18.0).await;
        }
        assert!(alerts.try_recv().is_err());

        handle.record_temperature(18.0).await;
        handle.record_temperature(18.0).await;
        assert_eq!(alerts.try_recv().unwrap().retries, 6);
        assert_eq!(alerts.try_recv().unwrap().retries, 7);

        relay.set_failing(false);
        let evaluation = handle.record_temperature(18.0).await;
        assert_eq!(evaluation.retries, 0);
        assert!(alerts.try_recv().is_err());
    }

    #[tokio::test]
    async fn transitions_are_persisted() {
        let relay = Arc::new(FakeRelay::default());
        let store = Arc::new(MemoryStore::default());
        let handle = handle_with(
            &relay,
            &store,
            ThermostatState {
                target_heating_cooling_state: HeatingCoolingMode::Heat,
                ..ThermostatState::default()
            },
        );

        let evaluation = handle.record_temperature(20.5).await;
        assert_eq!(evaluation.outcome, EvaluationOutcome::Unchanged);
        assert!(store.saved().is_empty());

        handle.record_temperature(19.0).await;
        let saved = store.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(
            saved[0].current_heating_cooling_state,
            HeatingCoolingMode::Heat
        );
        assert_eq!(saved[0].current_temperature, 19.0);
    }

    #[tokio::test]
    async fn mode_setter_evaluates_and_persists() {
        let relay = Arc::new(FakeRelay::default());
        let store = Arc::new(MemoryStore::default());
        let handle = handle_with(
            &relay,
            &store,
            ThermostatState {
                current_temperature: 25.0,
                ..ThermostatState::default()
            },
        );

        let evaluation = handle
            .set_target_mode(HeatingCoolingMode::Cool)
            .await
            .unwrap();

        assert_eq!(evaluation.current_mode, HeatingCoolingMode::Cool);
        assert_eq!(relay.sent(), vec![SwitchType::None, SwitchType::Cool]);
        // Once for the transition, once for the changed setting.
        assert_eq!(store.saved().len(), 2);
        assert_eq!(
            handle.snapshot().await.target_heating_cooling_state,
            HeatingCoolingMode::Cool
        );
    }

    #[tokio::test]
    async fn invalid_target_is_rejected_without_evaluating() {
        let relay = Arc::new(FakeRelay::default());
        let store = Arc::new(MemoryStore::default());
        let handle = handle_with(&relay, &store, ThermostatState::default());

        let result = handle.set_target_temperature(f32::INFINITY).await;

        assert!(matches!(result, Err(HandleError::InvalidValue(_))));
        assert!(relay.sent().is_empty());
        assert_eq!(handle.snapshot().await.target_temperature, 20.0);
    }

    #[tokio::test]
    async fn persist_failure_surfaces_from_setters() {
        let relay = Arc::new(FakeRelay::default());
        let store = Arc::new(MemoryStore::default());
        store.set_failing(true);
        let handle = handle_with(&relay, &store, ThermostatState::default());

        let result = handle
            .set_display_units(TemperatureDisplayUnits::Fahrenheit)
            .await;

        assert!(matches!(result, Err(HandleError::Persist(_))));
        assert_eq!(
            handle.snapshot().await.temperature_display_units,
            TemperatureDisplayUnits::Fahrenheit
        );
    }
}
