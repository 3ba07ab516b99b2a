use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Context;
use chrono::Utc;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, Incoming, Publish, QoS};
use tracing::info;

use thermostat_common::{
    ActuationError, CollaboratorEvent, ForecastSnapshot, RelayActuator, RelaySwitch, SwitchType,
    TOPIC_RELAY_COMMAND, TOPIC_RELAY_STATE, TOPIC_WEATHER_FORECAST,
};

/// Relay driver reached over MQTT. Commands are fire-and-forget publishes; the
/// driver answers with its full switch list on [`TOPIC_RELAY_STATE`].
///
/// A publish only queues the command in the client, so commands are refused
/// outright while the broker link is down.
#[derive(Clone)]
pub struct MqttRelay {
    mqtt: AsyncClient,
    timeout: Duration,
    connected: Arc<AtomicBool>,
}

impl MqttRelay {
    pub fn new(mqtt: AsyncClient, timeout: Duration, connected: Arc<AtomicBool>) -> Self {
        Self {
            mqtt,
            timeout,
            connected,
        }
    }
}

impl RelayActuator for MqttRelay {
    async fn activate(&self, command: SwitchType) -> Result<(), ActuationError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ActuationError::Rejected {
                command,
                reason: "broker disconnected".to_string(),
            });
        }

        let publish = self
            .mqtt
            .publish(TOPIC_RELAY_COMMAND, QoS::AtLeastOnce, false, command.as_str());

        match tokio::time::timeout(self.timeout, publish).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ActuationError::Rejected {
                command,
                reason: err.to_string(),
            }),
            Err(_) => Err(ActuationError::TimedOut {
                command,
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

/// Polls the MQTT event loop once and keeps `connected` in step with the
/// broker link: set on `ConnAck`, cleared on any connection error.
pub async fn poll_broker(
    eventloop: &mut EventLoop,
    connected: &AtomicBool,
) -> Result<Option<Publish>, ConnectionError> {
    match eventloop.poll().await {
        Ok(Event::Incoming(Incoming::Publish(message))) => Ok(Some(message)),
        Ok(Event::Incoming(Incoming::ConnAck(_))) => {
            info!("mqtt connected");
            connected.store(true, Ordering::SeqCst);
            Ok(None)
        }
        Ok(_) => Ok(None),
        Err(err) => {
            connected.store(false, Ordering::SeqCst);
            Err(err)
        }
    }
}

/// Maps an incoming collaborator message to an engine event. Unknown topics
/// yield `Ok(None)`.
pub fn parse_collaborator_message(
    topic: &str,
    payload: &[u8],
) -> anyhow::Result<Option<CollaboratorEvent>> {
    match topic {
        TOPIC_RELAY_STATE => {
            let switches: Vec<RelaySwitch> =
                serde_json::from_slice(payload).context("invalid relay state payload")?;
            Ok(Some(CollaboratorEvent::RelayUpdate(switches)))
        }
        TOPIC_WEATHER_FORECAST => {
            let forecast: serde_json::Value =
                serde_json::from_slice(payload).context("invalid forecast payload")?;
            Ok(Some(CollaboratorEvent::Forecast(ForecastSnapshot::new(
                forecast,
                Utc::now(),
            ))))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use thermostat_common::{
        EngineConfig, EvaluationOutcome, HeatingCoolingMode, ThermostatEngine, ThermostatState,
    };

    use super::*;

    #[test]
    fn relay_state_becomes_switch_update() {
        let payload = br#"[{"type":"HEAT","active":true},{"type":"COOL","active":false}]"#;

        let event = parse_collaborator_message(TOPIC_RELAY_STATE, payload)
            .unwrap()
            .unwrap();

        assert_eq!(
            event,
            CollaboratorEvent::RelayUpdate(vec![
                RelaySwitch {
                    switch_type: SwitchType::Heat,
                    active: true,
                },
                RelaySwitch {
                    switch_type: SwitchType::Cool,
                    active: false,
                },
            ])
        );
    }

    #[test]
    fn forecast_payload_is_kept_opaque() {
        let payload = br#"{"list":[{"main":{"temp":281.4}}],"city":{"name":"Utrecht"}}"#;

        let event = parse_collaborator_message(TOPIC_WEATHER_FORECAST, payload)
            .unwrap()
            .unwrap();

        let CollaboratorEvent::Forecast(snapshot) = event else {
            panic!("expected a forecast event");
        };
        assert_eq!(snapshot.payload["city"]["name"], "Utrecht");
    }

    #[test]
    fn bad_relay_state_is_an_error_and_unknown_topics_are_ignored() {
        assert!(parse_collaborator_message(TOPIC_RELAY_STATE, b"[{\"type\":\"FAN\"}]").is_err());
        assert!(parse_collaborator_message("thermostat/other", b"{}")
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn command_times_out_when_the_client_queue_is_full() {
        let options = rumqttc::MqttOptions::new("relay-test", "127.0.0.1", 1883);
        // The event loop is never polled, so queued requests are never drained.
        let (mqtt, _eventloop) = AsyncClient::new(options, 2);
        let relay = MqttRelay::new(
            mqtt,
            Duration::from_millis(100),
            Arc::new(AtomicBool::new(true)),
        );

        relay.activate(SwitchType::Heat).await.unwrap();
        relay.activate(SwitchType::None).await.unwrap();
        let result = relay.activate(SwitchType::Cool).await;

        assert!(matches!(
            result,
            Err(ActuationError::TimedOut {
                command: SwitchType::Cool,
                timeout_ms: 100,
            })
        ));
    }

    #[tokio::test]
    async fn unreachable_broker_fails_actuation_and_counts_a_retry() {
        // Nothing listens on port 1, so the connect attempt is refused.
        let options = rumqttc::MqttOptions::new("relay-test-offline", "127.0.0.1", 1);
        let (mqtt, mut eventloop) = AsyncClient::new(options, 64);
        let connected = Arc::new(AtomicBool::new(true));
        let relay = MqttRelay::new(mqtt, Duration::from_millis(100), Arc::clone(&connected));

        let polled = tokio::time::timeout(
            Duration::from_secs(5),
            poll_broker(&mut eventloop, &connected),
        )
        .await
        .unwrap();
        assert!(polled.is_err());
        assert!(!connected.load(Ordering::SeqCst));

        let state = ThermostatState {
            current_temperature: 18.0,
            target_heating_cooling_state: HeatingCoolingMode::Heat,
            ..ThermostatState::default()
        };
        let mut engine = ThermostatEngine::new(&EngineConfig::default(), state);

        let evaluation = engine.evaluate(&relay).await;

        assert!(matches!(
            evaluation.outcome,
            EvaluationOutcome::ActuationFailed(_)
        ));
        assert_eq!(evaluation.current_mode, HeatingCoolingMode::Off);
        assert_eq!(evaluation.retries, 1);
    }

    #[tokio::test]
    async fn disconnected_relay_rejects_every_command() {
        let options = rumqttc::MqttOptions::new("relay-test-idle", "127.0.0.1", 1883);
        let (mqtt, _eventloop) = AsyncClient::new(options, 64);
        let relay = MqttRelay::new(
            mqtt,
            Duration::from_millis(100),
            Arc::new(AtomicBool::new(false)),
        );

        for command in [SwitchType::Heat, SwitchType::Cool, SwitchType::None] {
            assert!(matches!(
                relay.activate(command).await,
                Err(ActuationError::Rejected { command: rejected, .. }) if rejected == command
            ));
        }
    }
}
