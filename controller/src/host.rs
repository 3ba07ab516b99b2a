use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{
        broadcast::{self, error::RecvError},
        mpsc, Mutex,
    },
};
use tracing::{debug, info, warn};

use thermostat_common::{
    CollaboratorEvent, HeatingCoolingMode, HeatingThresholds, RuntimeConfig,
    TemperatureDisplayUnits, ThermostatEngine, ThermostatState, TOPIC_CONTROLLER_ALERT,
    TOPIC_CONTROLLER_STATE, TOPIC_RELAY_STATE, TOPIC_WEATHER_FORECAST,
};

use crate::{
    handle::{EscalationAlert, HandleError, ThermostatHandle},
    relay::{parse_collaborator_message, poll_broker, MqttRelay},
    sensor::{HttpSensor, SensorPoller},
    store::AppStore,
    supervisor::supervise,
};

type Handle = ThermostatHandle<MqttRelay, AppStore>;

#[derive(Clone)]
struct AppState {
    handle: Handle,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 64 * 1024;
const STATE_PUBLISH_INTERVAL: Duration = Duration::from_secs(10);

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::from_env();
    let mut runtime = load_runtime(&store).await;
    runtime.engine.sanitize();
    apply_env_overrides(&mut runtime);
    warn_on_unused_thresholds(&runtime.thermostat_state);

    let engine = ThermostatEngine::new(&runtime.engine, runtime.thermostat_state);

    let mut mqtt_options = MqttOptions::new(
        "thermostat-controller-rust",
        runtime.network.mqtt_host.clone(),
        runtime.network.mqtt_port,
    );
    if !runtime.network.mqtt_user.is_empty() {
        mqtt_options.set_credentials(
            runtime.network.mqtt_user.clone(),
            runtime.network.mqtt_pass.clone(),
        );
    }
    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let connected = Arc::new(AtomicBool::new(false));
    let relay = MqttRelay::new(
        mqtt.clone(),
        Duration::from_millis(runtime.engine.actuation_timeout_ms),
        Arc::clone(&connected),
    );
    let handle = ThermostatHandle::new(
        engine,
        Arc::new(relay),
        Arc::new(store),
        runtime.engine.persist_on_transition,
    );

    subscribe_topics(&mqtt).await?;
    let (events_tx, events_rx) = mpsc::channel(32);
    spawn_mqtt_loop(eventloop, connected, events_tx);
    spawn_event_pump(handle.clone(), events_rx);
    spawn_sensor_poller(handle.clone(), &runtime)?;
    spawn_state_publish_loop(handle.clone(), mqtt.clone());
    spawn_alert_publisher(handle.clone(), mqtt);

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/target", post(handle_set_target))
        .route("/api/mode", post(handle_set_mode))
        .route("/api/units", post(handle_set_units))
        .with_state(AppState {
            handle: handle.clone(),
        });

    let addr: SocketAddr = format!("{}:{}", runtime.http.hostname, runtime.http.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                runtime.http.hostname, runtime.http.port
            )
        })?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down, saving last known state");
    handle
        .persist()
        .await
        .context("failed to persist state on shutdown")?;
    Ok(())
}

async fn load_runtime(store: &AppStore) -> RuntimeConfig {
    match store.runtime_config_exists().await {
        Ok(true) => store.load_runtime_config().await.unwrap_or_else(|err| {
            warn!("failed to load runtime config from store: {err}");
            RuntimeConfig::default()
        }),
        Ok(false) => {
            info!("no runtime config found, writing defaults");
            let runtime = RuntimeConfig::default();
            if let Err(err) = store.save_runtime_config(&runtime).await {
                warn!("failed to write default runtime config: {err}");
            }
            runtime
        }
        Err(err) => {
            warn!("failed to check for runtime config: {err}");
            RuntimeConfig::default()
        }
    }
}

fn apply_env_overrides(runtime: &mut RuntimeConfig) {
    if let Ok(host) = std::env::var("MQTT_HOST") {
        runtime.network.mqtt_host = host;
    }
    if let Some(port) = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        runtime.network.mqtt_port = port;
    }
    if let Ok(user) = std::env::var("MQTT_USER") {
        runtime.network.mqtt_user = user;
    }
    if let Ok(pass) = std::env::var("MQTT_PASS") {
        runtime.network.mqtt_pass = pass;
    }
    if let Some(port) = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        runtime.http.port = port;
    }
    if let Ok(url) = std::env::var("SENSOR_URL") {
        runtime.sensor.url = url;
    }
}

/// The persisted threshold fields never drive a decision. Only values that
/// differ from the stock defaults are worth a warning.
fn warn_on_unused_thresholds(state: &ThermostatState) {
    if !has_custom_thresholds(state) {
        return;
    }
    let computed = HeatingThresholds::for_target(state.target_temperature);
    warn!(
        "persisted thresholds (heating {}, cooling {}) are ignored, using computed band {computed:?}",
        state.heating_threshold_temperature, state.cooling_threshold_temperature
    );
}

fn has_custom_thresholds(state: &ThermostatState) -> bool {
    let stock = ThermostatState::default();
    (state.heating_threshold_temperature - stock.heating_threshold_temperature).abs()
        > f32::EPSILON
        || (state.cooling_threshold_temperature - stock.cooling_threshold_temperature).abs()
            > f32::EPSILON
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    for topic in [TOPIC_RELAY_STATE, TOPIC_WEATHER_FORECAST] {
        mqtt.subscribe(topic, QoS::AtLeastOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(
    eventloop: EventLoop,
    connected: Arc<AtomicBool>,
    events: mpsc::Sender<CollaboratorEvent>,
) {
    let eventloop = Arc::new(Mutex::new(eventloop));
    supervise("mqtt-loop", move || {
        pump_mqtt(
            Arc::clone(&eventloop),
            Arc::clone(&connected),
            events.clone(),
        )
    });
}

async fn pump_mqtt(
    eventloop: Arc<Mutex<EventLoop>>,
    connected: Arc<AtomicBool>,
    events: mpsc::Sender<CollaboratorEvent>,
) -> anyhow::Result<()> {
    let mut eventloop = eventloop.lock().await;
    loop {
        match poll_broker(&mut eventloop, &connected).await {
            Ok(Some(message)) => {
                forward_mqtt_message(&events, &message.topic, &message.payload);
            }
            Ok(None) => {}
            Err(err) => {
                warn!("mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

fn forward_mqtt_message(events: &mpsc::Sender<CollaboratorEvent>, topic: &str, payload: &[u8]) {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return;
    }

    match parse_collaborator_message(topic, payload) {
        Ok(Some(event)) => {
            // Never block the MQTT loop on the engine lock; the next update
            // carries the full switch list again.
            if let Err(err) = events.try_send(event) {
                warn!("dropping collaborator event from {topic}: {err}");
            }
        }
        Ok(None) => debug!("ignoring message on {topic}"),
        Err(err) => warn!("mqtt message handling error: {err:#}"),
    }
}

fn spawn_event_pump(handle: Handle, events: mpsc::Receiver<CollaboratorEvent>) {
    let events = Arc::new(Mutex::new(events));
    supervise("collaborator-events", move || {
        let handle = handle.clone();
        let events = Arc::clone(&events);
        async move {
            let mut events = events.lock().await;
            while let Some(event) = events.recv().await {
                handle.apply_event(event).await;
            }
            Ok(())
        }
    });
}

fn spawn_sensor_poller(handle: Handle, runtime: &RuntimeConfig) -> anyhow::Result<()> {
    let sensor = HttpSensor::new(
        runtime.sensor.url.clone(),
        Duration::from_millis(runtime.engine.sensor_timeout_ms),
    )?;
    let poller = Arc::new(SensorPoller::new(
        sensor,
        handle,
        Duration::from_millis(runtime.engine.poll_interval_ms),
    ));

    info!(
        "polling {} every {} ms",
        runtime.sensor.url, runtime.engine.poll_interval_ms
    );
    supervise("sensor-poller", move || {
        let poller = Arc::clone(&poller);
        async move { poller.run().await }
    });
    Ok(())
}

fn spawn_state_publish_loop(handle: Handle, mqtt: AsyncClient) {
    supervise("state-publisher", move || publish_state(handle.clone(), mqtt.clone()));
}

async fn publish_state(handle: Handle, mqtt: AsyncClient) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(STATE_PUBLISH_INTERVAL);
    loop {
        interval.tick().await;

        match serde_json::to_vec(&handle.status().await) {
            Ok(body) => {
                if let Err(err) = mqtt
                    .publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
                    .await
                {
                    warn!("controller state publish failed: {err}");
                }
            }
            Err(err) => warn!("controller state serialization failed: {err}"),
        }
    }
}

fn spawn_alert_publisher(handle: Handle, mqtt: AsyncClient) {
    // A restarted publisher subscribes afresh; alerts raised while it was
    // down are only in the log.
    supervise("alert-publisher", move || {
        publish_alerts(handle.subscribe_alerts(), mqtt.clone())
    });
}

async fn publish_alerts(
    mut alerts: broadcast::Receiver<EscalationAlert>,
    mqtt: AsyncClient,
) -> anyhow::Result<()> {
    loop {
        let alert = match alerts.recv().await {
            Ok(alert) => alert,
            Err(RecvError::Lagged(skipped)) => {
                warn!("skipped {skipped} escalation alerts");
                continue;
            }
            Err(RecvError::Closed) => return Ok(()),
        };

        match serde_json::to_vec(&alert) {
            Ok(body) => {
                if let Err(err) = mqtt
                    .publish(TOPIC_CONTROLLER_ALERT, QoS::AtLeastOnce, false, body)
                    .await
                {
                    warn!("escalation alert publish failed: {err}");
                }
            }
            Err(err) => warn!("escalation alert serialization failed: {err}"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("interrupt received");
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.handle.status().await)
}

async fn handle_set_target(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(target) = value.parse::<f32>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    };

    if let Err(err) = state.handle.set_target_temperature(target).await {
        return setter_error_response(err, "target");
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(mode) = HeatingCoolingMode::parse(value) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid mode. Use 'OFF', 'HEAT', 'COOL' or 'AUTO'",
        );
    };

    if let Err(err) = state.handle.set_target_mode(mode).await {
        return setter_error_response(err, "mode");
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_units(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(units) = TemperatureDisplayUnits::parse(value) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid units. Use 'CELSIUS' or 'FAHRENHEIT'",
        );
    };

    if let Err(err) = state.handle.set_display_units(units).await {
        return setter_error_response(err, "units");
    }

    handle_get_status(State(state)).await.into_response()
}

fn setter_error_response(err: HandleError, what: &str) -> axum::response::Response {
    match err {
        HandleError::InvalidValue(message) => error_response(StatusCode::BAD_REQUEST, message),
        HandleError::Persist(err) => {
            warn!("failed to persist {what} update: {err}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist thermostat state",
            )
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
