//! Interfaces to the collaborators that live outside the engine.
//!
//! The engine calls into a [`RelayActuator`] and a [`TemperatureSource`], hands
//! snapshots to a [`ConfigStore`], and receives pushed [`CollaboratorEvent`]s.
//! Events are read-only snapshot updates; the engine never takes ownership of
//! collaborator state through them.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::{ActuationError, ConfigStoreError, SensorFetchError},
    types::{RelaySwitch, SwitchType, ThermostatState},
};

pub trait RelayActuator: Send + Sync {
    /// Command the relay. Success only means the command was accepted; the
    /// hardware reports its real state later through
    /// [`CollaboratorEvent::RelayUpdate`].
    fn activate(
        &self,
        command: SwitchType,
    ) -> impl Future<Output = Result<(), ActuationError>> + Send;
}

pub trait TemperatureSource: Send + Sync {
    fn read_temperature(&self) -> impl Future<Output = Result<f32, SensorFetchError>> + Send;
}

pub trait ConfigStore: Send + Sync {
    fn save(
        &self,
        state: &ThermostatState,
    ) -> impl Future<Output = Result<(), ConfigStoreError>> + Send;
}

/// Opaque weather payload, kept only as "most recent".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSnapshot {
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl ForecastSnapshot {
    pub fn new(payload: serde_json::Value, received_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            received_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollaboratorEvent {
    /// Full switch list as last reported by the relay hardware.
    RelayUpdate(Vec<RelaySwitch>),
    Forecast(ForecastSnapshot),
}
