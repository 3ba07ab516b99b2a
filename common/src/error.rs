use thiserror::Error;

use crate::types::SwitchType;

#[derive(Debug, Error)]
pub enum ActuationError {
    #[error("relay rejected {command} command: {reason}")]
    Rejected { command: SwitchType, reason: String },
    #[error("relay {command} command timed out after {timeout_ms} ms")]
    TimedOut { command: SwitchType, timeout_ms: u64 },
}

#[derive(Debug, Error)]
pub enum SensorFetchError {
    #[error("sensor request failed: {0}")]
    Network(String),
    #[error("sensor responded with HTTP {0}")]
    Status(u16),
    #[error("sensor request timed out after {0} ms")]
    TimedOut(u64),
    #[error("malformed sensor response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("config store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}
