use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use tokio::sync::Mutex;

use thermostat_common::{ConfigStore, ConfigStoreError, RuntimeConfig, ThermostatState};

/// JSON-file backed runtime configuration.
#[derive(Clone)]
pub struct AppStore {
    runtime_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl AppStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_env() -> Self {
        let data_dir = std::env::var("THERMOSTAT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.thermostat"));
        Self::new(data_dir)
    }

    pub async fn runtime_config_exists(&self) -> Result<bool, ConfigStoreError> {
        Ok(tokio::fs::try_exists(self.runtime_path.as_ref()).await?)
    }

    pub async fn load_runtime_config(&self) -> Result<RuntimeConfig, ConfigStoreError> {
        let _guard = self.lock.lock().await;
        self.read_runtime().await
    }

    pub async fn save_runtime_config(
        &self,
        runtime: &RuntimeConfig,
    ) -> Result<(), ConfigStoreError> {
        let _guard = self.lock.lock().await;
        self.write_runtime(runtime).await
    }

    async fn read_runtime(&self) -> Result<RuntimeConfig, ConfigStoreError> {
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_runtime(&self, runtime: &RuntimeConfig) -> Result<(), ConfigStoreError> {
        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        // The runtime file is only ever replaced whole, via rename.
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, payload).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(())
    }
}

impl ConfigStore for AppStore {
    async fn save(&self, state: &ThermostatState) -> Result<(), ConfigStoreError> {
        let _guard = self.lock.lock().await;
        let mut runtime = self.read_runtime().await?;
        runtime.thermostat_state = *state;
        self.write_runtime(&runtime).await
    }
}
