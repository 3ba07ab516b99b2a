use std::{future::Future, time::Duration};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const RESTART_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF_STEPS: u32 = 30;

/// Runs `factory()` as a task and starts a fresh one whenever it fails or
/// panics. State shared through the factory's captures survives the restart.
pub fn supervise<F, Fut>(name: &'static str, factory: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    supervise_with_backoff(name, RESTART_BACKOFF, factory)
}

pub fn supervise_with_backoff<F, Fut>(
    name: &'static str,
    backoff: Duration,
    factory: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut restarts: u32 = 0;
        loop {
            match tokio::spawn(factory()).await {
                Ok(Ok(())) => {
                    info!("{name} task finished");
                    return;
                }
                Ok(Err(err)) => warn!("{name} task failed: {err:#}"),
                Err(err) if err.is_panic() => error!("{name} task panicked"),
                Err(err) => {
                    info!("{name} task cancelled: {err}");
                    return;
                }
            }

            restarts = restarts.saturating_add(1);
            let delay = backoff.saturating_mul(restarts.min(MAX_BACKOFF_STEPS));
            info!("restarting {name} task in {delay:?} (restart #{restarts})");
            tokio::time::sleep(delay).await;
        }
    })
}
