//! Repeating background jobs on the tokio runtime.

use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Owns one periodic task. Dropping the handle aborts the task.
pub struct BackgroundTask {
    name: &'static str,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Run `tick` every `period` on the current runtime, first one full
    /// period after the call.
    pub fn spawn_periodic(
        name: &'static str,
        period: Duration,
        mut tick: impl FnMut() + Send + 'static,
    ) -> Result<Self, TryCurrentError> {
        let runtime = Handle::try_current()?;
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = runtime.spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(task = name, period_secs = period.as_secs(), "Background task started");

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => tick(),
                }
            }
            tracing::info!(task = name, "Background task stopped");
        });

        Ok(Self {
            name,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ask the task to exit after its current tick and wait for it.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(task = self.name, "Background task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Re-write the current snapshot every `period`.
pub fn spawn_autosave(store: Arc<Store>, period: Duration) -> Result<BackgroundTask, TryCurrentError> {
    BackgroundTask::spawn_periodic("autosave", period, move || {
        if let Err(e) = store.persist() {
            tracing::error!("Autosave failed: {}", e);
        }
    })
}
