//! Background loop plumbing shared by the override cleanup and record
//! purge tasks.
//!
//! Each loop is a tokio task driven by a ticker and a stop signal; the
//! handle joins the task on shutdown so outstanding work is never
//! abandoned mid-store.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to a periodic background task.
pub struct BackgroundTask {
    label: &'static str,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Spawn a loop that runs `tick` every `period` until shut down.
    ///
    /// The first tick fires after one full period. Ticks run on the
    /// tokio runtime the caller spawns from.
    pub fn spawn(
        label: &'static str,
        period: Duration,
        tick: impl Fn() + Send + 'static,
    ) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // Consume the immediate first tick so the loop waits a full
            // period before doing work.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => tick(),
                    _ = stopped.changed() => break,
                }
            }
        });
        Self {
            label,
            stop,
            handle,
        }
    }

    /// Signal the loop to stop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if self.handle.await.is_err() {
            tracing::warn!(task = self.label, "background task panicked before shutdown");
        }
    }

    /// Task label, for logs.
    pub fn label(&self) -> &'static str {
        self.label
    }
}
