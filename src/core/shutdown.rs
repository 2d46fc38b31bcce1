// Cooperative shutdown for the poll loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{info, warn};

/// Stop flag checked at the top of every iteration. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct GracefulShutdown {
    shutdown_signal: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initiate_shutdown(&self) {
        if !self.shutdown_signal.swap(true, Ordering::SeqCst) {
            info!("🛑 Graceful shutdown initiated, finishing the current iteration");
        }
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_signal.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless shutdown starts first. Returns true when interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_shutting_down() {
            return true;
        }
        tokio::select! {
            _ = &mut notified => true,
            _ = tokio::time::sleep(duration) => self.is_shutting_down(),
        }
    }

    /// Flip the flag on SIGINT or SIGTERM
    pub fn listen_for_signals(&self) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            shutdown.initiate_shutdown();
        });
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                _ = term.recv() => info!("Received SIGTERM"),
            }
        }
        Err(e) => {
            warn!("⚠️  Cannot listen for SIGTERM ({}), only Ctrl+C stops the bot", e);
            let _ = tokio::signal::ctrl_c().await;
            info!("Received SIGINT");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received Ctrl+C");
}
