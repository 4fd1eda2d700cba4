//! Shutdown signalling

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

/// Fires a [`ShutdownToken`] once.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Completes once shutdown has been requested.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> (Self, ShutdownToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ShutdownToken { rx })
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl ShutdownToken {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is requested. Also completes if the [`Shutdown`]
    /// handle is dropped.
    pub async fn cancelled(&mut self) {
        // An error means the sender is gone, which is as good as a trigger
        let _ = self.rx.wait_for(|&triggered| triggered).await;
    }
}

/// Trigger `shutdown` on the first SIGINT or SIGTERM.
///
/// The handlers are installed before this returns; the waiting runs in a
/// spawned task.
pub fn listen_for_signals(shutdown: Shutdown) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).context("Unable to install SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Unable to install SIGTERM handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down"),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
        }
        shutdown.trigger();
    });

    Ok(())
}
