//! Graceful shutdown on SIGINT/SIGTERM

use std::future::Future;
use std::io;

use tokio::sync::mpsc;
use tracing::{error, info};

/// Resolves with the name of the first termination signal delivered.
pub async fn termination_signal() -> io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT"),
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "SIGINT")
    }
}

/// Spawn a task that sends one shutdown request once `signal` resolves.
///
/// When the handler cannot be installed the sender stays alive, so the relay
/// loop keeps running until the process is killed.
pub fn forward_shutdown<F>(signal: F) -> mpsc::Receiver<()>
where
    F: Future<Output = io::Result<&'static str>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        match signal.await {
            Ok(name) => {
                info!(signal = name, "Shutdown requested, stopping after the current cycle");
                let _ = tx.send(()).await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handlers");
                let _held = tx;
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}
