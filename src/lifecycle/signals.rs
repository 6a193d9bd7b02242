//! OS signal handling.
//!
//! SIGINT and SIGTERM (Ctrl+C on non-Unix) end the run. The listener fires
//! the termination event once and stops listening.

use std::future::Future;
use std::io;

use tokio::signal;
use tokio::task::JoinHandle;

use super::shutdown::{Termination, TerminationCause};

/// Resolve on the first interrupt or terminate signal.
pub async fn interrupt_or_terminate() -> io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await
    }
}

/// Spawn the signal listener.
///
/// If handlers cannot be installed the error is logged and the tray remains
/// the only way to stop.
pub fn spawn_listener<S>(signal: S, termination: Termination) -> JoinHandle<()>
where
    S: Future<Output = io::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                termination.trigger(TerminationCause::Signal);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
            }
        }
    })
}
