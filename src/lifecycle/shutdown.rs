//! Shutdown coordination for the launcher.

use std::sync::Arc;

use tokio::sync::watch;

/// What ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    /// SIGINT or SIGTERM.
    Signal,
    /// "Quit" picked from the tray menu.
    TrayQuit,
    /// The engine stopped on its own while running.
    EngineExited,
}

/// Single-fire termination event.
///
/// Any number of sources may call [`Termination::trigger`]; only the first
/// call is recorded and every waiter observes that cause.
#[derive(Clone)]
pub struct Termination {
    tx: Arc<watch::Sender<Option<TerminationCause>>>,
}

impl Termination {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the event. Returns `false` if it had already fired.
    pub fn trigger(&self, cause: TerminationCause) -> bool {
        let fired = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(cause);
            true
        });
        if fired {
            tracing::info!(?cause, "Termination requested");
        }
        fired
    }

    /// The recorded cause, if the event has fired.
    pub fn cause(&self) -> Option<TerminationCause> {
        *self.tx.borrow()
    }

    /// Wait until the event fires.
    pub async fn wait(&self) -> TerminationCause {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(cause) = *rx.borrow_and_update() {
                return cause;
            }
            // The sender lives in `self`, so the channel cannot close here.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for Termination {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_trigger_wins() {
        let termination = Termination::new();
        assert!(termination.cause().is_none());

        assert!(termination.trigger(TerminationCause::TrayQuit));
        assert!(!termination.trigger(TerminationCause::Signal));

        assert_eq!(termination.wait().await, TerminationCause::TrayQuit);
        assert_eq!(termination.cause(), Some(TerminationCause::TrayQuit));
    }

    #[tokio::test]
    async fn test_waiter_unblocked_by_other_task() {
        let termination = Termination::new();
        let waiter = {
            let termination = termination.clone();
            tokio::spawn(async move { termination.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        termination.trigger(TerminationCause::Signal);

        let cause = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
        assert_eq!(cause, TerminationCause::Signal);
    }
}
