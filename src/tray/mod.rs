//! Tray control surface.
//!
//! # Data Flow
//! ```text
//! platform event loop (menu click)
//!     → TrayAction over an mpsc channel
//!     → menu task
//!         Quit        → Termination::trigger
//!         ToggleProxy → ProxyToggle::toggle → TrayView::present
//! ```
//!
//! # Design Decisions
//! - UI callbacks never exit the process; the orchestrator decides when to stop
//! - Presentation goes through `TrayView` so headless builds share the same flow

#[cfg(target_os = "macos")]
pub mod native;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::{Termination, TerminationCause};
use crate::sysproxy::{ProxyState, ProxyToggle};

/// Menu selections the tray reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayAction {
    Quit,
    ToggleProxy,
}

/// Icon shown in the status area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayGlyph {
    Active,
    Inactive,
}

#[derive(Debug, Error)]
pub enum TrayError {
    #[error("failed to create event loop: {0}")]
    EventLoop(String),

    #[error("failed to build tray icon: {0}")]
    Icon(String),

    #[error("failed to build tray menu: {0}")]
    Menu(String),
}

/// Presentation side of the tray.
pub trait TrayView: Send + Sync {
    /// Put the tray on screen in the given state.
    fn show(&self, state: ProxyState) {
        self.present(state);
    }

    /// Update icon and toggle label to match `state`.
    fn present(&self, state: ProxyState);
}

/// View for runs without a status area.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessTray;

impl TrayView for HeadlessTray {
    fn present(&self, state: ProxyState) {
        tracing::debug!(%state, label = state.menu_label(), "Tray presentation (headless)");
    }
}

/// Everything the orchestrator needs from a tray.
pub struct TrayLink {
    pub view: Arc<dyn TrayView>,
    pub actions: mpsc::UnboundedReceiver<TrayAction>,
}

impl TrayLink {
    pub fn new(view: Arc<dyn TrayView>, actions: mpsc::UnboundedReceiver<TrayAction>) -> Self {
        Self { view, actions }
    }

    /// A tray that shows nothing and never reports a click.
    pub fn headless() -> Self {
        let (_, actions) = mpsc::unbounded_channel();
        Self::new(Arc::new(HeadlessTray), actions)
    }
}

/// Something that can run the launcher next to a status-area tray.
pub trait TrayHost {
    fn run<T, F>(self, body: F) -> Result<T, TrayError>
    where
        F: FnOnce(TrayLink) -> T + Send + 'static,
        T: Send + 'static;
}

/// Run `body` with the tray from `host`, or headless when no tray could be opened.
pub fn run_with_fallback<H, T, F>(host: Result<H, TrayError>, body: F) -> Result<T, TrayError>
where
    H: TrayHost,
    F: FnOnce(TrayLink) -> T + Send + 'static,
    T: Send + 'static,
{
    match host {
        Ok(host) => host.run(body),
        Err(e) => {
            tracing::warn!(error = %e, "Tray unavailable, running without it");
            Ok(body(TrayLink::headless()))
        }
    }
}

/// Spawn the task owning menu-click handling.
///
/// Ends after a quit selection or when the tray drops its sender.
pub fn spawn_menu_task(
    mut actions: mpsc::UnboundedReceiver<TrayAction>,
    toggle: Arc<ProxyToggle>,
    termination: Termination,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(action) = actions.recv().await {
            match action {
                TrayAction::Quit => {
                    tracing::info!("Quit selected from tray");
                    termination.trigger(TerminationCause::TrayQuit);
                    break;
                }
                TrayAction::ToggleProxy => {
                    let toggle = toggle.clone();
                    match tokio::task::spawn_blocking(move || toggle.toggle()).await {
                        Ok(state) => tracing::info!(%state, "System proxy toggled from tray"),
                        Err(e) => tracing::error!(error = %e, "Proxy toggle task failed"),
                    }
                }
            }
        }
        tracing::debug!("Tray menu task finished");
    })
}
