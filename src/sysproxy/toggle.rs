//! System proxy toggle state machine.
//!
//! # States
//! - Enabled: OS SOCKS proxy on, tray label "Disable"
//! - Disabled: OS SOCKS proxy off, tray label "Enable"
//!
//! # State Transitions
//! ```text
//! Enabled  → Disabled: toggle click, or shutdown
//! Disabled → Enabled:  toggle click (before shutdown only)
//! ```
//!
//! # Design Decisions
//! - All transitions go through one mutex, so a click cannot interleave with shutdown
//! - State follows intent even when the OS command fails

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{ProxyBinding, SystemProxyController};
use crate::tray::{TrayGlyph, TrayView};

/// Whether the system proxy is meant to be on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    Enabled,
    Disabled,
}

impl ProxyState {
    pub fn toggled(self) -> Self {
        match self {
            ProxyState::Enabled => ProxyState::Disabled,
            ProxyState::Disabled => ProxyState::Enabled,
        }
    }

    /// Label of the toggle menu item: the action a click performs.
    pub fn menu_label(self) -> &'static str {
        match self {
            ProxyState::Enabled => "Disable",
            ProxyState::Disabled => "Enable",
        }
    }

    pub fn glyph(self) -> TrayGlyph {
        match self {
            ProxyState::Enabled => TrayGlyph::Active,
            ProxyState::Disabled => TrayGlyph::Inactive,
        }
    }
}

impl fmt::Display for ProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyState::Enabled => f.write_str("enabled"),
            ProxyState::Disabled => f.write_str("disabled"),
        }
    }
}

struct Inner {
    state: ProxyState,
    shut_down: bool,
}

/// Owner of [`ProxyState`].
pub struct ProxyToggle {
    binding: ProxyBinding,
    controller: Arc<dyn SystemProxyController>,
    view: Arc<dyn TrayView>,
    inner: Mutex<Inner>,
}

impl ProxyToggle {
    /// Enable the system proxy and show the tray in the enabled state.
    pub fn arm(
        binding: ProxyBinding,
        controller: Arc<dyn SystemProxyController>,
        view: Arc<dyn TrayView>,
    ) -> Self {
        let toggle = Self {
            binding,
            controller,
            view,
            inner: Mutex::new(Inner {
                state: ProxyState::Enabled,
                shut_down: false,
            }),
        };
        toggle.apply(ProxyState::Enabled);
        toggle.view.show(ProxyState::Enabled);
        toggle
    }

    pub fn binding(&self) -> &ProxyBinding {
        &self.binding
    }

    pub fn state(&self) -> ProxyState {
        self.inner.lock().state
    }

    /// Handle a toggle click. Returns the new state.
    ///
    /// Ignored once shutdown has run.
    pub fn toggle(&self) -> ProxyState {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            tracing::debug!("Ignoring proxy toggle during shutdown");
            return inner.state;
        }

        let next = inner.state.toggled();
        self.apply(next);
        self.view.present(next);
        inner.state = next;
        next
    }

    /// Switch the system proxy off for good.
    ///
    /// Runs the disable command regardless of the current state, exactly once;
    /// later calls return `false` without touching the OS.
    pub fn shutdown(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            return false;
        }
        inner.shut_down = true;

        self.apply(ProxyState::Disabled);
        inner.state = ProxyState::Disabled;
        true
    }

    fn apply(&self, state: ProxyState) {
        let result = match state {
            ProxyState::Enabled => self.controller.enable(&self.binding),
            ProxyState::Disabled => self.controller.disable(&self.binding),
        };

        match result {
            Ok(()) if self.controller.is_native() => {
                tracing::info!(binding = %self.binding, %state, "System proxy updated");
            }
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(binding = %self.binding, %state, error = %e, "Failed to update system proxy");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sysproxy::ProxyCommandError;

    #[derive(Default)]
    struct Calls {
        log: Mutex<Vec<String>>,
    }

    struct FakeController {
        calls: Arc<Calls>,
        fail: bool,
    }

    impl SystemProxyController for FakeController {
        fn enable(&self, binding: &ProxyBinding) -> Result<(), ProxyCommandError> {
            self.calls.log.lock().push(format!("enable {} {}", binding.device, binding.port));
            self.result()
        }

        fn disable(&self, binding: &ProxyBinding) -> Result<(), ProxyCommandError> {
            self.calls.log.lock().push(format!("disable {}", binding.device));
            self.result()
        }
    }

    impl FakeController {
        fn result(&self) -> Result<(), ProxyCommandError> {
            if self.fail {
                return Err(ProxyCommandError::Spawn {
                    program: "networksetup".into(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
                });
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeView {
        shown: Mutex<Vec<(ProxyState, TrayGlyph, &'static str)>>,
    }

    impl TrayView for FakeView {
        fn show(&self, state: ProxyState) {
            self.present(state);
        }

        fn present(&self, state: ProxyState) {
            self.shown.lock().push((state, state.glyph(), state.menu_label()));
        }
    }

    fn armed(fail: bool) -> (ProxyToggle, Arc<Calls>, Arc<FakeView>) {
        let calls = Arc::new(Calls::default());
        let view = Arc::new(FakeView::default());
        let controller = Arc::new(FakeController {
            calls: calls.clone(),
            fail,
        });
        let toggle = ProxyToggle::arm(ProxyBinding::new("Wi-Fi", 19800), controller, view.clone());
        (toggle, calls, view)
    }

    #[test]
    fn test_arm_enables_proxy() {
        let (toggle, calls, view) = armed(false);

        assert_eq!(toggle.state(), ProxyState::Enabled);
        assert_eq!(*calls.log.lock(), vec!["enable Wi-Fi 19800"]);
        assert_eq!(
            *view.shown.lock(),
            vec![(ProxyState::Enabled, TrayGlyph::Active, "Disable")]
        );
    }

    #[test]
    fn test_toggle_round_trip_keeps_binding() {
        let (toggle, calls, view) = armed(false);

        assert_eq!(toggle.toggle(), ProxyState::Disabled);
        assert_eq!(toggle.binding(), &ProxyBinding::new("Wi-Fi", 19800));
        assert_eq!(toggle.toggle(), ProxyState::Enabled);
        assert_eq!(toggle.binding(), &ProxyBinding::new("Wi-Fi", 19800));

        assert_eq!(
            *calls.log.lock(),
            vec!["enable Wi-Fi 19800", "disable Wi-Fi", "enable Wi-Fi 19800"]
        );
        assert_eq!(
            view.shown.lock()[1..],
            [
                (ProxyState::Disabled, TrayGlyph::Inactive, "Enable"),
                (ProxyState::Enabled, TrayGlyph::Active, "Disable"),
            ]
        );
    }

    #[test]
    fn test_shutdown_disables_exactly_once() {
        for clicks in 0..4 {
            let (toggle, calls, _) = armed(false);
            for _ in 0..clicks {
                toggle.toggle();
            }
            let before = calls.log.lock().len();

            assert!(toggle.shutdown());
            assert!(!toggle.shutdown());
            toggle.toggle();

            let log = calls.log.lock();
            assert_eq!(log.len(), before + 1);
            assert_eq!(log[before], "disable Wi-Fi");
            assert_eq!(toggle.state(), ProxyState::Disabled);
        }
    }

    #[test]
    fn test_failed_command_still_updates_state() {
        let (toggle, calls, view) = armed(true);

        assert_eq!(toggle.toggle(), ProxyState::Disabled);
        assert_eq!(toggle.state(), ProxyState::Disabled);
        assert_eq!(calls.log.lock().len(), 2);
        assert_eq!(view.shown.lock().last().unwrap().2, "Enable");
    }
}
