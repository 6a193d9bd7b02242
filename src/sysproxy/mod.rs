//! System-wide SOCKS proxy control.
//!
//! # Data Flow
//! ```text
//! Startup:   ProxyToggle::arm → controller.enable → tray shows "Disable"
//! Tray:      toggle click     → controller.enable/disable → icon + label
//! Shutdown:  ProxyToggle::shutdown → controller.disable (exactly once)
//! ```
//!
//! # Design Decisions
//! - The platform capability is picked once at startup, not checked at call sites
//! - OS command failures are logged; the toggle state still follows intent

pub mod networksetup;
pub mod toggle;

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use thiserror::Error;

pub use networksetup::{CommandRunner, NetworkSetup, SystemRunner};
pub use toggle::{ProxyState, ProxyToggle};

/// Default SOCKS port the system proxy points at.
pub const DEFAULT_PORT: u16 = 19800;

/// Default network service name.
pub const DEFAULT_DEVICE: &str = "Wi-Fi";

/// Address the system proxy points at.
pub const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Network device and local port the system proxy is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyBinding {
    pub device: String,
    pub port: u16,
}

impl ProxyBinding {
    pub fn new(device: impl Into<String>, port: u16) -> Self {
        Self {
            device: device.into(),
            port,
        }
    }

    pub fn host(&self) -> IpAddr {
        LOOPBACK
    }
}

impl Default for ProxyBinding {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE, DEFAULT_PORT)
    }
}

impl fmt::Display for ProxyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}:{}", self.device, self.host(), self.port)
    }
}

/// An OS network-configuration command failed.
#[derive(Debug, Error)]
pub enum ProxyCommandError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Status {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Capability to switch the OS SOCKS proxy setting.
pub trait SystemProxyController: Send + Sync {
    /// Point the device's SOCKS proxy at the binding and switch it on.
    fn enable(&self, binding: &ProxyBinding) -> Result<(), ProxyCommandError>;

    /// Switch the device's SOCKS proxy off.
    fn disable(&self, binding: &ProxyBinding) -> Result<(), ProxyCommandError>;

    /// Whether this controller changes anything on the host.
    fn is_native(&self) -> bool {
        true
    }
}

/// Controller for platforms without a native toggle.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopController;

impl SystemProxyController for NoopController {
    fn enable(&self, binding: &ProxyBinding) -> Result<(), ProxyCommandError> {
        tracing::debug!(%binding, "System proxy not supported on this platform, skipping enable");
        Ok(())
    }

    fn disable(&self, binding: &ProxyBinding) -> Result<(), ProxyCommandError> {
        tracing::debug!(device = %binding.device, "System proxy not supported on this platform, skipping disable");
        Ok(())
    }

    fn is_native(&self) -> bool {
        false
    }
}

/// The controller for the platform this binary was built for.
pub fn platform_controller() -> Arc<dyn SystemProxyController> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(NetworkSetup::new(SystemRunner))
    }

    #[cfg(not(target_os = "macos"))]
    {
        Arc::new(NoopController)
    }
}
