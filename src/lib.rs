//! Xray launcher library.
//!
//! Resolves which config files to load, drives the proxy engine through
//! dump/test/run modes and, on macOS, keeps the system SOCKS proxy and the
//! tray icon in step with the running server.

pub mod cli;
pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod observability;
pub mod sysproxy;
pub mod tray;

pub use config::{ConfigFormat, ConfigLocator, ConfigSource, LocatorInputs};
pub use engine::{ProxyEngine, ServerHandle};
pub use lifecycle::{ExitStatus, Launcher, RunMode, Termination};
