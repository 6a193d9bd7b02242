//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Init → Resolving ─┬─ dump  → DumpAndExit
//!                   ├─ test  → TestAndExit
//!                   └─ run   → Starting → Running → ShuttingDown → Terminated
//!
//! Running:
//!     signals.rs  (SIGINT/SIGTERM) ─┐
//!     tray menu task (Quit)        ─┼→ shutdown.rs Termination (fires once)
//!     engine exit watch            ─┘
//! ```
//!
//! # Design Decisions
//! - Fail fast: anything before the server runs is fatal
//! - After Start, failures are logged and the run continues
//! - Ordered shutdown: disable system proxy, then close the server

pub mod orchestrator;
pub mod shutdown;
pub mod signals;

use std::process::ExitCode;

pub use orchestrator::{Launcher, Phase, RunMode};
pub use shutdown::{Termination, TerminationCause};

/// Exit code for configuration problems.
///
/// Kept apart from generic failures so a supervisor set to restart on crash
/// does not loop on a bad config.
pub const EXIT_CONFIG_ERROR: u8 = 23;

/// Exit code for an engine that could not be run, failed to start or died while running.
pub const EXIT_START_FAILURE: u8 = 255;

/// How a launcher run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    ConfigError,
    StartFailure,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::ConfigError => EXIT_CONFIG_ERROR,
            ExitStatus::StartFailure => EXIT_START_FAILURE,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}
