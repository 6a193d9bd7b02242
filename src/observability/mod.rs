//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → logging.rs subscriber (stderr, EnvFilter)
//! ```
//!
//! # Design Decisions
//! - stdout is reserved for command output (`--dump`, `--test`)
//! - `RUST_LOG` overrides the built-in level

pub mod logging;
