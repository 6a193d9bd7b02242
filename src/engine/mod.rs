//! Proxy engine seam.
//!
//! The launcher never interprets the proxy config itself. It needs three
//! things from an engine: merge config sources into one document, build a
//! runnable server from them, and start/close that server.
//!
//! # Data Flow
//! ```text
//! ConfigSource
//!     → ProxyEngine::merge  (dump mode)
//!     → ProxyEngine::build  (test and run modes, engine validates the config)
//!     → ServerHandle::start → reclaim → poll_exit ... → close
//! ```

pub mod child;

use std::io;

use serde_json::Value;
use thiserror::Error;

use crate::config::{ConfigSource, LoadError};

pub use child::{ChildProcessEngine, ChildServer};

/// Errors reported by an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Config sources could not be merged.
    #[error("failed to load config files {sources}: {source}")]
    Merge {
        sources: String,
        #[source]
        source: LoadError,
    },

    /// The merged config was rejected while building the server.
    #[error("failed to create server: {0}")]
    Build(String),

    /// The server could not be started.
    #[error("failed to start server: {0}")]
    Start(String),

    /// The engine program itself could not be run.
    #[error("failed to run engine {program}: {source}")]
    Unavailable {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Closing the server failed.
    #[error("failed to close server: {0}")]
    Close(String),
}

impl EngineError {
    /// Whether the config, rather than the engine or the host, is at fault.
    pub fn is_config_error(&self) -> bool {
        matches!(self, EngineError::Merge { .. } | EngineError::Build(_))
    }

    pub fn merge(source: &ConfigSource, err: LoadError) -> Self {
        EngineError::Merge {
            sources: source.to_string(),
            source: err,
        }
    }
}

/// A server built from config, owned by the orchestrator.
pub trait ServerHandle: Send {
    /// Start serving. Called at most once.
    fn start(&mut self) -> Result<(), EngineError>;

    /// Release state that was only needed to start.
    fn reclaim(&mut self) {}

    /// `Some(reason)` once the server has stopped on its own.
    ///
    /// Polled while running; must not block.
    fn poll_exit(&mut self) -> Option<String> {
        None
    }

    /// Stop serving. Called at most once, only after a successful start.
    fn close(&mut self) -> Result<(), EngineError>;
}

/// Engine operations the launcher consumes.
pub trait ProxyEngine: Send + Sync {
    /// Merge config sources into one document.
    fn merge(&self, source: &ConfigSource) -> Result<Value, EngineError>;

    /// Build a server from config without starting it.
    fn build(&self, source: &ConfigSource) -> Result<Box<dyn ServerHandle>, EngineError>;
}
