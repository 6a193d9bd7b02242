//! Launcher orchestration.
//!
//! # Responsibilities
//! - Resolve config sources
//! - Dump or test the config and exit, or build and start the server
//! - Arm the system proxy toggle and the listeners once the server runs
//! - Block on the termination event, then tear down in order
//!
//! Engine and `networksetup` calls block, so they run on the blocking pool.

use std::fmt;
use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::{ConfigLocator, ConfigSource};
use crate::engine::{EngineError, ProxyEngine, ServerHandle};
use crate::lifecycle::shutdown::{Termination, TerminationCause};
use crate::lifecycle::{signals, ExitStatus};
use crate::sysproxy::{NoopController, ProxyBinding, ProxyToggle, SystemProxyController};
use crate::tray::{spawn_menu_task, TrayLink};

/// How often a running server is checked for having stopped on its own.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What a run does after resolving config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Print the merged config and exit.
    Dump,
    /// Build the server without starting it and exit.
    Test,
    /// Start the server and run until terminated.
    Serve,
}

impl RunMode {
    /// Dump takes precedence over test.
    pub fn from_flags(dump: bool, test: bool) -> Self {
        match (dump, test) {
            (true, _) => RunMode::Dump,
            (false, true) => RunMode::Test,
            (false, false) => RunMode::Serve,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Resolving,
    DumpAndExit,
    TestAndExit,
    Starting,
    Running,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Drives one launcher invocation from config resolution to exit.
pub struct Launcher {
    engine: Arc<dyn ProxyEngine>,
    locator: ConfigLocator,
    binding: ProxyBinding,
    controller: Arc<dyn SystemProxyController>,
    output: Box<dyn Write + Send>,
    phase: Phase,
}

impl Launcher {
    pub fn new(engine: Arc<dyn ProxyEngine>, locator: ConfigLocator) -> Self {
        Self {
            engine,
            locator,
            binding: ProxyBinding::default(),
            controller: Arc::new(NoopController),
            output: Box::new(io::stdout()),
            phase: Phase::Init,
        }
    }

    /// Set the system proxy binding and the controller that applies it.
    pub fn with_system_proxy(mut self, binding: ProxyBinding, controller: Arc<dyn SystemProxyController>) -> Self {
        self.binding = binding;
        self.controller = controller;
        self
    }

    /// Where dump and test results are written. Defaults to stdout.
    pub fn with_output(mut self, output: Box<dyn Write + Send>) -> Self {
        self.output = output;
        self
    }

    fn enter(&mut self, next: Phase) {
        tracing::debug!(from = %self.phase, to = %next, "Lifecycle transition");
        self.phase = next;
    }

    /// Run to completion.
    ///
    /// `signal` resolves when the OS asks the process to stop; it is only
    /// polled once the server is running.
    pub async fn run<S>(mut self, mode: RunMode, tray: TrayLink, signal: S) -> ExitStatus
    where
        S: Future<Output = io::Result<()>> + Send + 'static,
    {
        self.enter(Phase::Resolving);
        let source = match self.locator.resolve(mode != RunMode::Dump) {
            Ok(source) => source,
            Err(e) => {
                tracing::error!(error = %e, "Failed to resolve config");
                return ExitStatus::ConfigError;
            }
        };
        tracing::debug!(sources = %source, format = %source.format(), "Config resolved");

        match mode {
            RunMode::Dump => self.dump(&source),
            RunMode::Test => self.test(&source).await,
            RunMode::Serve => self.serve(&source, tray, signal).await,
        }
    }

    fn dump(&mut self, source: &ConfigSource) -> ExitStatus {
        self.enter(Phase::DumpAndExit);

        let document = match self.engine.merge(source) {
            Ok(document) => document,
            Err(e) => {
                tracing::error!(error = %e, "Failed to merge config");
                return ExitStatus::ConfigError;
            }
        };

        let written = serde_json::to_string_pretty(&document)
            .map_err(io::Error::from)
            .and_then(|text| writeln!(self.output, "{}", text))
            .and_then(|_| self.output.flush());
        if let Err(e) = written {
            tracing::error!(error = %e, "Failed to write merged config");
            return ExitStatus::ConfigError;
        }
        ExitStatus::Success
    }

    async fn test(&mut self, source: &ConfigSource) -> ExitStatus {
        self.enter(Phase::TestAndExit);

        let engine = self.engine.clone();
        let owned = source.clone();
        match blocking(move || engine.build(&owned)).await {
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::error!(error = %e, "Failed to start");
                return build_failure(&e);
            }
            None => return ExitStatus::StartFailure,
        }

        let _ = writeln!(self.output, "Configuration OK.").and_then(|_| self.output.flush());
        ExitStatus::Success
    }

    async fn serve<S>(&mut self, source: &ConfigSource, tray: TrayLink, signal: S) -> ExitStatus
    where
        S: Future<Output = io::Result<()>> + Send + 'static,
    {
        self.enter(Phase::Starting);

        let engine = self.engine.clone();
        let owned = source.clone();
        let server = match blocking(move || engine.build(&owned)).await {
            Some(Ok(server)) => server,
            Some(Err(e)) => {
                tracing::error!(error = %e, "Failed to start");
                return build_failure(&e);
            }
            None => return ExitStatus::StartFailure,
        };

        let started = blocking(move || {
            let mut server = server;
            let result = server.start();
            (server, result)
        })
        .await;
        let mut server = match started {
            Some((server, Ok(()))) => server,
            Some((_, Err(e))) => {
                tracing::error!(error = %e, "Failed to start");
                return ExitStatus::StartFailure;
            }
            None => return ExitStatus::StartFailure,
        };

        // Config parsing leftovers are garbage from here on.
        server.reclaim();
        self.enter(Phase::Running);
        let server = Arc::new(Mutex::new(server));

        let binding = self.binding.clone();
        let controller = self.controller.clone();
        let view = tray.view.clone();
        let Some(toggle) = blocking(move || ProxyToggle::arm(binding, controller, view)).await else {
            close_server(server).await;
            return ExitStatus::StartFailure;
        };
        let toggle = Arc::new(toggle);

        let termination = Termination::new();
        let signal_listener = signals::spawn_listener(signal, termination.clone());
        let menu_task = spawn_menu_task(tray.actions, toggle.clone(), termination.clone());
        let exit_watch = spawn_exit_watch(server.clone(), termination.clone());
        tracing::info!(sources = %source, "Server running");

        let cause = termination.wait().await;
        self.enter(Phase::ShuttingDown);
        tracing::info!(?cause, "Shutting down");

        signal_listener.abort();
        menu_task.abort();
        exit_watch.abort();

        // Proxy off before the server goes away.
        blocking(move || toggle.shutdown()).await;
        close_server(server).await;

        self.enter(Phase::Terminated);
        tracing::info!("Shutdown complete");
        match cause {
            TerminationCause::EngineExited => ExitStatus::StartFailure,
            TerminationCause::Signal | TerminationCause::TrayQuit => ExitStatus::Success,
        }
    }
}

/// Exit status for a failed build: rejected config is 23, anything else is a start failure.
fn build_failure(err: &EngineError) -> ExitStatus {
    if err.is_config_error() {
        ExitStatus::ConfigError
    } else {
        ExitStatus::StartFailure
    }
}

/// Run blocking work off the async workers. `None` if it panicked.
async fn blocking<T, F>(work: F) -> Option<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(error = %e, "Blocking launcher task failed");
            None
        }
    }
}

async fn close_server(server: Arc<Mutex<Box<dyn ServerHandle>>>) {
    let closed = blocking(move || {
        let mut server = server.lock();
        server.close()
    })
    .await;
    if let Some(Err(e)) = closed {
        tracing::debug!(error = %e, "Ignoring server close failure at exit");
    }
}

/// Fire `termination` when the server stops without being asked to.
fn spawn_exit_watch(server: Arc<Mutex<Box<dyn ServerHandle>>>, termination: Termination) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(EXIT_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            let exited = server.lock().poll_exit();
            if let Some(reason) = exited {
                tracing::error!(%reason, "Engine stopped unexpectedly");
                termination.trigger(TerminationCause::EngineExited);
                return;
            }
        }
    })
}
