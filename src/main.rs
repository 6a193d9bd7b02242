//! Xray launcher.
//!
//! # Architecture Overview
//!
//! ```text
//!   flags + env ──▶ config::locator ──▶ ConfigSource
//!                                           │
//!                                           ▼
//!                              lifecycle::Launcher ──▶ engine (build/start/close)
//!                                           │
//!                      ┌────────────────────┼─────────────────────┐
//!                      ▼                    ▼                     ▼
//!               signal listener       tray menu task       sysproxy::ProxyToggle
//!                      │                    │                     │
//!                      └──── Termination ◀──┘            networksetup (macOS)
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use xray_launcher::cli::{Cli, RunArgs};
use xray_launcher::config::ConfigLocator;
use xray_launcher::engine::ChildProcessEngine;
use xray_launcher::lifecycle::{signals, ExitStatus, Launcher, RunMode};
use xray_launcher::observability::logging;
use xray_launcher::sysproxy;
use xray_launcher::tray::TrayLink;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let Some(args) = cli.into_run_args() else {
        println!("xray-launcher {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    };

    let mode = args.mode();
    logging::init(if mode == RunMode::Dump {
        logging::QUIET_DIRECTIVE
    } else {
        logging::DEFAULT_DIRECTIVE
    });

    if mode != RunMode::Dump {
        tracing::info!(version = env!("CARGO_PKG_VERSION"), "xray-launcher starting");
    }

    run(args).into()
}

fn run(args: RunArgs) -> ExitStatus {
    #[cfg(target_os = "macos")]
    if !args.no_tray && args.mode() == RunMode::Serve {
        let host = xray_launcher::tray::native::NativeHost::open("xray");
        return match xray_launcher::tray::run_with_fallback(host, move |tray| launch(args, tray)) {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(error = %e, "Tray failed");
                ExitStatus::StartFailure
            }
        };
    }

    launch(args, TrayLink::headless())
}

fn launch(args: RunArgs, tray: TrayLink) -> ExitStatus {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build async runtime");
            return ExitStatus::StartFailure;
        }
    };

    let engine = Arc::new(ChildProcessEngine::new(args.engine.clone()));
    let launcher = Launcher::new(engine, ConfigLocator::new(args.locator_inputs()))
        .with_system_proxy(args.binding(), sysproxy::platform_controller());

    runtime.block_on(launcher.run(args.mode(), tray, signals::interrupt_or_terminate()))
}
