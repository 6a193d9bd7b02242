//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{ConfigFormat, LocatorInputs};
use crate::engine::child::DEFAULT_ENGINE;
use crate::lifecycle::RunMode;
use crate::sysproxy::{ProxyBinding, DEFAULT_DEVICE, DEFAULT_PORT};

#[derive(Debug, Parser)]
#[command(name = "xray-launcher")]
#[command(about = "Launch the Xray proxy engine with resolved config", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the engine with config, the default command
    Run(RunArgs),
    /// Print the launcher version
    Version,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Config file for the engine; repeat to merge several
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Vec<PathBuf>,

    /// A directory with multiple config files
    #[arg(long, value_name = "DIR")]
    pub confdir: Option<PathBuf>,

    /// Format of input files: auto, json, toml or yaml
    #[arg(long, default_value = "auto")]
    pub format: String,

    /// Test config files only, without launching the server
    #[arg(long)]
    pub test: bool,

    /// Print the merged config only, without launching the server
    #[arg(long)]
    pub dump: bool,

    /// Port the system proxy points at (macOS only)
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub sysproxy_port: u16,

    /// Network service the system proxy is set on (macOS only)
    #[arg(long, default_value = DEFAULT_DEVICE)]
    pub sysproxy_device: String,

    /// Engine executable
    #[arg(long, env = "XRAY_LAUNCHER_ENGINE", default_value = DEFAULT_ENGINE)]
    pub engine: PathBuf,

    /// Run without the tray icon
    #[arg(long)]
    pub no_tray: bool,
}

impl RunArgs {
    pub fn mode(&self) -> RunMode {
        RunMode::from_flags(self.dump, self.test)
    }

    pub fn format(&self) -> ConfigFormat {
        ConfigFormat::from_flag(&self.format)
    }

    pub fn binding(&self) -> ProxyBinding {
        ProxyBinding::new(self.sysproxy_device.clone(), self.sysproxy_port)
    }

    /// Locator inputs from these flags plus the process environment.
    pub fn locator_inputs(&self) -> LocatorInputs {
        LocatorInputs::from_environment(self.config.clone(), self.confdir.clone(), self.format())
    }
}

impl Cli {
    /// The run arguments, whether given with or without the `run` subcommand.
    pub fn into_run_args(self) -> Option<RunArgs> {
        match self.command {
            None => Some(self.run),
            Some(Command::Run(args)) => Some(args),
            Some(Command::Version) => None,
        }
    }
}
