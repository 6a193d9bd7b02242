//! Config source resolution.
//!
//! # Precedence
//! First matching rule wins:
//! 1. `--confdir` names an existing directory: scan it
//! 2. else `XRAY_LOCATION_CONFDIR` names an existing directory: scan it
//! 3. scanned files appended to explicit `--config` files; non-empty → done
//! 4. `config.json` in the working directory
//! 5. the file named by `XRAY_LOCATION_CONFIG`
//! 6. `~/.xray/config.json` under the resolved home directory

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::scanner::{scan, ScanError};
use super::{ConfigFormat, ConfigSource};

/// Fallback location when nothing else is found.
pub const DEFAULT_CONFIG_LOCATION: &str = "~/.xray/config.json";

/// File name looked up in the working directory.
pub const WORKING_DIR_CONFIG: &str = "config.json";

/// Environment variable naming a config directory.
pub const ENV_CONFDIR: &str = "XRAY_LOCATION_CONFDIR";

/// Environment variable naming a single config file.
pub const ENV_CONFIG: &str = "XRAY_LOCATION_CONFIG";

/// Errors produced while resolving config sources.
#[derive(Debug, Error)]
pub enum LocateError {
    /// No home directory to expand the default location against.
    #[error("no usable config path: home directory could not be resolved")]
    NoHomeDirectory,

    /// The default location could not be made absolute.
    #[error("no usable config path: {0}")]
    InvalidDefault(#[source] io::Error),

    /// A config directory exists but could not be listed.
    #[error(transparent)]
    DirectoryRead(#[from] ScanError),
}

/// Every input the resolution looks at, gathered up front.
#[derive(Debug, Clone, Default)]
pub struct LocatorInputs {
    /// Files given with repeated `--config` flags, in flag order.
    pub explicit_files: Vec<PathBuf>,
    /// Directory given with `--confdir`.
    pub explicit_dir: Option<PathBuf>,
    /// Directory from the environment.
    pub env_dir: Option<PathBuf>,
    /// Single file from the environment.
    pub env_file: Option<PathBuf>,
    /// Working directory searched for `config.json`.
    pub working_dir: Option<PathBuf>,
    /// Home directory for the `~` fallback.
    pub home_dir: Option<PathBuf>,
    pub format: ConfigFormat,
}

impl LocatorInputs {
    /// Collect environment, working directory and home directory for the given flags.
    pub fn from_environment(
        explicit_files: Vec<PathBuf>,
        explicit_dir: Option<PathBuf>,
        format: ConfigFormat,
    ) -> Self {
        Self {
            explicit_files,
            explicit_dir: explicit_dir.filter(|p| !p.as_os_str().is_empty()),
            env_dir: env_path(ENV_CONFDIR),
            env_file: env_path(ENV_CONFIG).or_else(executable_dir_config),
            working_dir: env::current_dir().ok(),
            home_dir: dirs::home_dir(),
            format,
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn executable_dir_config() -> Option<PathBuf> {
    let exe = env::current_exe().ok()?;
    Some(exe.parent()?.join(WORKING_DIR_CONFIG))
}

fn is_dir(path: &Option<PathBuf>) -> Option<&Path> {
    path.as_deref().filter(|p| p.is_dir())
}

fn is_file(path: &Path) -> bool {
    path.is_file()
}

/// Decides which config files a run loads.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    inputs: LocatorInputs,
}

impl ConfigLocator {
    pub fn new(inputs: LocatorInputs) -> Self {
        Self { inputs }
    }

    /// Resolve the config sources. `verbose` logs which rule matched.
    pub fn resolve(&self, verbose: bool) -> Result<ConfigSource, LocateError> {
        let inputs = &self.inputs;
        let format = inputs.format;
        let mut files = inputs.explicit_files.clone();

        if let Some(dir) = is_dir(&inputs.explicit_dir) {
            if verbose {
                tracing::info!(confdir = %dir.display(), "Using confdir from arg");
            }
            files.extend(scan_sorted(dir, format)?);
        } else if let Some(dir) = is_dir(&inputs.env_dir) {
            if verbose {
                tracing::info!(confdir = %dir.display(), "Using confdir from env");
            }
            files.extend(scan_sorted(dir, format)?);
        }

        if !files.is_empty() {
            return Ok(ConfigSource::new(files, format));
        }

        if let Some(working_dir) = &inputs.working_dir {
            let candidate = working_dir.join(WORKING_DIR_CONFIG);
            if is_file(&candidate) {
                if verbose {
                    tracing::info!(config = %candidate.display(), "Using default config");
                }
                return Ok(ConfigSource::new(vec![candidate], format));
            }
        }

        if let Some(candidate) = inputs.env_file.as_deref().filter(|p| is_file(p)) {
            if verbose {
                tracing::info!(config = %candidate.display(), "Using config from env");
            }
            return Ok(ConfigSource::new(vec![candidate.to_path_buf()], format));
        }

        if verbose {
            tracing::info!("Using default directory for config file search");
        }
        let home = inputs.home_dir.as_deref().ok_or(LocateError::NoHomeDirectory)?;
        let path = expand_home(DEFAULT_CONFIG_LOCATION, home);
        let path = std::path::absolute(&path).map_err(LocateError::InvalidDefault)?;

        Ok(ConfigSource::new(vec![path], format))
    }
}

/// Scan one directory, sorted by file name so merge order is reproducible.
fn scan_sorted(dir: &Path, format: ConfigFormat) -> Result<Vec<PathBuf>, ScanError> {
    let mut found = scan(dir, format)?.collect::<Result<Vec<_>, _>>()?;
    found.sort();
    Ok(found)
}

fn expand_home(location: &str, home: &Path) -> PathBuf {
    match location.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None if location == "~" => home.to_path_buf(),
        None => PathBuf::from(location),
    }
}
