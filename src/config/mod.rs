//! Configuration resolution subsystem.
//!
//! # Data Flow
//! ```text
//! CLI flags + environment + home directory
//!     → locator.rs (pick config sources by precedence)
//!     → scanner.rs (enumerate a config directory, when one applies)
//!     → ConfigSource (ordered paths + format, immutable)
//!     → loader.rs (parse each source, merge into one document)
//! ```
//!
//! # Design Decisions
//! - Resolution inputs are an explicit struct, never process-wide state
//! - The format flag never fails: unknown values degrade to `auto`
//! - A source list is computed once per invocation and consumed once

pub mod loader;
pub mod locator;
pub mod scanner;

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

pub use loader::{merge_sources, LoadError};
pub use locator::{ConfigLocator, LocateError, LocatorInputs};
pub use scanner::{scan, ConfDirScan, ScanError};

/// Declared format of the config sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    #[default]
    Auto,
    Json,
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// Map a flag value to a format, case-insensitively.
    ///
    /// Anything unrecognized degrades to [`ConfigFormat::Auto`].
    pub fn from_flag(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" | "jsonc" => ConfigFormat::Json,
            "toml" => ConfigFormat::Toml,
            "yaml" | "yml" => ConfigFormat::Yaml,
            _ => ConfigFormat::Auto,
        }
    }

    /// File extensions a config directory scan accepts for this format.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            ConfigFormat::Json => &["json", "jsonc"],
            ConfigFormat::Toml => &["toml"],
            ConfigFormat::Yaml => &["yaml", "yml"],
            ConfigFormat::Auto => &["json", "jsonc", "toml", "yaml", "yml"],
        }
    }

    /// Whether `name` is `<something>.<ext>` for one of this format's extensions.
    ///
    /// Only the extension has to be UTF-8; the stem may be any bytes.
    pub fn matches_file_name(self, name: impl AsRef<OsStr>) -> bool {
        let name = Path::new(name.as_ref());
        match (name.file_stem(), name.extension().and_then(OsStr::to_str)) {
            (Some(stem), Some(ext)) if !stem.is_empty() => self.extensions().contains(&ext),
            _ => false,
        }
    }

    /// Concrete format of a single file; `Auto` is resolved through its extension.
    pub fn for_path(self, path: &Path) -> Self {
        if self != ConfigFormat::Auto {
            return self;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => ConfigFormat::Toml,
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Json,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigFormat::Auto => "auto",
            ConfigFormat::Json => "json",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Yaml => "yaml",
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered config paths plus their declared format.
///
/// Order is load/merge order; duplicates are allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    paths: Vec<PathBuf>,
    format: ConfigFormat,
}

impl ConfigSource {
    pub fn new(paths: Vec<PathBuf>, format: ConfigFormat) -> Self {
        Self { paths, format }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn format(&self) -> ConfigFormat {
        self.format
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, path) in self.paths.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", path.display())?;
        }
        write!(f, "]")
    }
}
