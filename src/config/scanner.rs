//! Config directory scanning.
//!
//! Lists files directly under a directory (no recursion) whose names match the
//! extension set of a [`ConfigFormat`]. The scan is lazy and yields entries in
//! directory-listing order.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::ConfigFormat;

/// The config directory could not be listed.
#[derive(Debug, Error)]
#[error("failed to read config directory {}: {source}", path.display())]
pub struct ScanError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Lazy, single-pass iterator over matching config files.
pub struct ConfDirScan {
    dir: PathBuf,
    entries: fs::ReadDir,
    format: ConfigFormat,
}

/// Start scanning `dir` for files matching `format`.
pub fn scan(dir: &Path, format: ConfigFormat) -> Result<ConfDirScan, ScanError> {
    let entries = fs::read_dir(dir).map_err(|source| ScanError {
        path: dir.to_path_buf(),
        source,
    })?;

    Ok(ConfDirScan {
        dir: dir.to_path_buf(),
        entries,
        format,
    })
}

impl ConfDirScan {
    fn error(&self, source: io::Error) -> ScanError {
        ScanError {
            path: self.dir.clone(),
            source,
        }
    }
}

impl Iterator for ConfDirScan {
    type Item = Result<PathBuf, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(self.error(e))),
            };

            let name = entry.file_name();
            if !self.format.matches_file_name(&name) {
                continue;
            }

            match entry.file_type() {
                Ok(kind) if kind.is_dir() => continue,
                Ok(_) => return Some(Ok(self.dir.join(name))),
                Err(e) => return Some(Err(self.error(e))),
            }
        }
    }
}
