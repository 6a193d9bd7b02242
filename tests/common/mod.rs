//! Shared fakes for launcher integration tests.
#![allow(dead_code)]

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use xray_launcher::config::{merge_sources, ConfigSource};
use xray_launcher::engine::{EngineError, ProxyEngine, ServerHandle};
use xray_launcher::sysproxy::{ProxyBinding, ProxyCommandError, SystemProxyController};

/// Counts every engine call.
#[derive(Default)]
pub struct EngineCalls {
    pub merges: AtomicUsize,
    pub builds: AtomicUsize,
    pub starts: AtomicUsize,
    pub reclaims: AtomicUsize,
    pub closes: AtomicUsize,
}

impl EngineCalls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Engine that merges real files but never spawns anything.
#[derive(Default, Clone)]
pub struct FakeEngine {
    pub calls: Arc<EngineCalls>,
    pub fail_build: bool,
    pub fail_start: bool,
    /// The started server reports that it stopped on its own.
    pub exits_after_start: bool,
}

impl ProxyEngine for FakeEngine {
    fn merge(&self, source: &ConfigSource) -> Result<Value, EngineError> {
        self.calls.merges.fetch_add(1, Ordering::SeqCst);
        merge_sources(source).map_err(|e| EngineError::merge(source, e))
    }

    fn build(&self, source: &ConfigSource) -> Result<Box<dyn ServerHandle>, EngineError> {
        self.calls.builds.fetch_add(1, Ordering::SeqCst);
        self.merge(source)?;
        if self.fail_build {
            return Err(EngineError::Build("rejected by fake engine".into()));
        }
        Ok(Box::new(FakeServer {
            calls: self.calls.clone(),
            fail_start: self.fail_start,
            exits_after_start: self.exits_after_start,
            started: false,
        }))
    }
}

pub struct FakeServer {
    calls: Arc<EngineCalls>,
    fail_start: bool,
    exits_after_start: bool,
    started: bool,
}

impl ServerHandle for FakeServer {
    fn start(&mut self) -> Result<(), EngineError> {
        self.calls.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(EngineError::Start("address already in use".into()));
        }
        self.started = true;
        Ok(())
    }

    fn reclaim(&mut self) {
        self.calls.reclaims.fetch_add(1, Ordering::SeqCst);
    }

    fn poll_exit(&mut self) -> Option<String> {
        (self.started && self.exits_after_start).then(|| "exit status: 23".to_string())
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.calls.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Controller that records the commands it would have run.
#[derive(Default, Clone)]
pub struct RecordingController {
    pub log: Arc<Mutex<Vec<String>>>,
}

impl RecordingController {
    pub fn entries(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl SystemProxyController for RecordingController {
    fn enable(&self, binding: &ProxyBinding) -> Result<(), ProxyCommandError> {
        self.log.lock().push(format!("enable {}:{}", binding.device, binding.port));
        Ok(())
    }

    fn disable(&self, binding: &ProxyBinding) -> Result<(), ProxyCommandError> {
        self.log.lock().push(format!("disable {}", binding.device));
        Ok(())
    }
}

/// In-memory stdout.
#[derive(Default, Clone)]
pub struct SharedOutput(pub Arc<Mutex<Vec<u8>>>);

impl SharedOutput {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Write `content` to `dir/name` and return the path.
pub fn write_config(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("write config fixture");
    path
}

/// Executable shell script standing in for the engine.
///
/// `-test` runs exit with `check_code`; serving runs execute `run_body`.
#[cfg(unix)]
pub fn stub_engine(dir: &Path, check_code: i32, run_body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        "#!/bin/sh\ncat > /dev/null\nfor arg in \"$@\"; do\n  if [ \"$arg\" = \"-test\" ]; then\n    echo 'stub engine check' >&2\n    exit {check_code}\n  fi\ndone\n{run_body}\n"
    );
    let path = write_config(dir, "engine.sh", &script);
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("make stub engine executable");
    path
}
