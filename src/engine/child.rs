//! Engine adapter that runs the proxy engine as a child process.
//!
//! The merged document is handed to the engine on stdin, so the engine sees
//! exactly what `--dump` prints:
//! - build: `<program> run -test -config stdin: -format json` must exit 0
//! - start: `<program> run -config stdin: -format json` keeps running

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::{Child, Command, Output, Stdio};
use std::thread;

use serde_json::Value;

use crate::config::{merge_sources, ConfigSource};
use crate::engine::{EngineError, ProxyEngine, ServerHandle};

/// Default engine executable, looked up on `PATH`.
pub const DEFAULT_ENGINE: &str = "xray";

/// Arguments telling the engine to read a JSON config from stdin.
pub const STDIN_RUN_ARGS: [&str; 5] = ["run", "-config", "stdin:", "-format", "json"];

/// Arguments telling the engine to validate a JSON config from stdin and exit.
pub const STDIN_CHECK_ARGS: [&str; 6] = ["run", "-test", "-config", "stdin:", "-format", "json"];

/// Builds [`ChildServer`]s for an engine executable.
#[derive(Debug, Clone)]
pub struct ChildProcessEngine {
    program: OsString,
    args: Vec<OsString>,
    check_args: Vec<OsString>,
}

impl ChildProcessEngine {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: STDIN_RUN_ARGS.iter().map(OsString::from).collect(),
            check_args: STDIN_CHECK_ARGS.iter().map(OsString::from).collect(),
        }
    }

    /// Replace the arguments passed to the engine.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the arguments of the config check run during build.
    pub fn with_check_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.check_args = args.into_iter().map(Into::into).collect();
        self
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Let the engine validate `document` without serving it.
    fn check(&self, document: &[u8]) -> Result<(), EngineError> {
        let unavailable = |source: io::Error| EngineError::Unavailable {
            program: self.program_name(),
            source,
        };

        let mut child = Command::new(&self.program)
            .args(&self.check_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(unavailable)?;

        // Feed stdin from a second thread so a chatty engine cannot fill its
        // output pipes while we are still writing.
        let stdin = child.stdin.take();
        let (written, output) = thread::scope(|scope| {
            let writer = scope.spawn(move || stdin.map_or(Ok(()), |mut stdin| stdin.write_all(document)));
            let output = child.wait_with_output();
            (writer.join(), output)
        });
        let output = output.map_err(unavailable)?;

        if !output.status.success() {
            return Err(EngineError::Build(format!(
                "{} rejected the config ({}): {}",
                self.program_name(),
                output.status,
                rejection_detail(&output)
            )));
        }
        if let Ok(Err(e)) = written {
            tracing::debug!(error = %e, "Engine check did not read the whole config");
        }

        tracing::debug!(program = %self.program_name(), "Engine accepted config");
        Ok(())
    }
}

/// The engine's own explanation: stderr if it wrote any, else stdout.
fn rejection_detail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout)
    } else {
        stderr
    };
    match text.trim() {
        "" => "no output".to_string(),
        text => text.to_string(),
    }
}

impl Default for ChildProcessEngine {
    fn default() -> Self {
        Self::new(DEFAULT_ENGINE)
    }
}

impl ProxyEngine for ChildProcessEngine {
    fn merge(&self, source: &ConfigSource) -> Result<Value, EngineError> {
        merge_sources(source).map_err(|e| EngineError::merge(source, e))
    }

    fn build(&self, source: &ConfigSource) -> Result<Box<dyn ServerHandle>, EngineError> {
        let document = self.merge(source)?;
        let bytes = serde_json::to_vec(&document).map_err(|e| EngineError::Build(e.to_string()))?;
        self.check(&bytes)?;

        Ok(Box::new(ChildServer {
            program: self.program.clone(),
            args: self.args.clone(),
            document: Some(bytes),
            child: None,
            started: false,
        }))
    }
}

/// An engine process, spawned on [`ServerHandle::start`].
pub struct ChildServer {
    program: OsString,
    args: Vec<OsString>,
    document: Option<Vec<u8>>,
    child: Option<Child>,
    started: bool,
}

impl ChildServer {
    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl ServerHandle for ChildServer {
    fn start(&mut self) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::Start("server already started".into()));
        }
        self.started = true;

        let document = self
            .document
            .as_deref()
            .ok_or_else(|| EngineError::Start("startup config already released".into()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| EngineError::Start(format!("{}: {}", self.program_name(), e)))?;

        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(document).and_then(|_| stdin.flush()),
            None => Ok(()),
        };

        if let Err(e) = written {
            let _ = child.kill();
            let _ = child.wait();
            return Err(EngineError::Start(format!(
                "{}: failed to pass config: {}",
                self.program_name(),
                e
            )));
        }

        tracing::info!(program = %self.program_name(), pid = child.id(), "Engine process started");
        self.child = Some(child);
        Ok(())
    }

    fn reclaim(&mut self) {
        if let Some(document) = self.document.take() {
            tracing::debug!(bytes = document.len(), "Released startup config");
        }
    }

    fn poll_exit(&mut self) -> Option<String> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => Some(status.to_string()),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to poll engine process");
                None
            }
        }
    }

    fn close(&mut self) -> Result<(), EngineError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::warn!(%status, "Engine process had already exited");
                Ok(())
            }
            _ => {
                child.kill().map_err(|e| EngineError::Close(e.to_string()))?;
                let status = child.wait().map_err(|e| EngineError::Close(e.to_string()))?;
                tracing::info!(%status, "Engine process stopped");
                Ok(())
            }
        }
    }
}

impl Drop for ChildServer {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;
    use std::fs;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn source_with(dir: &std::path::Path, content: &str) -> ConfigSource {
        let path = dir.join("config.json");
        fs::write(&path, content).unwrap();
        ConfigSource::new(vec![path], ConfigFormat::Auto)
    }

    /// `sh -c <script>` for both the check and the run.
    #[cfg(unix)]
    fn shell_engine(check: &str, run: &str) -> ChildProcessEngine {
        ChildProcessEngine::new("sh")
            .with_check_args(["-c", check])
            .with_args(["-c", run])
    }

    fn wait_for<T>(mut poll: impl FnMut() -> Option<T>) -> Option<T> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(value) = poll() {
                return Some(value);
            }
            if Instant::now() > deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_build_rejects_bad_config() {
        let dir = tempdir().unwrap();
        let source = source_with(dir.path(), "{ not json");

        let err = ChildProcessEngine::default().build(&source).err().unwrap();
        assert!(matches!(err, EngineError::Merge { .. }));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let dir = tempdir().unwrap();
        let source = source_with(dir.path(), "{}");

        let err = ChildProcessEngine::new(dir.path().join("no-such-engine"))
            .build(&source)
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Unavailable { .. }));
        assert!(!err.is_config_error());
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_rejection_fails_build() {
        let dir = tempdir().unwrap();
        let source = source_with(dir.path(), r#"{"inbounds": "not-an-array", "outbounds": 42}"#);

        let engine = shell_engine("cat > /dev/null; echo 'invalid inbounds' >&2; exit 23", "sleep 30");
        let err = engine.build(&source).err().unwrap();

        let EngineError::Build(message) = &err else {
            panic!("expected build error, got {err:?}");
        };
        assert!(message.contains("invalid inbounds"), "{message}");
        assert!(message.contains("23"), "{message}");
        assert!(err.is_config_error());
    }

    #[cfg(unix)]
    #[test]
    fn test_check_ignores_unread_stdin() {
        let dir = tempdir().unwrap();
        let source = source_with(dir.path(), "{}");

        let mut server = shell_engine("exit 0", "sleep 30").build(&source).unwrap();
        assert!(server.close().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_receives_merged_document_on_stdin() {
        let dir = tempdir().unwrap();
        let source = source_with(dir.path(), "{\"log\": {\"loglevel\": \"debug\"}}");
        let checked = dir.path().join("checked.json");
        let captured = dir.path().join("captured.json");

        let engine = ChildProcessEngine::new("sh")
            .with_check_args([
                OsString::from("-c"),
                OsString::from("cat > \"$0\""),
                checked.clone().into_os_string(),
            ])
            .with_args([
                OsString::from("-c"),
                OsString::from("cat > \"$0\"; sleep 30"),
                captured.clone().into_os_string(),
            ]);
        let mut server = engine.build(&source).unwrap();
        let value: Value = serde_json::from_str(&fs::read_to_string(&checked).unwrap()).unwrap();
        assert_eq!(value["log"]["loglevel"], "debug");

        server.start().unwrap();
        server.reclaim();

        let content = wait_for(|| fs::read_to_string(&captured).ok().filter(|c| !c.is_empty())).unwrap();
        let value: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["log"]["loglevel"], "debug");
        assert!(server.poll_exit().is_none());

        assert!(matches!(server.start(), Err(EngineError::Start(_))));
        server.close().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_poll_exit_reports_engine_exit() {
        let dir = tempdir().unwrap();
        let source = source_with(dir.path(), "{}");

        let mut server = shell_engine("cat > /dev/null", "cat > /dev/null; exit 3").build(&source).unwrap();
        assert!(server.poll_exit().is_none());
        server.start().unwrap();

        let status = wait_for(|| server.poll_exit()).unwrap();
        assert!(status.contains('3'), "{status}");
        assert!(server.close().is_ok());
    }
}
