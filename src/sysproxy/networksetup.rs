//! macOS system proxy control through `networksetup`.

use std::process::Command;

use super::{ProxyBinding, ProxyCommandError, SystemProxyController};

const NETWORKSETUP: &str = "networksetup";

/// Runs one external command to completion.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> Result<(), ProxyCommandError>;
}

/// Runs commands on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<(), ProxyCommandError> {
        tracing::debug!(program, ?args, "Running network command");

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| ProxyCommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }
        Err(ProxyCommandError::Status {
            command: format!("{} {}", program, args.join(" ")),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Toggles the SOCKS firewall proxy of a network service.
pub struct NetworkSetup<R = SystemRunner> {
    runner: R,
}

impl<R: CommandRunner> NetworkSetup<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    fn set_target(&self, binding: &ProxyBinding) -> Result<(), ProxyCommandError> {
        let args = vec![
            "-setsocksfirewallproxy".to_string(),
            binding.device.clone(),
            binding.host().to_string(),
            binding.port.to_string(),
        ];
        self.runner.run(NETWORKSETUP, &args)
    }

    fn set_state(&self, binding: &ProxyBinding, on: bool) -> Result<(), ProxyCommandError> {
        let args = vec![
            "-setsocksfirewallproxystate".to_string(),
            binding.device.clone(),
            if on { "on" } else { "off" }.to_string(),
        ];
        self.runner.run(NETWORKSETUP, &args)
    }
}

impl<R: CommandRunner> SystemProxyController for NetworkSetup<R> {
    fn enable(&self, binding: &ProxyBinding) -> Result<(), ProxyCommandError> {
        // Both steps run even if the first one fails.
        let target = self.set_target(binding);
        let state = self.set_state(binding, true);
        target.and(state)
    }

    fn disable(&self, binding: &ProxyBinding) -> Result<(), ProxyCommandError> {
        self.set_state(binding, false)
    }
}
