//! Host implementation backed by the real machine

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::BootstrapError;
use crate::filesys::file::File;
use crate::host::{CommandOutput, CommandSpec, Host};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// The machine llmboot runs on
pub struct SystemHost {
    client: reqwest::Client,

    /// Log child process output as `llmboot::child` events
    capture_output: bool,
}

impl SystemHost {
    pub fn new(capture_output: bool) -> Result<Self, BootstrapError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self { client, capture_output })
    }

    fn build(command: &CommandSpec) -> Command {
        let mut cmd = match &command.user {
            Some(user) => {
                let mut cmd = Command::new("sudo");
                cmd.args(["-u", user.as_str(), "-H"]);
                let keys: Vec<&str> = command
                    .envs
                    .iter()
                    .map(|(k, _)| k.as_str())
                    .chain(command.secret_envs.iter().map(|(k, _)| k.as_str()))
                    .collect();
                if !keys.is_empty() {
                    cmd.arg(format!("--preserve-env={}", keys.join(",")));
                }
                cmd.arg("--").arg(&command.program);
                cmd
            }
            None => Command::new(&command.program),
        };

        cmd.args(&command.args);
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.envs {
            cmd.env(key, value);
        }
        for (key, value) in &command.secret_envs {
            cmd.env(key, value.expose_secret());
        }
        cmd
    }

    /// Emit child output through the subscriber so it lands in the same log,
    /// in order with the surrounding events.
    fn capture(&self, command: &CommandSpec, output: &CommandOutput) {
        if !self.capture_output {
            return;
        }
        for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
            info!(target: "llmboot::child", "{}: {}", command.program, line);
        }
        for line in output.stderr.lines().filter(|l| !l.trim().is_empty()) {
            info!(target: "llmboot::child", "{} (stderr): {}", command.program, line);
        }
    }
}

#[async_trait]
impl Host for SystemHost {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, BootstrapError> {
        debug!("Running: {}", command);

        let output = Self::build(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| BootstrapError::CommandError(format!("Failed to run {}: {}", command, e)))?;

        let output = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        self.capture(command, &output);

        debug!("'{}' exited with {:?}", command, output.code);
        Ok(output)
    }

    async fn spawn_detached(&self, command: &CommandSpec) -> Result<Option<u32>, BootstrapError> {
        debug!("Spawning detached: {}", command);

        let mut cmd = Self::build(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .map_err(|e| BootstrapError::CommandError(format!("Failed to spawn {}: {}", command, e)))?;
        Ok(child.id())
    }

    async fn http_ok(&self, url: &str) -> bool {
        match self.client.get(url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Probe of {} failed: {}", url, e);
                false
            }
        }
    }

    async fn download(&self, url: &str, dest: &File) -> Result<(), BootstrapError> {
        debug!("Downloading {} to {:?}", url, dest.path());

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(BootstrapError::CommandError(format!(
                "Download of {} failed: {}",
                url,
                response.status()
            )));
        }
        let bytes = response.bytes().await?;
        dest.write_atomic(&bytes).await
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn process_running(&self, pid: u32) -> bool {
        let pid = sysinfo::Pid::from_u32(pid);
        let mut sys = sysinfo::System::new();
        sys.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
        sys.process(pid).is_some()
    }

    fn cpu_count(&self) -> usize {
        let mut sys = sysinfo::System::new();
        sys.refresh_cpu_all();
        sys.cpus().len().max(1)
    }
}
