//! Container runtime: daemon configuration, readiness and container health

use std::fmt;

use serde_json::json;
use tracing::{debug, info};

use crate::deploy::retry::{poll_until, RetryPolicy};
use crate::errors::BootstrapError;
use crate::filesys::file::File;
use crate::host::{CommandSpec, Host};
use crate::storage::settings::{RuntimeSettings, WorkloadSettings};

/// Render the daemon configuration
pub fn render_daemon_config(settings: &RuntimeSettings) -> Result<String, BootstrapError> {
    let config = json!({
        "log-driver": "json-file",
        "log-opts": {
            "max-size": settings.log_max_size,
            "max-file": settings.log_max_file.to_string(),
        },
        "storage-driver": settings.storage_driver,
        "metrics-addr": settings.metrics_addr,
        "experimental": true,
    });
    let mut rendered = serde_json::to_string_pretty(&config)?;
    rendered.push('\n');
    Ok(rendered)
}

/// Write the daemon configuration. Returns `true` when it changed.
pub async fn write_daemon_config(file: &File, settings: &RuntimeSettings) -> Result<bool, BootstrapError> {
    let rendered = render_daemon_config(settings)?;
    let changed = file.write_if_changed(&rendered).await?;
    if changed {
        info!("Wrote container runtime config to {:?}", file.path());
    } else {
        debug!("Container runtime config unchanged");
    }
    Ok(changed)
}

/// Whether the daemon service is active
pub async fn daemon_active(host: &dyn Host) -> bool {
    let cmd = CommandSpec::new("systemctl").args(["is-active", "--quiet", "docker"]);
    matches!(host.run(&cmd).await, Ok(output) if output.success())
}

/// Restart the daemon service
pub async fn restart_daemon(host: &dyn Host) -> Result<(), BootstrapError> {
    info!("Restarting container runtime daemon...");
    let cmd = CommandSpec::new("systemctl").args(["restart", "docker"]);
    let output = host.run(&cmd).await?;
    if !output.success() {
        return Err(BootstrapError::RuntimeError(format!(
            "Daemon restart failed: {}",
            output.last_error_line()
        )));
    }
    Ok(())
}

/// Poll `docker info` until the daemon answers
pub async fn wait_daemon_ready(host: &dyn Host, policy: RetryPolicy) -> Result<(), BootstrapError> {
    info!(
        "Waiting up to {:?} for the container runtime daemon...",
        policy.delay * policy.max_attempts
    );

    let result = poll_until(policy, "Container runtime", move |d| host.sleep(d), move |_| async move {
        let cmd = CommandSpec::new("docker").arg("info");
        match host.run(&cmd).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(format!("docker info exited with {:?}", output.code)),
            Err(e) => Err(e.to_string()),
        }
    })
    .await;

    match result {
        Ok(attempt) => {
            info!("Container runtime daemon ready after {} poll(s)", attempt);
            Ok(())
        }
        Err(exhausted) => Err(BootstrapError::RuntimeError(format!(
            "Daemon not ready after {} polls: {}",
            exhausted.attempts, exhausted.last_error
        ))),
    }
}

/// What a single health observation of the inference container found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerHealth {
    /// Container absent or not in the running state
    NotRunning,

    /// Container running, API not answering yet
    ApiNotReady,

    /// Container running and API healthy
    Healthy,
}

impl fmt::Display for ContainerHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerHealth::NotRunning => f.write_str("container not running yet"),
            ContainerHealth::ApiNotReady => f.write_str("container running, API not ready yet"),
            ContainerHealth::Healthy => f.write_str("healthy"),
        }
    }
}

/// Whether the named container is in the running state
pub async fn container_running(host: &dyn Host, name: &str) -> bool {
    let cmd = CommandSpec::new("docker").args(["inspect", "-f", "{{.State.Running}}", name]);
    match host.run(&cmd).await {
        Ok(output) => output.success() && output.stdout.trim() == "true",
        Err(e) => {
            debug!("Inspect of {} failed: {}", name, e);
            false
        }
    }
}

/// Observe the inference container. The API is only probed once the
/// container is running.
pub async fn observe_container(host: &dyn Host, workload: &WorkloadSettings) -> ContainerHealth {
    if !container_running(host, &workload.container_name).await {
        return ContainerHealth::NotRunning;
    }
    if host.http_ok(&workload.api_health_url()).await {
        ContainerHealth::Healthy
    } else {
        ContainerHealth::ApiNotReady
    }
}

/// Ask the inference server inside the container to pull a model
pub async fn pull_model(host: &dyn Host, container: &str, model: &str) -> Result<(), BootstrapError> {
    let cmd = CommandSpec::new("docker").args(["exec", container, "ollama", "pull", model]);
    let output = host.run(&cmd).await?;
    if !output.success() {
        return Err(BootstrapError::ModelPullError(format!(
            "'{}' exited with {:?}: {}",
            cmd,
            output.code,
            output.last_error_line()
        )));
    }
    Ok(())
}
