//! Docker Compose workload startup

use std::path::Path;

use tracing::{debug, info};

use crate::errors::BootstrapError;
use crate::host::{CommandSpec, Host};

/// Start the compose stack in `target_dir` as `user`.
///
/// Uses the `docker compose` plugin and falls back to the standalone
/// `docker-compose` binary.
pub async fn compose_up(host: &dyn Host, target_dir: &Path, user: &str) -> Result<(), BootstrapError> {
    info!("Starting Docker Compose stack in {:?} as {}", target_dir, user);

    let plugin = CommandSpec::new("docker")
        .args(["compose", "up", "-d"])
        .current_dir(target_dir)
        .as_user(user);
    let output = host.run(&plugin).await?;
    if output.success() {
        info!("Docker Compose stack started");
        return Ok(());
    }

    debug!("'docker compose' failed ({}), trying docker-compose...", output.last_error_line());
    let standalone = CommandSpec::new("docker-compose")
        .args(["up", "-d"])
        .current_dir(target_dir)
        .as_user(user);
    let output = host.run(&standalone).await?;
    if !output.success() {
        return Err(BootstrapError::WorkloadError(format!(
            "Docker Compose failed: {}",
            output.last_error_line()
        )));
    }

    info!("Docker Compose stack started");
    Ok(())
}
