//! Workload source checkout

use std::path::Path;

use secrecy::SecretString;
use tracing::{debug, info};

use crate::authn::credential::with_git_auth;
use crate::errors::BootstrapError;
use crate::filesys::dir::Dir;
use crate::host::{CommandSpec, Host};
use crate::storage::settings::SourceSettings;

/// Clone the repository into `target_dir`, or pull when a checkout is
/// already there
pub async fn sync_repository(
    host: &dyn Host,
    source: &SourceSettings,
    username: &str,
    token: &SecretString,
    target_dir: &Path,
) -> Result<(), BootstrapError> {
    info!(
        "Syncing Git repository: {} (branch: {}) to {:?}",
        source.repo_url, source.branch, target_dir
    );

    let checkout = Dir::new(target_dir);
    let cmd = if checkout.subdir(".git").exists().await {
        debug!("Checkout exists, pulling updates...");
        // The checkout belongs to the unprivileged account; git refuses to
        // operate on a repository owned by another user.
        CommandSpec::new("git")
            .arg("-C")
            .arg(target_dir.to_string_lossy())
            .args(["pull", "--ff-only", "origin", source.branch.as_str()])
            .as_user(source.user.as_str())
    } else {
        debug!("Cloning repository to {:?}...", target_dir);
        CommandSpec::new("git")
            .args(["clone", "--branch", source.branch.as_str(), source.repo_url.as_str()])
            .arg(target_dir.to_string_lossy())
    };
    let cmd = with_git_auth(cmd, &source.repo_url, username, token)?;

    let output = host.run(&cmd).await?;
    if !output.success() {
        return Err(BootstrapError::CheckoutError(format!(
            "'{}' failed: {}",
            cmd.command_line(),
            output.last_error_line()
        )));
    }

    info!("Successfully synced Git repository");
    Ok(())
}

/// Hand the checkout over to the unprivileged account
pub async fn chown_checkout(host: &dyn Host, user: &str, target_dir: &Path) -> Result<(), BootstrapError> {
    let cmd = CommandSpec::new("chown")
        .arg("-R")
        .arg(format!("{}:{}", user, user))
        .arg(target_dir.to_string_lossy());
    let output = host.run(&cmd).await?;
    if !output.success() {
        return Err(BootstrapError::CheckoutError(format!(
            "Unable to change ownership of {:?} to {}: {}",
            target_dir,
            user,
            output.last_error_line()
        )));
    }
    Ok(())
}
