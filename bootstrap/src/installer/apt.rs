//! Package manager configuration and package installation

use tracing::{debug, info};

use crate::errors::BootstrapError;
use crate::filesys::file::File;
use crate::host::{CommandSpec, Host};
use crate::storage::settings::PackageSettings;

/// Render the APT parallelism config for `cores` CPUs
pub fn render_parallel_config(cores: usize, retries: u32) -> String {
    let depth = cores.max(1) * 2;
    format!(
        "// Managed by llmboot\n\
         Acquire::Queue-Mode \"access\";\n\
         Acquire::http::Pipeline-Depth \"{depth}\";\n\
         Acquire::Retries \"{retries}\";\n\
         APT::Acquire::Retries \"{retries}\";\n\
         Dpkg::Use-Pty \"0\";\n"
    )
}

/// Write the parallelism config. Returns `true` when it changed.
pub async fn write_parallel_config(
    file: &File,
    cores: usize,
    retries: u32,
) -> Result<bool, BootstrapError> {
    let changed = file.write_if_changed(&render_parallel_config(cores, retries)).await?;
    if changed {
        info!("Wrote package manager config for {} core(s) to {:?}", cores, file.path());
    }
    Ok(changed)
}

fn status_query(package: &str) -> CommandSpec {
    CommandSpec::new("dpkg-query").args(["-W", "--showformat=${Status}", package])
}

/// Whether a package is installed
pub async fn package_installed(host: &dyn Host, package: &str) -> bool {
    match host.run(&status_query(package)).await {
        Ok(output) => output.success() && output.stdout.contains("install ok installed"),
        Err(_) => false,
    }
}

/// Packages from `packages` that are not installed yet
pub async fn missing_packages(host: &dyn Host, packages: &[String]) -> Vec<String> {
    let mut missing = Vec::new();
    for package in packages {
        if !package_installed(host, package).await {
            missing.push(package.clone());
        }
    }
    missing
}

fn apt_get(cores: usize, retries: u32) -> CommandSpec {
    CommandSpec::new("apt-get")
        .env("DEBIAN_FRONTEND", "noninteractive")
        .arg("-o")
        .arg(format!("Acquire::Retries={}", retries))
        .arg("-o")
        .arg(format!("Acquire::http::Pipeline-Depth={}", cores.max(1) * 2))
        .args(["-o", "Acquire::Queue-Mode=access"])
}

/// Refresh the index and install every configured package.
///
/// Retries are left to the package manager.
pub async fn install_packages(
    host: &dyn Host,
    settings: &PackageSettings,
    cores: usize,
) -> Result<(), BootstrapError> {
    let packages = settings.all();
    info!("Installing {} package(s): {}", packages.len(), packages.join(" "));

    let update = apt_get(cores, settings.retries).args(["-y", "update"]);
    let output = host.run(&update).await?;
    if !output.success() {
        return Err(BootstrapError::PackageError(format!(
            "Package index refresh failed: {}",
            output.last_error_line()
        )));
    }

    let install = apt_get(cores, settings.retries)
        .args(["-y", "--no-install-recommends", "install"])
        .args(packages.iter().map(String::as_str));
    debug!("Running: {}", install);
    let output = host.run(&install).await?;
    if !output.success() {
        return Err(BootstrapError::PackageError(format!(
            "Package installation failed: {}",
            output.last_error_line()
        )));
    }

    info!("Packages installed");
    Ok(())
}
