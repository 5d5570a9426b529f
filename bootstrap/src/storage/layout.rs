//! Host file layout

use std::path::{Path, PathBuf};

use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Every path llmboot reads or writes on the host.
///
/// Paths are absolute host paths re-rooted under `root`, which is `/` in
/// production and a scratch directory in tests.
#[derive(Debug, Clone)]
pub struct HostLayout {
    pub root: PathBuf,
}

impl HostLayout {
    /// Create a layout rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Re-root an absolute host path
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        match path.strip_prefix("/") {
            Ok(relative) => self.root.join(relative),
            Err(_) => self.root.join(path),
        }
    }

    /// Deployment log written by the orchestrator
    pub fn deploy_log(&self) -> File {
        File::new(self.resolve("/var/log/deploy.log"))
    }

    /// Log written by the detached model-pull task
    pub fn model_pull_log(&self) -> File {
        File::new(self.resolve("/var/log/model-pull.log"))
    }

    /// Package manager parallelism config
    pub fn apt_parallel_conf(&self) -> File {
        File::new(self.resolve("/etc/apt/apt.conf.d/99parallel"))
    }

    /// Container runtime daemon config
    pub fn docker_daemon_config(&self) -> File {
        File::new(self.resolve("/etc/docker/daemon.json"))
    }

    /// Telemetry agent config
    pub fn telemetry_agent_config(&self) -> File {
        File::new(self.resolve(
            "/opt/aws/amazon-cloudwatch-agent/etc/amazon-cloudwatch-agent.json",
        ))
    }

    /// Download target of the telemetry agent package
    pub fn telemetry_agent_package(&self) -> File {
        File::new(self.resolve("/tmp/amazon-cloudwatch-agent.deb"))
    }

    /// Launcher script of the model-pull task
    pub fn model_pull_script(&self) -> File {
        File::new(self.resolve("/usr/local/bin/llmboot-model-pull.sh"))
    }

    /// Runtime state directory
    pub fn state_dir(&self) -> Dir {
        Dir::new(self.resolve("/var/lib/llmboot"))
    }

    /// Completion signal of the model-pull task
    pub fn model_pull_status(&self) -> File {
        self.state_dir().file("model-pull.status.json")
    }
}

impl Default for HostLayout {
    fn default() -> Self {
        Self::new("/")
    }
}
