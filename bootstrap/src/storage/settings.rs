//! Settings file management
//!
//! The settings file is rendered by the provisioning layer before first boot
//! and is read-only for llmboot.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::BootstrapError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// llmboot settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log shipping destinations and telemetry agent
    #[serde(default)]
    pub telemetry: TelemetrySettings,

    /// Package manager configuration
    #[serde(default)]
    pub packages: PackageSettings,

    /// Container runtime daemon configuration
    #[serde(default)]
    pub runtime: RuntimeSettings,

    /// Workload source repository
    #[serde(default)]
    pub source: SourceSettings,

    /// Where the repository credential comes from
    #[serde(default)]
    pub credential: CredentialSettings,

    /// Containerised workload
    #[serde(default)]
    pub workload: WorkloadSettings,

    /// Model acquisition
    #[serde(default)]
    pub model: ModelSettings,

    /// Facts about the instance, rendered by the provisioning layer
    #[serde(default)]
    pub instance: InstanceSettings,
}

impl Settings {
    /// Load and validate the settings file
    pub async fn load(file: &File) -> Result<Self, BootstrapError> {
        let settings: Settings = file.read_json().await.map_err(|e| {
            BootstrapError::ConfigError(format!(
                "Unable to read settings file {}: {}",
                file.path().display(),
                e
            ))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check the values the orchestrator cannot run without
    pub fn validate(&self) -> Result<(), BootstrapError> {
        if self.telemetry.log_group.trim().is_empty() {
            return Err(BootstrapError::ConfigError("telemetry.log_group is empty".to_string()));
        }
        if self.telemetry.deploy_log_stream.trim().is_empty()
            || self.telemetry.model_pull_log_stream.trim().is_empty()
        {
            return Err(BootstrapError::ConfigError("telemetry log stream names must be set".to_string()));
        }
        if self.source.repo_url.trim().is_empty() {
            return Err(BootstrapError::ConfigError("source.repo_url is empty".to_string()));
        }
        if url::Url::parse(&self.source.repo_url).is_err() {
            return Err(BootstrapError::ConfigError(format!(
                "source.repo_url is not a valid URL: {}",
                self.source.repo_url
            )));
        }
        if self.source.user.trim().is_empty() {
            return Err(BootstrapError::ConfigError("source.user is empty".to_string()));
        }
        if self.model.name.trim().is_empty() {
            return Err(BootstrapError::ConfigError("model.name is empty".to_string()));
        }

        for (name, retry) in [
            ("workload.startup", &self.workload.startup),
            ("model.health_gate", &self.model.health_gate),
            ("model.pull", &self.model.pull),
        ] {
            if retry.max_attempts == 0 {
                return Err(BootstrapError::ConfigError(format!("{}.max_attempts must be at least 1", name)));
            }
        }
        if self.runtime.ready_poll_interval_secs == 0 {
            return Err(BootstrapError::ConfigError("runtime.ready_poll_interval_secs must be at least 1".to_string()));
        }

        Ok(())
    }
}

/// Bounded retry with a fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

impl RetrySettings {
    pub const fn new(max_attempts: u32, delay_secs: u64) -> Self {
        Self {
            max_attempts,
            delay_secs,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Telemetry agent and log destinations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySettings {
    /// Remote log group both files are shipped to
    #[serde(default)]
    pub log_group: String,

    /// Log stream for the deployment log
    #[serde(default)]
    pub deploy_log_stream: String,

    /// Log stream for the model-pull log
    #[serde(default)]
    pub model_pull_log_stream: String,

    /// Package URL of the telemetry agent
    #[serde(default = "default_agent_package_url")]
    pub agent_package_url: String,

    /// Installed package name, used to detect a prior installation
    #[serde(default = "default_agent_package_name")]
    pub agent_package_name: String,
}

fn default_agent_package_url() -> String {
    "https://s3.amazonaws.com/amazoncloudwatch-agent/ubuntu/amd64/latest/amazon-cloudwatch-agent.deb".to_string()
}

fn default_agent_package_name() -> String {
    "amazon-cloudwatch-agent".to_string()
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_group: String::new(),
            deploy_log_stream: String::new(),
            model_pull_log_stream: String::new(),
            agent_package_url: default_agent_package_url(),
            agent_package_name: default_agent_package_name(),
        }
    }
}

/// Package manager settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSettings {
    /// Base utilities
    #[serde(default = "default_base_packages")]
    pub base: Vec<String>,

    /// Container runtime packages
    #[serde(default = "default_runtime_packages")]
    pub runtime: Vec<String>,

    /// Retry count handed to the package manager
    #[serde(default = "default_package_retries")]
    pub retries: u32,
}

fn default_base_packages() -> Vec<String> {
    ["ca-certificates", "curl", "git", "jq", "unzip"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_runtime_packages() -> Vec<String> {
    ["docker.io", "docker-compose-v2"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_package_retries() -> u32 {
    3
}

impl PackageSettings {
    /// Every package, base utilities first
    pub fn all(&self) -> Vec<String> {
        self.base.iter().chain(self.runtime.iter()).cloned().collect()
    }
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            base: default_base_packages(),
            runtime: default_runtime_packages(),
            retries: default_package_retries(),
        }
    }
}

/// Container runtime daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default = "default_log_max_size")]
    pub log_max_size: String,

    #[serde(default = "default_log_max_file")]
    pub log_max_file: u32,

    #[serde(default = "default_storage_driver")]
    pub storage_driver: String,

    /// Prometheus metrics endpoint of the daemon
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,

    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,

    #[serde(default = "default_ready_poll_interval")]
    pub ready_poll_interval_secs: u64,
}

fn default_log_max_size() -> String {
    "100m".to_string()
}

fn default_log_max_file() -> u32 {
    3
}

fn default_storage_driver() -> String {
    "overlay2".to_string()
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9323".to_string()
}

fn default_ready_timeout() -> u64 {
    60
}

fn default_ready_poll_interval() -> u64 {
    1
}

impl RuntimeSettings {
    /// Readiness poll expressed as attempts at a fixed interval
    pub fn ready_poll(&self) -> RetrySettings {
        let interval = self.ready_poll_interval_secs.max(1);
        let attempts = (self.ready_timeout_secs / interval).max(1);
        RetrySettings::new(attempts.min(u32::MAX as u64) as u32, interval)
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            log_max_size: default_log_max_size(),
            log_max_file: default_log_max_file(),
            storage_driver: default_storage_driver(),
            metrics_addr: default_metrics_addr(),
            ready_timeout_secs: default_ready_timeout(),
            ready_poll_interval_secs: default_ready_poll_interval(),
        }
    }
}

/// Workload source repository settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// HTTPS clone URL, without credentials
    #[serde(default)]
    pub repo_url: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Unprivileged account owning the checkout and running the workload
    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_checkout_dir")]
    pub checkout_dir: PathBuf,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_user() -> String {
    "ubuntu".to_string()
}

fn default_checkout_dir() -> PathBuf {
    PathBuf::from("/home/ubuntu/workload")
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            repo_url: String::new(),
            branch: default_branch(),
            user: default_user(),
            checkout_dir: default_checkout_dir(),
        }
    }
}

/// Repository credential source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSettings {
    /// Environment variable checked first
    #[serde(default = "default_credential_env")]
    pub env_var: String,

    /// Secret file checked when the environment variable is unset
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// User name paired with the token for HTTP basic auth
    #[serde(default = "default_credential_username")]
    pub username: String,

    /// Persist the token to this path (mode 0600). Unset keeps the token
    /// off the disk.
    #[serde(default)]
    pub persist_to: Option<PathBuf>,
}

fn default_credential_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_credential_username() -> String {
    "x-access-token".to_string()
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            env_var: default_credential_env(),
            file: None,
            username: default_credential_username(),
            persist_to: None,
        }
    }
}

/// Containerised workload settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSettings {
    /// Inference container name, as declared in the compose file
    #[serde(default = "default_container_name")]
    pub container_name: String,

    /// Local port of the inference API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Local port of the web interface
    #[serde(default = "default_webui_port")]
    pub webui_port: u16,

    /// Path probed to decide whether the API is ready
    #[serde(default = "default_health_path")]
    pub health_path: String,

    #[serde(default = "default_startup_retry")]
    pub startup: RetrySettings,
}

fn default_container_name() -> String {
    "ollama".to_string()
}

fn default_api_port() -> u16 {
    11434
}

fn default_webui_port() -> u16 {
    8080
}

fn default_health_path() -> String {
    "/api/tags".to_string()
}

fn default_startup_retry() -> RetrySettings {
    RetrySettings::new(3, 30)
}

impl WorkloadSettings {
    pub fn api_health_url(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.api_port, self.health_path)
    }

    pub fn webui_url(&self) -> String {
        format!("http://127.0.0.1:{}/", self.webui_port)
    }
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        Self {
            container_name: default_container_name(),
            api_port: default_api_port(),
            webui_port: default_webui_port(),
            health_path: default_health_path(),
            startup: default_startup_retry(),
        }
    }
}

/// Model acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Model identifier passed to the pull command
    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_health_gate")]
    pub health_gate: RetrySettings,

    #[serde(default = "default_pull_retry")]
    pub pull: RetrySettings,
}

fn default_model_name() -> String {
    "deepseek-r1:70b".to_string()
}

fn default_health_gate() -> RetrySettings {
    RetrySettings::new(20, 30)
}

fn default_pull_retry() -> RetrySettings {
    RetrySettings::new(3, 60)
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            health_gate: default_health_gate(),
            pull: default_pull_retry(),
        }
    }
}

/// Instance facts. Informational only: logged at start and carried in the
/// model-pull status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSettings {
    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub instance_type: Option<String>,

    #[serde(default)]
    pub image_id: Option<String>,

    #[serde(default)]
    pub key_pair: Option<String>,

    #[serde(default)]
    pub storage_size_gb: Option<u32>,
}
