//! CloudWatch agent installation and configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::BootstrapError;
use crate::host::{CommandSpec, Host};
use crate::installer::apt::package_installed;
use crate::storage::layout::HostLayout;
use crate::storage::settings::TelemetrySettings;

const AGENT_CTL: &str = "/opt/aws/amazon-cloudwatch-agent/bin/amazon-cloudwatch-agent-ctl";

/// Agent configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent: AgentSection,
    pub logs: LogsSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSection {
    pub run_as_user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsSection {
    pub logs_collected: LogsCollected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsCollected {
    pub files: CollectFiles,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectFiles {
    pub collect_list: Vec<CollectEntry>,
}

/// One local file shipped to one remote stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectEntry {
    pub file_path: String,
    pub log_group_name: String,
    pub log_stream_name: String,
    pub timezone: String,
}

impl AgentConfig {
    /// Map the deployment log and the model-pull log to their streams
    pub fn for_logs(telemetry: &TelemetrySettings, deploy_log: &Path, model_pull_log: &Path) -> Self {
        let entry = |path: &Path, stream: &str| CollectEntry {
            file_path: path.to_string_lossy().into_owned(),
            log_group_name: telemetry.log_group.clone(),
            log_stream_name: stream.to_string(),
            timezone: "UTC".to_string(),
        };

        Self {
            agent: AgentSection {
                run_as_user: "root".to_string(),
            },
            logs: LogsSection {
                logs_collected: LogsCollected {
                    files: CollectFiles {
                        collect_list: vec![
                            entry(deploy_log, &telemetry.deploy_log_stream),
                            entry(model_pull_log, &telemetry.model_pull_log_stream),
                        ],
                    },
                },
            },
        }
    }
}

async fn run_checked(host: &dyn Host, cmd: CommandSpec, what: &str) -> Result<(), BootstrapError> {
    let output = host.run(&cmd).await?;
    if !output.success() {
        return Err(BootstrapError::MonitoringError(format!(
            "{} failed: {}",
            what,
            output.last_error_line()
        )));
    }
    Ok(())
}

/// Install the agent if needed, write its configuration and (re)start it
pub async fn install_and_start(
    host: &dyn Host,
    layout: &HostLayout,
    telemetry: &TelemetrySettings,
) -> Result<(), BootstrapError> {
    if package_installed(host, &telemetry.agent_package_name).await {
        debug!("{} already installed", telemetry.agent_package_name);
    } else {
        let package = layout.telemetry_agent_package();
        info!("Downloading monitoring agent from {}", telemetry.agent_package_url);
        host.download(&telemetry.agent_package_url, &package)
            .await
            .map_err(|e| BootstrapError::MonitoringError(format!("Agent download failed: {}", e)))?;

        let install = CommandSpec::new("dpkg")
            .args(["-i", "-E"])
            .arg(package.path().to_string_lossy());
        run_checked(host, install, "Agent package install").await?;
        package.delete().await?;
    }

    let config = AgentConfig::for_logs(
        telemetry,
        layout.deploy_log().path(),
        layout.model_pull_log().path(),
    );
    let config_file = layout.telemetry_agent_config();
    let rendered = serde_json::to_string_pretty(&config)?;
    if config_file.write_if_changed(&rendered).await? {
        info!("Wrote monitoring agent config to {:?}", config_file.path());
    }

    let start = CommandSpec::new(AGENT_CTL)
        .args(["-a", "fetch-config", "-m", "ec2", "-s", "-c"])
        .arg(format!("file:{}", config_file.path().display()));
    run_checked(host, start, "Agent start").await?;

    info!(
        "Monitoring agent shipping logs to group {} (streams {}, {})",
        telemetry.log_group, telemetry.deploy_log_stream, telemetry.model_pull_log_stream
    );
    Ok(())
}
