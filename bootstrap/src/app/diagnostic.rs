//! One-shot health report

use colored::Colorize;

use crate::deploy::docker::{container_running, daemon_active};
use crate::deploy::fsm::ModelPullState;
use crate::errors::BootstrapError;
use crate::host::{CommandSpec, Host};
use crate::models::pull_status::PullStatus;
use crate::storage::layout::HostLayout;
use crate::storage::settings::Settings;
use crate::telemetry::{collect_host_facts, format_gib};

/// Result of one diagnostic check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    fn new(name: &str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed,
            detail: detail.into(),
        }
    }
}

/// Run every check against the host
pub async fn collect_checks(host: &dyn Host, settings: &Settings, layout: &HostLayout) -> Vec<CheckResult> {
    let workload = &settings.workload;
    let mut checks = Vec::new();

    let active = daemon_active(host).await;
    let info_ok = matches!(
        host.run(&CommandSpec::new("docker").arg("info")).await,
        Ok(output) if output.success()
    );
    checks.push(CheckResult::new(
        "container runtime",
        active && info_ok,
        if active && info_ok { "active and answering" } else { "not ready" },
    ));

    let running = container_running(host, &workload.container_name).await;
    checks.push(CheckResult::new(
        "inference container",
        running,
        format!("{} {}", workload.container_name, if running { "running" } else { "not running" }),
    ));

    // The API is only probed once the container runs, as in the health gate.
    let api = running && host.http_ok(&workload.api_health_url()).await;
    checks.push(CheckResult::new("inference API", api, workload.api_health_url()));

    let webui = host.http_ok(&workload.webui_url()).await;
    checks.push(CheckResult::new("web interface", webui, workload.webui_url()));

    let status_file = layout.model_pull_status();
    let (pulled, detail) = match PullStatus::load(&status_file).await {
        Ok(Some(status)) => (
            status.state == ModelPullState::Succeeded,
            format!("{} {}", status.model, status.state),
        ),
        Ok(None) => (false, "no status yet".to_string()),
        Err(e) => (false, format!("unreadable status: {}", e)),
    };
    checks.push(CheckResult::new("model", pulled, detail));

    checks
}

/// Print the health report. Fails when any check fails.
pub async fn run_diagnostic(host: &dyn Host, settings: &Settings, layout: &HostLayout) -> Result<(), BootstrapError> {
    let facts = collect_host_facts();
    println!("llmboot diagnostics");
    println!("===================");
    println!(
        "Host: {} ({} cores, {} memory, {} of {} disk free)",
        facts.hostname,
        facts.cpu_count,
        format_gib(facts.memory_total),
        format_gib(facts.disk_available),
        format_gib(facts.disk_total),
    );
    println!();

    let checks = collect_checks(host, settings, layout).await;
    for check in &checks {
        let mark = if check.passed { "ok".green() } else { "FAIL".red() };
        println!("[{}] {:<20} {}", mark, check.name, check.detail);
    }

    let failed = checks.iter().filter(|c| !c.passed).count();
    if failed > 0 {
        return Err(BootstrapError::Internal(format!("{} check(s) failed", failed)));
    }
    Ok(())
}
