//! The provisioning steps, in execution order

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::deploy::fsm::{BootstrapPhase, ModelPullState};
use crate::deploy::retry::{retry, RetryPolicy};
use crate::deploy::step::{Step, StepContext};
use crate::deploy::{compose, docker, git};
use crate::errors::BootstrapError;
use crate::filesys::file::File;
use crate::installer::apt;
use crate::models::pull_status::PullStatus;
use crate::monitoring::agent;
use crate::workers::model_pull;

/// Steps run by the orchestrator
pub fn default_steps() -> Vec<Box<dyn Step>> {
    vec![
        Box::new(HostPrepStep),
        Box::new(MonitoringAgentStep),
        Box::new(PackagesStep),
        Box::new(RuntimeConfigStep),
        Box::new(SourceCheckoutStep),
        Box::new(WorkloadStartupStep),
        Box::new(HandoffStep),
    ]
}

/// Log files and package manager tuning
pub struct HostPrepStep;

#[async_trait]
impl Step for HostPrepStep {
    fn phase(&self) -> BootstrapPhase {
        BootstrapPhase::HostPrep
    }

    async fn apply(&self, ctx: &StepContext) -> Result<(), BootstrapError> {
        for log in [ctx.layout.deploy_log(), ctx.layout.model_pull_log()] {
            log.touch().await?;
            log.set_mode(0o644).await?;
        }
        ctx.layout.state_dir().create().await?;

        let cores = ctx.host().cpu_count();
        apt::write_parallel_config(
            &ctx.layout.apt_parallel_conf(),
            cores,
            ctx.settings.packages.retries,
        )
        .await?;
        Ok(())
    }
}

/// Telemetry agent shipping both logs
pub struct MonitoringAgentStep;

#[async_trait]
impl Step for MonitoringAgentStep {
    fn phase(&self) -> BootstrapPhase {
        BootstrapPhase::MonitoringAgent
    }

    async fn apply(&self, ctx: &StepContext) -> Result<(), BootstrapError> {
        agent::install_and_start(ctx.host(), &ctx.layout, &ctx.settings.telemetry).await
    }
}

/// Base utilities and container runtime packages
pub struct PackagesStep;

#[async_trait]
impl Step for PackagesStep {
    fn phase(&self) -> BootstrapPhase {
        BootstrapPhase::Packages
    }

    async fn is_satisfied(&self, ctx: &StepContext) -> Result<bool, BootstrapError> {
        let missing = apt::missing_packages(ctx.host(), &ctx.settings.packages.all()).await;
        if !missing.is_empty() {
            debug!("Missing packages: {}", missing.join(" "));
        }
        Ok(missing.is_empty())
    }

    async fn apply(&self, ctx: &StepContext) -> Result<(), BootstrapError> {
        apt::install_packages(ctx.host(), &ctx.settings.packages, ctx.host().cpu_count()).await
    }
}

/// Daemon config, restart when needed, readiness poll
pub struct RuntimeConfigStep;

#[async_trait]
impl Step for RuntimeConfigStep {
    fn phase(&self) -> BootstrapPhase {
        BootstrapPhase::RuntimeConfig
    }

    async fn apply(&self, ctx: &StepContext) -> Result<(), BootstrapError> {
        let runtime = &ctx.settings.runtime;
        let changed = docker::write_daemon_config(&ctx.layout.docker_daemon_config(), runtime).await?;

        if changed || !docker::daemon_active(ctx.host()).await {
            docker::restart_daemon(ctx.host()).await?;
        } else {
            debug!("Daemon config unchanged and daemon active, no restart");
        }

        docker::wait_daemon_ready(ctx.host(), RetryPolicy::from(runtime.ready_poll())).await
    }
}

/// Authenticated checkout owned by the unprivileged account
pub struct SourceCheckoutStep;

#[async_trait]
impl Step for SourceCheckoutStep {
    fn phase(&self) -> BootstrapPhase {
        BootstrapPhase::SourceCheckout
    }

    async fn apply(&self, ctx: &StepContext) -> Result<(), BootstrapError> {
        let credential = &ctx.settings.credential;
        let token = ctx.secrets.repository_token().await?.ok_or_else(|| {
            BootstrapError::MissingCredential(format!(
                "No repository token in ${} or {}",
                credential.env_var,
                credential
                    .file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "a secret file".to_string())
            ))
        })?;

        let source = &ctx.settings.source;
        let target = ctx.checkout_dir();
        git::sync_repository(ctx.host(), source, &credential.username, &token, &target).await?;

        if let Some(path) = &credential.persist_to {
            let file = File::new(ctx.layout.resolve(path));
            file.write_private(token.expose_secret().as_bytes()).await?;
            info!("Repository token persisted to {:?}", file.path());
            git::chown_checkout(ctx.host(), &source.user, file.path()).await?;
        }

        git::chown_checkout(ctx.host(), &source.user, &target).await
    }
}

/// Compose stack startup with bounded retries
pub struct WorkloadStartupStep;

#[async_trait]
impl Step for WorkloadStartupStep {
    fn phase(&self) -> BootstrapPhase {
        BootstrapPhase::WorkloadStartup
    }

    async fn apply(&self, ctx: &StepContext) -> Result<(), BootstrapError> {
        let policy = RetryPolicy::from(ctx.settings.workload.startup);
        let host = ctx.host();
        let checkout = ctx.checkout_dir();
        let target = checkout.as_path();
        let user = ctx.settings.source.user.as_str();

        retry(policy, "Workload startup", move |d| host.sleep(d), move |_| {
            compose::compose_up(host, target, user)
        })
        .await
        .map_err(|exhausted| {
            BootstrapError::WorkloadError(format!(
                "Workload did not start after {} attempts: {}",
                exhausted.attempts, exhausted.last_error
            ))
        })
    }
}

/// Launch the detached model-pull task
pub struct HandoffStep;

#[async_trait]
impl Step for HandoffStep {
    fn phase(&self) -> BootstrapPhase {
        BootstrapPhase::Handoff
    }

    async fn is_satisfied(&self, ctx: &StepContext) -> Result<bool, BootstrapError> {
        let status = match PullStatus::load(&ctx.layout.model_pull_status()).await {
            Ok(Some(status)) => status,
            Ok(None) => return Ok(false),
            Err(e) => {
                debug!("Unreadable model-pull status, relaunching: {}", e);
                return Ok(false);
            }
        };

        if status.state == ModelPullState::Succeeded && status.model == ctx.settings.model.name {
            info!("Model {} already pulled", status.model);
            return Ok(true);
        }
        if !status.state.is_terminal() {
            if let Some(pid) = status.pid {
                if ctx.host().process_running(pid) {
                    info!("Model-pull task already running (pid {})", pid);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn apply(&self, ctx: &StepContext) -> Result<(), BootstrapError> {
        model_pull::launch(
            ctx.host(),
            &ctx.layout,
            &ctx.settings,
            &ctx.exe_path,
            &ctx.settings_path,
            &ctx.run_id,
        )
        .await?;
        Ok(())
    }
}
