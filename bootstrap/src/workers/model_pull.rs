//! Model-pull task
//!
//! Runs detached from the orchestrator: waits for the inference container to
//! be running and healthy, then pulls the model. Progress is written to the
//! status file at every transition so the outcome stays observable after the
//! orchestrator has exited.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::deploy::docker::{observe_container, pull_model, ContainerHealth};
use crate::deploy::fsm::{ModelPullEvent, ModelPullFsm};
use crate::deploy::retry::{FixedBackoff, RetryPolicy};
use crate::errors::BootstrapError;
use crate::filesys::file::File;
use crate::host::{CommandSpec, Host};
use crate::models::pull_status::PullStatus;
use crate::storage::layout::HostLayout;
use crate::storage::settings::{InstanceSettings, ModelSettings, Settings, WorkloadSettings};
use crate::utils::{generate_uuid, shell_quote};

/// The detached model-pull task
pub struct ModelPullTask {
    host: Arc<dyn Host>,
    workload: WorkloadSettings,
    model: ModelSettings,
    instance: InstanceSettings,
    status_file: File,
}

impl ModelPullTask {
    pub fn new(host: Arc<dyn Host>, settings: &Settings, layout: &HostLayout) -> Self {
        Self {
            host,
            workload: settings.workload.clone(),
            model: settings.model.clone(),
            instance: settings.instance.clone(),
            status_file: layout.model_pull_status(),
        }
    }

    /// Run the health gate, then the pull. Returns the final status.
    pub async fn run(&self) -> Result<PullStatus, BootstrapError> {
        let mut status = match PullStatus::load(&self.status_file).await {
            Ok(Some(status)) if !status.state.is_terminal() => status,
            Ok(_) => PullStatus::pending(&generate_uuid(), &self.model.name, &self.instance),
            Err(e) => {
                warn!("Ignoring unreadable status file {:?}: {}", self.status_file.path(), e);
                PullStatus::pending(&generate_uuid(), &self.model.name, &self.instance)
            }
        };
        status.model = self.model.name.clone();
        status.pid = Some(std::process::id());

        let mut fsm = ModelPullFsm::new();
        self.transition(&mut fsm, &mut status, ModelPullEvent::StartGate).await?;

        self.health_gate(&mut fsm, &mut status).await?;
        self.acquire(&mut fsm, &mut status).await?;

        Ok(status)
    }

    async fn health_gate(&self, fsm: &mut ModelPullFsm, status: &mut PullStatus) -> Result<(), BootstrapError> {
        let policy = RetryPolicy::from(self.model.health_gate);
        info!(
            "Waiting for container {} to be healthy (up to {} polls, {:?} apart)",
            self.workload.container_name, policy.max_attempts, policy.delay
        );

        let mut backoff = FixedBackoff::new(policy);
        while let Some(poll) = backoff.begin() {
            self.transition(fsm, status, ModelPullEvent::GatePoll).await?;

            match observe_container(self.host.as_ref(), &self.workload).await {
                ContainerHealth::Healthy => {
                    info!("Health gate passed on poll {}/{}", poll, policy.max_attempts);
                    return self.transition(fsm, status, ModelPullEvent::GatePassed).await;
                }
                reason => {
                    info!("Health gate poll {}/{}: {}", poll, policy.max_attempts, reason);
                    if !backoff.wait(|d| self.host.sleep(d)).await {
                        break;
                    }
                }
            }
        }

        let message = format!(
            "Container {} not healthy after {} polls",
            self.workload.container_name,
            backoff.attempt()
        );
        error!("{}", message);
        self.transition(fsm, status, ModelPullEvent::GateExhausted(message.clone()))
            .await?;
        Err(BootstrapError::HealthGateError(message))
    }

    async fn acquire(&self, fsm: &mut ModelPullFsm, status: &mut PullStatus) -> Result<(), BootstrapError> {
        let policy = RetryPolicy::from(self.model.pull);
        info!("Pulling model {}", self.model.name);

        let mut backoff = FixedBackoff::new(policy);
        let mut last_error = String::new();
        while let Some(attempt) = backoff.begin() {
            self.transition(fsm, status, ModelPullEvent::PullAttempt).await?;

            match pull_model(self.host.as_ref(), &self.workload.container_name, &self.model.name).await {
                Ok(()) => {
                    info!("Model {} successfully pulled", self.model.name);
                    return self.transition(fsm, status, ModelPullEvent::PullSucceeded).await;
                }
                Err(e) => {
                    warn!("Model pull attempt failed ({}/{}): {}", attempt, policy.max_attempts, e);
                    last_error = e.to_string();
                    if backoff.is_last() {
                        break;
                    }
                    info!("Retrying model pull in {:?}", policy.delay);
                    backoff.wait(|d| self.host.sleep(d)).await;
                }
            }
        }

        let message = format!(
            "Model {} could not be pulled after {} attempts: {}",
            self.model.name,
            backoff.attempt(),
            last_error
        );
        error!("{}", message);
        self.transition(fsm, status, ModelPullEvent::PullExhausted(message.clone()))
            .await?;
        Err(BootstrapError::ModelPullError(message))
    }

    async fn transition(
        &self,
        fsm: &mut ModelPullFsm,
        status: &mut PullStatus,
        event: ModelPullEvent,
    ) -> Result<(), BootstrapError> {
        fsm.process(event).map_err(BootstrapError::StateError)?;
        status.update_from(fsm);
        if let Err(e) = status.save(&self.status_file).await {
            warn!("Unable to write status file {:?}: {}", self.status_file.path(), e);
        }
        Ok(())
    }
}

/// Render the launcher script of the model-pull task. The task resolves
/// `settings_path` and every host path under `root`, like the orchestrator.
pub fn render_launcher(exe: &Path, settings_path: &Path, root: &Path) -> String {
    format!(
        "#!/bin/sh\n\
         # Generated by llmboot: waits for the inference container, then pulls the model.\n\
         exec {} --model-pull {} {} </dev/null >/dev/null 2>&1\n",
        shell_quote(&exe.to_string_lossy()),
        shell_quote(&format!("--settings={}", settings_path.display())),
        shell_quote(&format!("--root={}", root.display())),
    )
}

/// Materialise the launcher script, record a pending status and start the
/// task detached. Does not wait for the task.
pub async fn launch(
    host: &dyn Host,
    layout: &HostLayout,
    settings: &Settings,
    exe: &Path,
    settings_path: &Path,
    run_id: &str,
) -> Result<Option<u32>, BootstrapError> {
    let script = layout.model_pull_script();
    script
        .write_string(&render_launcher(exe, settings_path, &layout.root))
        .await?;
    script.set_mode(0o755).await?;
    info!("Wrote model-pull launcher to {:?}", script.path());

    let status = PullStatus::pending(run_id, &settings.model.name, &settings.instance);
    status.save(&layout.model_pull_status()).await?;

    let pid = host
        .spawn_detached(&CommandSpec::new(script.path().to_string_lossy()))
        .await?;
    match pid {
        Some(pid) => info!("Model-pull task started in the background (pid {})", pid),
        None => info!("Model-pull task started in the background"),
    }
    Ok(pid)
}
