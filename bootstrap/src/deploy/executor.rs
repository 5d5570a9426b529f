//! Bootstrap orchestrator

use serde::Serialize;
use tracing::{error, info};

use crate::deploy::fsm::{BootstrapEvent, BootstrapFsm, BootstrapPhase, BootstrapState};
use crate::deploy::step::{Step, StepContext};
use crate::deploy::steps::default_steps;
use crate::errors::BootstrapError;

/// What happened to one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Applied,
    Skipped,
}

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub steps: Vec<(BootstrapPhase, StepOutcome)>,
}

/// Runs the provisioning steps in order, stopping at the first failure
pub struct Orchestrator {
    ctx: StepContext,
    steps: Vec<Box<dyn Step>>,
    fsm: BootstrapFsm,
}

impl Orchestrator {
    pub fn new(ctx: StepContext) -> Self {
        Self::with_steps(ctx, default_steps())
    }

    pub fn with_steps(ctx: StepContext, steps: Vec<Box<dyn Step>>) -> Self {
        Self {
            ctx,
            steps,
            fsm: BootstrapFsm::new(),
        }
    }

    pub fn context(&self) -> &StepContext {
        &self.ctx
    }

    pub fn state(&self) -> &BootstrapState {
        self.fsm.state()
    }

    /// Run every step. On error the FSM is left in `Failed` and the error is
    /// returned; the caller exits non-zero.
    pub async fn run(&mut self) -> Result<RunReport, BootstrapError> {
        info!("Starting bootstrap run {}", self.ctx.run_id);
        let instance = &self.ctx.settings.instance;
        info!(
            "Instance: region={} type={} image={} key_pair={} storage_gb={}",
            instance.region.as_deref().unwrap_or("-"),
            instance.instance_type.as_deref().unwrap_or("-"),
            instance.image_id.as_deref().unwrap_or("-"),
            instance.key_pair.as_deref().unwrap_or("-"),
            instance
                .storage_size_gb
                .map(|gb| gb.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );

        let mut report = RunReport {
            run_id: self.ctx.run_id.clone(),
            steps: Vec::with_capacity(self.steps.len()),
        };

        for step in &self.steps {
            let phase = step.phase();
            self.fsm
                .process(BootstrapEvent::Start(phase))
                .map_err(BootstrapError::StateError)?;
            info!("==> {}", phase);

            let result = match step.is_satisfied(&self.ctx).await {
                Ok(true) => {
                    info!("{}: already satisfied, skipping", phase);
                    Ok(StepOutcome::Skipped)
                }
                Ok(false) => step.apply(&self.ctx).await.map(|_| StepOutcome::Applied),
                Err(e) => Err(e),
            };

            match result {
                Ok(outcome) => {
                    self.fsm
                        .process(BootstrapEvent::Succeed)
                        .map_err(BootstrapError::StateError)?;
                    report.steps.push((phase, outcome));
                }
                Err(e) => {
                    error!("{} failed: {}", phase, e);
                    self.fsm
                        .process(BootstrapEvent::Fail(e.to_string()))
                        .map_err(BootstrapError::StateError)?;
                    return Err(e);
                }
            }
        }

        self.fsm
            .process(BootstrapEvent::Finish)
            .map_err(BootstrapError::StateError)?;
        info!("Bootstrap run {} completed; model pull continues in the background", self.ctx.run_id);
        Ok(report)
    }
}
