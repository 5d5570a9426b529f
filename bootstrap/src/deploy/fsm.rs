//! Finite state machines for the bootstrap sequence and the model-pull task

use std::fmt;

use serde::{Deserialize, Serialize};

/// Provisioning phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPhase {
    HostPrep,
    MonitoringAgent,
    Packages,
    RuntimeConfig,
    SourceCheckout,
    WorkloadStartup,
    Handoff,
}

impl BootstrapPhase {
    pub const ALL: [BootstrapPhase; 7] = [
        BootstrapPhase::HostPrep,
        BootstrapPhase::MonitoringAgent,
        BootstrapPhase::Packages,
        BootstrapPhase::RuntimeConfig,
        BootstrapPhase::SourceCheckout,
        BootstrapPhase::WorkloadStartup,
        BootstrapPhase::Handoff,
    ];

    pub fn first() -> Self {
        Self::ALL[0]
    }

    /// Phase that follows this one, `None` for the last phase
    pub fn next(&self) -> Option<Self> {
        let index = Self::ALL.iter().position(|p| p == self)?;
        Self::ALL.get(index + 1).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapPhase::HostPrep => "host prep",
            BootstrapPhase::MonitoringAgent => "monitoring agent install",
            BootstrapPhase::Packages => "package installation",
            BootstrapPhase::RuntimeConfig => "container runtime configuration",
            BootstrapPhase::SourceCheckout => "source checkout",
            BootstrapPhase::WorkloadStartup => "workload startup",
            BootstrapPhase::Handoff => "background task handoff",
        }
    }
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrator state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "phase")]
pub enum BootstrapState {
    /// Nothing started yet
    Pending,

    /// Phase in progress
    InPhase(BootstrapPhase),

    /// Phase finished, next one not started
    PhaseComplete(BootstrapPhase),

    /// Every phase finished
    Completed,

    /// A phase failed; the run is over
    Failed(BootstrapPhase),
}

/// Orchestrator event
#[derive(Debug, Clone)]
pub enum BootstrapEvent {
    /// Start the given phase
    Start(BootstrapPhase),

    /// Phase in progress succeeded (or was already satisfied)
    Succeed,

    /// Phase in progress failed
    Fail(String),

    /// All phases done
    Finish,
}

/// Bootstrap FSM. Phases can only run in order and only once per run.
#[derive(Debug, Clone)]
pub struct BootstrapFsm {
    state: BootstrapState,
    error: Option<String>,
}

impl BootstrapFsm {
    pub fn new() -> Self {
        Self {
            state: BootstrapState::Pending,
            error: None,
        }
    }

    pub fn state(&self) -> &BootstrapState {
        &self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, BootstrapState::Completed | BootstrapState::Failed(_))
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: BootstrapEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (BootstrapState::Pending, BootstrapEvent::Start(phase)) if *phase == BootstrapPhase::first() => {
                BootstrapState::InPhase(*phase)
            }
            (BootstrapState::PhaseComplete(done), BootstrapEvent::Start(phase))
                if done.next() == Some(*phase) =>
            {
                BootstrapState::InPhase(*phase)
            }

            (BootstrapState::InPhase(phase), BootstrapEvent::Succeed) => BootstrapState::PhaseComplete(*phase),
            (BootstrapState::InPhase(phase), BootstrapEvent::Fail(err)) => {
                self.error = Some(err.clone());
                BootstrapState::Failed(*phase)
            }

            (BootstrapState::PhaseComplete(phase), BootstrapEvent::Finish) if phase.next().is_none() => {
                BootstrapState::Completed
            }

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for BootstrapFsm {
    fn default() -> Self {
        Self::new()
    }
}

/// Model-pull task state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelPullState {
    /// Launched by the orchestrator, not started yet
    Pending,

    /// Waiting for the inference container to be running and healthy
    HealthGate,

    /// Pulling the model
    Pulling,

    /// Model pulled
    Succeeded,

    /// Health gate or pull exhausted
    Failed,
}

impl ModelPullState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelPullState::Pending => "pending",
            ModelPullState::HealthGate => "health_gate",
            ModelPullState::Pulling => "pulling",
            ModelPullState::Succeeded => "succeeded",
            ModelPullState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ModelPullState::Succeeded | ModelPullState::Failed)
    }
}

impl fmt::Display for ModelPullState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model-pull event
#[derive(Debug, Clone)]
pub enum ModelPullEvent {
    /// Enter the health gate
    StartGate,

    /// One health poll was made
    GatePoll,

    /// Container running and API healthy
    GatePassed,

    /// Health gate exhausted
    GateExhausted(String),

    /// One pull attempt was made
    PullAttempt,

    /// Model pulled
    PullSucceeded,

    /// Pull attempts exhausted
    PullExhausted(String),
}

/// Model-pull FSM. A pull can never be attempted before the health gate
/// passed.
#[derive(Debug, Clone)]
pub struct ModelPullFsm {
    state: ModelPullState,
    gate_polls: u32,
    pull_attempts: u32,
    error: Option<String>,
}

impl ModelPullFsm {
    pub fn new() -> Self {
        Self {
            state: ModelPullState::Pending,
            gate_polls: 0,
            pull_attempts: 0,
            error: None,
        }
    }

    pub fn state(&self) -> ModelPullState {
        self.state
    }

    pub fn gate_polls(&self) -> u32 {
        self.gate_polls
    }

    pub fn pull_attempts(&self) -> u32 {
        self.pull_attempts
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: ModelPullEvent) -> Result<(), String> {
        let new_state = match (self.state, &event) {
            (ModelPullState::Pending, ModelPullEvent::StartGate) => ModelPullState::HealthGate,

            (ModelPullState::HealthGate, ModelPullEvent::GatePoll) => {
                self.gate_polls += 1;
                ModelPullState::HealthGate
            }
            (ModelPullState::HealthGate, ModelPullEvent::GatePassed) if self.gate_polls > 0 => {
                ModelPullState::Pulling
            }
            (ModelPullState::HealthGate, ModelPullEvent::GateExhausted(err)) => {
                self.error = Some(err.clone());
                ModelPullState::Failed
            }

            (ModelPullState::Pulling, ModelPullEvent::PullAttempt) => {
                self.pull_attempts += 1;
                ModelPullState::Pulling
            }
            (ModelPullState::Pulling, ModelPullEvent::PullSucceeded) if self.pull_attempts > 0 => {
                ModelPullState::Succeeded
            }
            (ModelPullState::Pulling, ModelPullEvent::PullExhausted(err)) => {
                self.error = Some(err.clone());
                ModelPullState::Failed
            }

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for ModelPullFsm {
    fn default() -> Self {
        Self::new()
    }
}
