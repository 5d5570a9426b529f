//! Model-pull completion signal

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::{ModelPullFsm, ModelPullState};
use crate::errors::BootstrapError;
use crate::filesys::file::File;
use crate::storage::settings::InstanceSettings;

/// Status of the model-pull task, rewritten on every state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullStatus {
    pub run_id: String,
    pub model: String,
    pub state: ModelPullState,
    pub gate_polls: u32,
    pub pull_attempts: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub instance: InstanceSettings,
}

impl PullStatus {
    /// Status written by the orchestrator right before it launches the task
    pub fn pending(run_id: &str, model: &str, instance: &InstanceSettings) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.to_string(),
            model: model.to_string(),
            state: ModelPullState::Pending,
            gate_polls: 0,
            pull_attempts: 0,
            started_at: now,
            updated_at: now,
            finished_at: None,
            pid: None,
            error: None,
            instance: instance.clone(),
        }
    }

    /// Copy the FSM state into the status
    pub fn update_from(&mut self, fsm: &ModelPullFsm) {
        let now = Utc::now();
        self.state = fsm.state();
        self.gate_polls = fsm.gate_polls();
        self.pull_attempts = fsm.pull_attempts();
        self.error = fsm.error().map(str::to_string);
        self.updated_at = now;
        if self.state.is_terminal() {
            self.finished_at = Some(now);
        }
    }

    pub async fn load(file: &File) -> Result<Option<Self>, BootstrapError> {
        if !file.exists().await {
            return Ok(None);
        }
        Ok(Some(file.read_json().await?))
    }

    pub async fn save(&self, file: &File) -> Result<(), BootstrapError> {
        let contents = serde_json::to_string_pretty(self)?;
        file.write_atomic(contents.as_bytes()).await
    }
}
