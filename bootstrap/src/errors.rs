//! Error types for llmboot

use thiserror::Error;

/// Main error type for the bootstrap orchestrator and the model-pull task
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Command error: {0}")]
    CommandError(String),

    #[error("Monitoring agent error: {0}")]
    MonitoringError(String),

    #[error("Package installation error: {0}")]
    PackageError(String),

    #[error("Container runtime error: {0}")]
    RuntimeError(String),

    #[error("Source checkout error: {0}")]
    CheckoutError(String),

    #[error("Workload error: {0}")]
    WorkloadError(String),

    #[error("Health gate error: {0}")]
    HealthGateError(String),

    #[error("Model pull error: {0}")]
    ModelPullError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BootstrapError {
    /// Process exit code for a fatal error. Every fatal condition ends the
    /// run with a non-zero status and the log file as the audit trail.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
