//! llmboot Library
//!
//! Bootstrap orchestrator and model-pull task for a single-host LLM
//! inference workload.

pub mod app;
pub mod authn;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod host;
pub mod installer;
pub mod logs;
pub mod models;
pub mod monitoring;
pub mod storage;
pub mod telemetry;
pub mod utils;
pub mod workers;
