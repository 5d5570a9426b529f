//! Telemetry agent shipping the local log files to remote log streams

pub mod agent;
