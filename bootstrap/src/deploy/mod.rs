//! Provisioning sequence and the workload deployment pieces it drives

pub mod compose;
pub mod docker;
pub mod executor;
pub mod fsm;
pub mod git;
pub mod retry;
pub mod step;
pub mod steps;
