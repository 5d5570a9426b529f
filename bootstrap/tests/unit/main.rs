//! Unit and scenario tests for llmboot

mod test_fsm;
mod test_orchestrator;
mod test_settings;
