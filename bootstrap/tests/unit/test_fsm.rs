//! FSM unit tests

use llmboot::deploy::fsm::{
    BootstrapEvent, BootstrapFsm, BootstrapPhase, BootstrapState, ModelPullEvent, ModelPullFsm,
    ModelPullState,
};

#[test]
fn test_bootstrap_fsm_initial_state() {
    let fsm = BootstrapFsm::new();
    assert_eq!(fsm.state(), &BootstrapState::Pending);
    assert!(fsm.error().is_none());
    assert!(!fsm.is_terminal());
}

#[test]
fn test_bootstrap_fsm_rejects_skipped_phase() {
    let mut fsm = BootstrapFsm::new();
    assert!(fsm.process(BootstrapEvent::Start(BootstrapPhase::Packages)).is_err());

    fsm.process(BootstrapEvent::Start(BootstrapPhase::HostPrep)).unwrap();
    fsm.process(BootstrapEvent::Succeed).unwrap();
    assert!(fsm.process(BootstrapEvent::Start(BootstrapPhase::Packages)).is_err());
    assert_eq!(fsm.state(), &BootstrapState::PhaseComplete(BootstrapPhase::HostPrep));
}

#[test]
fn test_bootstrap_fsm_rejects_early_finish() {
    let mut fsm = BootstrapFsm::new();
    fsm.process(BootstrapEvent::Start(BootstrapPhase::HostPrep)).unwrap();
    fsm.process(BootstrapEvent::Succeed).unwrap();
    assert!(fsm.process(BootstrapEvent::Finish).is_err());
}

#[test]
fn test_bootstrap_fsm_failure_is_terminal() {
    let mut fsm = BootstrapFsm::new();
    fsm.process(BootstrapEvent::Start(BootstrapPhase::HostPrep)).unwrap();
    fsm.process(BootstrapEvent::Fail("disk full".to_string())).unwrap();

    assert_eq!(fsm.state(), &BootstrapState::Failed(BootstrapPhase::HostPrep));
    assert_eq!(fsm.error(), Some("disk full"));
    assert!(fsm.is_terminal());
    assert!(fsm.process(BootstrapEvent::Start(BootstrapPhase::MonitoringAgent)).is_err());
}

#[test]
fn test_model_pull_fsm_success_flow() {
    let mut fsm = ModelPullFsm::new();
    assert_eq!(fsm.state(), ModelPullState::Pending);

    fsm.process(ModelPullEvent::StartGate).unwrap();
    assert_eq!(fsm.state(), ModelPullState::HealthGate);

    for _ in 0..3 {
        fsm.process(ModelPullEvent::GatePoll).unwrap();
    }
    fsm.process(ModelPullEvent::GatePassed).unwrap();
    assert_eq!(fsm.state(), ModelPullState::Pulling);

    fsm.process(ModelPullEvent::PullAttempt).unwrap();
    fsm.process(ModelPullEvent::PullSucceeded).unwrap();
    assert_eq!(fsm.state(), ModelPullState::Succeeded);
    assert_eq!(fsm.gate_polls(), 3);
    assert_eq!(fsm.pull_attempts(), 1);
    assert!(fsm.state().is_terminal());
}

#[test]
fn test_model_pull_fsm_pull_requires_gate() {
    let mut fsm = ModelPullFsm::new();
    assert!(fsm.process(ModelPullEvent::PullAttempt).is_err());

    fsm.process(ModelPullEvent::StartGate).unwrap();
    assert!(fsm.process(ModelPullEvent::PullAttempt).is_err());

    // Passing the gate needs at least one observation
    assert!(fsm.process(ModelPullEvent::GatePassed).is_err());
    assert_eq!(fsm.state(), ModelPullState::HealthGate);
    assert_eq!(fsm.pull_attempts(), 0);
}

#[test]
fn test_model_pull_fsm_success_requires_attempt() {
    let mut fsm = ModelPullFsm::new();
    fsm.process(ModelPullEvent::StartGate).unwrap();
    fsm.process(ModelPullEvent::GatePoll).unwrap();
    fsm.process(ModelPullEvent::GatePassed).unwrap();
    assert!(fsm.process(ModelPullEvent::PullSucceeded).is_err());
}

#[test]
fn test_model_pull_fsm_pull_exhausted() {
    let mut fsm = ModelPullFsm::new();
    fsm.process(ModelPullEvent::StartGate).unwrap();
    fsm.process(ModelPullEvent::GatePoll).unwrap();
    fsm.process(ModelPullEvent::GatePassed).unwrap();
    for _ in 0..3 {
        fsm.process(ModelPullEvent::PullAttempt).unwrap();
    }
    fsm.process(ModelPullEvent::PullExhausted("registry unreachable".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), ModelPullState::Failed);
    assert_eq!(fsm.error(), Some("registry unreachable"));
    assert!(fsm.process(ModelPullEvent::PullAttempt).is_err());
}
