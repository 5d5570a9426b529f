//! Bootstrap orchestrator scenarios against a scripted host

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use llmboot::deploy::executor::{Orchestrator, StepOutcome};
use llmboot::deploy::fsm::{BootstrapPhase, BootstrapState, ModelPullState};
use llmboot::errors::BootstrapError;
use llmboot::filesys::dir::Dir;
use llmboot::filesys::file::File;
use llmboot::host::CommandOutput;
use llmboot::models::pull_status::PullStatus;
use llmboot::storage::layout::HostLayout;

use crate::common::{temp_root, test_context, Event, FakeHost, FAKE_PID};

const TOKEN: &str = "ghp_0123456789abcdef";

#[tokio::test]
async fn test_fresh_host_runs_every_step() {
    let root = temp_root().await;
    let host = Arc::new(FakeHost::new());
    let mut orchestrator = Orchestrator::new(test_context(host.clone(), &root, Some(TOKEN)));

    let report = assert_ok!(orchestrator.run().await);
    assert_eq!(orchestrator.state(), &BootstrapState::Completed);
    assert_eq!(
        report.steps,
        BootstrapPhase::ALL
            .iter()
            .map(|phase| (*phase, StepOutcome::Applied))
            .collect::<Vec<_>>()
    );

    let layout = HostLayout::new(root.path());
    for log in [layout.deploy_log(), layout.model_pull_log()] {
        assert!(log.exists().await);
        assert_eq!(log.mode().await.unwrap(), 0o644);
    }

    let apt_conf = layout.apt_parallel_conf().read_string().await.unwrap();
    assert!(apt_conf.contains("Acquire::http::Pipeline-Depth \"8\";"));
    assert!(apt_conf.contains("Acquire::Retries \"3\";"));

    let agent_conf = layout.telemetry_agent_config().read_string().await.unwrap();
    assert!(agent_conf.contains("llm-host"));
    assert!(agent_conf.contains("i-0abc/model-pull"));
    assert!(!layout.telemetry_agent_package().exists().await);

    assert!(layout.docker_daemon_config().exists().await);
    assert!(host.ran("apt-get"));
    assert!(host.ran("dpkg -i -E"));
    assert!(host.ran("systemctl restart docker"));
    assert!(host.ran("docker info"));

    let script = layout.model_pull_script();
    assert_eq!(script.mode().await.unwrap(), 0o755);
    let launcher = script.read_string().await.unwrap();
    assert!(launcher.contains("--model-pull --settings=/etc/llmboot/settings.json"));
    assert!(launcher.contains(&format!("--root={}", root.path().display())));
    assert_eq!(host.spawns(), vec![script.path().to_string_lossy().to_string()]);

    let status = PullStatus::load(&layout.model_pull_status()).await.unwrap().unwrap();
    assert_eq!(status.state, ModelPullState::Pending);
    assert_eq!(status.model, "deepseek-r1:70b");
    assert_eq!(status.run_id, orchestrator.context().run_id);

    // Steps ran strictly in order and nothing slept
    let runs = host.runs();
    let position = |prefix: &str| runs.iter().position(|r| r.line.starts_with(prefix)).unwrap();
    assert!(position("apt-get") < position("systemctl restart docker"));
    assert!(position("systemctl restart docker") < position("git clone"));
    assert!(position("git clone") < position("chown -R ubuntu:ubuntu"));
    assert!(position("chown -R ubuntu:ubuntu") < position("docker compose up -d"));
    assert!(host.sleeps().is_empty());

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_token_never_reaches_command_line() {
    let root = temp_root().await;
    let host = Arc::new(FakeHost::new());
    let mut orchestrator = Orchestrator::new(test_context(host.clone(), &root, Some(TOKEN)));
    assert_ok!(orchestrator.run().await);

    let clone = host
        .runs()
        .into_iter()
        .find(|r| r.line.starts_with("git clone"))
        .unwrap();
    assert!(clone.line.contains("https://github.com/acme/llm-stack.git"));
    assert_eq!(clone.user, None);
    assert!(clone.secret_env_keys.contains(&"GIT_CONFIG_VALUE_0".to_string()));
    for record in host.runs() {
        assert!(!record.line.contains(TOKEN));
        assert!(!record.line.contains("x-access-token"));
    }

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_token_persisted_only_when_configured() {
    let root = temp_root().await;
    let host = Arc::new(FakeHost::new());
    let mut ctx = test_context(host.clone(), &root, Some(TOKEN));
    ctx.settings.credential.persist_to = Some(PathBuf::from("/home/ubuntu/.llm-stack-token"));
    assert_ok!(Orchestrator::new(ctx).run().await);

    let token_file = File::new(root.path().join("home/ubuntu/.llm-stack-token"));
    assert_eq!(token_file.read_string().await.unwrap(), TOKEN);
    assert_eq!(token_file.mode().await.unwrap(), 0o600);
    assert!(host.ran(&format!("chown -R ubuntu:ubuntu {}", token_file.path().display())));

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_missing_credential_fails_before_clone() {
    let root = temp_root().await;
    let host = Arc::new(FakeHost::new());
    let mut orchestrator = Orchestrator::new(test_context(host.clone(), &root, None));

    let err = assert_err!(orchestrator.run().await);
    assert!(matches!(err, BootstrapError::MissingCredential(_)));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(
        orchestrator.state(),
        &BootstrapState::Failed(BootstrapPhase::SourceCheckout)
    );

    assert!(!host.ran("git"));
    assert!(!host.ran("docker compose"));
    assert!(host.spawns().is_empty());

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_rerun_on_provisioned_host() {
    let root = temp_root().await;
    let layout = HostLayout::new(root.path());

    let first = Arc::new(FakeHost::provisioned());
    let mut orchestrator = Orchestrator::new(test_context(first.clone(), &root, Some(TOKEN)));
    assert_ok!(orchestrator.run().await);
    assert!(!first.ran("apt-get"));

    let daemon_config = layout.docker_daemon_config().read_string().await.unwrap();
    let agent_config = layout.telemetry_agent_config().read_string().await.unwrap();

    // The first run left a checkout and a finished model pull behind
    Dir::new(root.path().join("home/ubuntu/llm-stack/.git")).create().await.unwrap();
    let mut status = PullStatus::load(&layout.model_pull_status()).await.unwrap().unwrap();
    status.state = ModelPullState::Succeeded;
    status.save(&layout.model_pull_status()).await.unwrap();

    let second = Arc::new(FakeHost::provisioned());
    let mut orchestrator = Orchestrator::new(test_context(second.clone(), &root, Some(TOKEN)));
    let report = assert_ok!(orchestrator.run().await);

    assert!(report.steps.contains(&(BootstrapPhase::Packages, StepOutcome::Skipped)));
    assert!(report.steps.contains(&(BootstrapPhase::Handoff, StepOutcome::Skipped)));
    assert!(!second.ran("apt-get"));
    assert!(!second.ran("dpkg -i"));
    assert!(!second.ran("systemctl restart docker"));
    assert!(!second.ran("git clone"));
    let pull = second
        .runs()
        .into_iter()
        .find(|r| r.line.starts_with("git -C"))
        .unwrap();
    assert!(pull.line.ends_with("pull --ff-only origin main"));
    assert_eq!(pull.user.as_deref(), Some("ubuntu"));
    assert!(pull.secret_env_keys.contains(&"GIT_CONFIG_VALUE_0".to_string()));
    assert!(second.spawns().is_empty());
    assert!(!second.events().iter().any(|e| matches!(e, Event::Download(_))));

    assert_eq!(layout.docker_daemon_config().read_string().await.unwrap(), daemon_config);
    assert_eq!(layout.telemetry_agent_config().read_string().await.unwrap(), agent_config);
    let status = PullStatus::load(&layout.model_pull_status()).await.unwrap().unwrap();
    assert_eq!(status.state, ModelPullState::Succeeded);

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_handoff_skipped_while_task_alive() {
    let root = temp_root().await;
    let layout = HostLayout::new(root.path());

    let mut status = PullStatus::pending("previous", "deepseek-r1:70b", &Default::default());
    status.state = ModelPullState::HealthGate;
    status.pid = Some(FAKE_PID);
    status.save(&layout.model_pull_status()).await.unwrap();

    let host = Arc::new(FakeHost::provisioned());
    host.set_running(FAKE_PID);
    let mut orchestrator = Orchestrator::new(test_context(host.clone(), &root, Some(TOKEN)));
    let report = assert_ok!(orchestrator.run().await);

    assert_eq!(report.steps.last(), Some(&(BootstrapPhase::Handoff, StepOutcome::Skipped)));
    assert!(host.spawns().is_empty());

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_daemon_restarted_when_inactive() {
    let root = temp_root().await;

    let first = Arc::new(FakeHost::provisioned());
    assert_ok!(Orchestrator::new(test_context(first.clone(), &root, Some(TOKEN))).run().await);
    assert!(first.ran("systemctl restart docker"));

    let second = Arc::new(FakeHost::provisioned());
    second.on("systemctl is-active", vec![CommandOutput::failed(3, "")]);
    assert_ok!(Orchestrator::new(test_context(second.clone(), &root, Some(TOKEN))).run().await);
    assert_eq!(second.count("systemctl restart docker"), 1);

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_daemon_never_ready() {
    let root = temp_root().await;
    let host = Arc::new(FakeHost::new());
    host.on(
        "docker info",
        vec![CommandOutput::failed(1, "Cannot connect to the Docker daemon")],
    );
    let mut orchestrator = Orchestrator::new(test_context(host.clone(), &root, Some(TOKEN)));

    let err = assert_err!(orchestrator.run().await);
    assert!(matches!(err, BootstrapError::RuntimeError(_)));
    assert_eq!(host.count("docker info"), 60);
    assert_eq!(host.sleeps(), vec![Duration::from_secs(1); 59]);
    assert!(!host.ran("git"));

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_daemon_ready_after_polls() {
    let root = temp_root().await;
    let host = Arc::new(FakeHost::new());
    host.on(
        "docker info",
        vec![
            CommandOutput::failed(1, "starting"),
            CommandOutput::failed(1, "starting"),
            CommandOutput::ok("Server Version: 24.0.7"),
        ],
    );

    assert_ok!(Orchestrator::new(test_context(host.clone(), &root, Some(TOKEN))).run().await);
    assert_eq!(host.count("docker info"), 3);
    assert_eq!(host.sleeps(), vec![Duration::from_secs(1); 2]);

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_workload_startup_exhausted() {
    let root = temp_root().await;
    let host = Arc::new(FakeHost::new());
    host.on("docker compose", vec![CommandOutput::failed(1, "unknown command: compose")]);
    host.on("docker-compose", vec![CommandOutput::failed(1, "pull access denied")]);
    let mut orchestrator = Orchestrator::new(test_context(host.clone(), &root, Some(TOKEN)));

    let err = assert_err!(orchestrator.run().await);
    assert!(matches!(err, BootstrapError::WorkloadError(_)));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(
        orchestrator.state(),
        &BootstrapState::Failed(BootstrapPhase::WorkloadStartup)
    );

    assert_eq!(host.count("docker compose up -d"), 3);
    assert_eq!(host.count("docker-compose up -d"), 3);
    assert_eq!(host.sleeps(), vec![Duration::from_secs(30); 2]);
    assert!(host.spawns().is_empty());

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_workload_started_as_unprivileged_user() {
    let root = temp_root().await;
    let host = Arc::new(FakeHost::new());
    host.on(
        "docker compose",
        vec![CommandOutput::failed(1, "network timeout"), CommandOutput::ok("")],
    );
    host.on("docker-compose", vec![CommandOutput::failed(127, "docker-compose: not found")]);

    assert_ok!(Orchestrator::new(test_context(host.clone(), &root, Some(TOKEN))).run().await);

    let compose: Vec<_> = host
        .runs()
        .into_iter()
        .filter(|r| r.line == "docker compose up -d")
        .collect();
    assert_eq!(compose.len(), 2);
    for record in &compose {
        assert_eq!(record.user.as_deref(), Some("ubuntu"));
        assert_eq!(
            record.current_dir.as_deref(),
            Some(root.path().join("home/ubuntu/llm-stack").as_path())
        );
    }
    assert_eq!(host.count("docker-compose up -d"), 1);
    assert_eq!(host.sleeps(), vec![Duration::from_secs(30)]);
    assert_eq!(host.spawns().len(), 1);

    root.delete().await.unwrap();
}

/// No step after the failed one touched the host
fn assert_stopped_after(host: &FakeHost) {
    assert!(!host.ran("docker info"));
    assert!(!host.ran("git"));
    assert!(!host.ran("docker compose"));
    assert!(host.spawns().is_empty());
}

#[tokio::test]
async fn test_agent_download_failure_is_fatal() {
    let root = temp_root().await;
    let host = Arc::new(FakeHost::new());
    host.fail_downloads();
    let mut orchestrator = Orchestrator::new(test_context(host.clone(), &root, Some(TOKEN)));

    let err = assert_err!(orchestrator.run().await);
    assert!(matches!(err, BootstrapError::MonitoringError(_)));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(
        orchestrator.state(),
        &BootstrapState::Failed(BootstrapPhase::MonitoringAgent)
    );
    assert!(!host.ran("dpkg -i"));
    assert!(!host.ran("apt-get"));
    assert_stopped_after(&host);

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_agent_install_failure_is_fatal() {
    let root = temp_root().await;
    let host = Arc::new(FakeHost::new());
    host.on("dpkg -i", vec![CommandOutput::failed(1, "dpkg: error processing archive")]);
    let mut orchestrator = Orchestrator::new(test_context(host.clone(), &root, Some(TOKEN)));

    let err = assert_err!(orchestrator.run().await);
    assert!(matches!(err, BootstrapError::MonitoringError(_)));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(
        orchestrator.state(),
        &BootstrapState::Failed(BootstrapPhase::MonitoringAgent)
    );
    assert!(!host.ran("/opt/aws/amazon-cloudwatch-agent/bin/amazon-cloudwatch-agent-ctl"));
    assert!(!host.ran("apt-get"));
    assert_stopped_after(&host);

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_agent_start_failure_is_fatal() {
    let root = temp_root().await;
    let host = Arc::new(FakeHost::provisioned());
    host.on(
        "/opt/aws/amazon-cloudwatch-agent/bin/amazon-cloudwatch-agent-ctl",
        vec![CommandOutput::failed(1, "Invalid config")],
    );
    let mut orchestrator = Orchestrator::new(test_context(host.clone(), &root, Some(TOKEN)));

    let err = assert_err!(orchestrator.run().await);
    assert!(matches!(err, BootstrapError::MonitoringError(_)));
    assert_eq!(
        orchestrator.state(),
        &BootstrapState::Failed(BootstrapPhase::MonitoringAgent)
    );
    assert_stopped_after(&host);

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_package_index_failure_is_fatal() {
    let root = temp_root().await;
    let host = Arc::new(FakeHost::new());
    host.on("apt-get", vec![CommandOutput::failed(100, "E: Could not get lock")]);
    let mut orchestrator = Orchestrator::new(test_context(host.clone(), &root, Some(TOKEN)));

    let err = assert_err!(orchestrator.run().await);
    assert!(matches!(err, BootstrapError::PackageError(_)));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(orchestrator.state(), &BootstrapState::Failed(BootstrapPhase::Packages));

    // Only the index refresh ran
    assert_eq!(host.count("apt-get"), 1);
    assert!(host.runs().iter().any(|r| r.line.ends_with("-y update")));
    assert_stopped_after(&host);

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_package_install_failure_is_fatal() {
    let root = temp_root().await;
    let host = Arc::new(FakeHost::new());
    host.on(
        "apt-get",
        vec![
            CommandOutput::ok("Reading package lists..."),
            CommandOutput::failed(100, "E: Unable to locate package docker-compose-v2"),
        ],
    );
    let mut orchestrator = Orchestrator::new(test_context(host.clone(), &root, Some(TOKEN)));

    let err = assert_err!(orchestrator.run().await);
    assert!(matches!(err, BootstrapError::PackageError(_)));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(orchestrator.state(), &BootstrapState::Failed(BootstrapPhase::Packages));
    assert_eq!(host.count("apt-get"), 2);
    assert!(host.sleeps().is_empty());
    assert_stopped_after(&host);

    root.delete().await.unwrap();
}
