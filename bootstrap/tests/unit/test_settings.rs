//! Settings loading tests

use tokio_test::{assert_err, assert_ok};

use llmboot::errors::BootstrapError;
use llmboot::storage::settings::Settings;

use crate::common::{temp_root, test_settings};

#[tokio::test]
async fn test_load_applies_defaults() {
    let root = temp_root().await;
    let file = root.file("settings.json");
    file.write_json(&serde_json::json!({
        "telemetry": {
            "log_group": "llm-host",
            "deploy_log_stream": "deploy",
            "model_pull_log_stream": "model-pull"
        },
        "source": { "repo_url": "https://github.com/acme/llm-stack.git" }
    }))
    .await
    .unwrap();

    let settings = assert_ok!(Settings::load(&file).await);
    assert_eq!(settings.source.branch, "main");
    assert_eq!(settings.source.user, "ubuntu");
    assert_eq!(settings.credential.env_var, "GITHUB_TOKEN");
    assert!(settings.credential.persist_to.is_none());
    assert_eq!(settings.workload.api_port, 11434);
    assert_eq!(settings.workload.webui_port, 8080);
    assert_eq!(settings.model.health_gate.max_attempts, 20);
    assert_eq!(settings.model.pull.max_attempts, 3);
    assert_eq!(settings.workload.startup.delay_secs, 30);

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_load_rejects_missing_repository() {
    let root = temp_root().await;
    let file = root.file("settings.json");
    let mut settings = test_settings();
    settings.source.repo_url.clear();
    file.write_json(&settings).await.unwrap();

    let err = assert_err!(Settings::load(&file).await);
    assert!(matches!(err, BootstrapError::ConfigError(_)));

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_load_missing_file() {
    let root = temp_root().await;
    let err = assert_err!(Settings::load(&root.file("absent.json")).await);
    assert!(matches!(err, BootstrapError::ConfigError(_)));
    assert_eq!(err.exit_code(), 1);

    root.delete().await.unwrap();
}
