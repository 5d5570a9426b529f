//! Command dispatch

use std::sync::Arc;

use colored::Colorize;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

use crate::app::diagnostic::run_diagnostic;
use crate::app::options::{AppOptions, Command};
use crate::authn::credential::EnvOrFileSecretSource;
use crate::deploy::executor::Orchestrator;
use crate::deploy::fsm::ModelPullState;
use crate::deploy::step::StepContext;
use crate::errors::BootstrapError;
use crate::filesys::file::File;
use crate::host::{Host, SystemHost};
use crate::logs::{init_logging, LogLevel, LogOptions};
use crate::models::pull_status::PullStatus;
use crate::storage::layout::HostLayout;
use crate::storage::settings::Settings;
use crate::utils::version_info;
use crate::workers::model_pull::ModelPullTask;

/// Run the requested command
pub async fn run(options: AppOptions) -> Result<(), BootstrapError> {
    let layout = HostLayout::new(std::path::absolute(&options.root)?);

    match options.command {
        Command::Version => {
            println!("{}", serde_json::to_string_pretty(&version_info())?);
            Ok(())
        }
        Command::Orchestrate => orchestrate(&options, &layout).await,
        Command::ModelPull => model_pull(&options, &layout).await,
        Command::Status => print_status(&layout).await,
        Command::Check => {
            let settings = Settings::load(&settings_file(&options, &layout)).await?;
            let host = SystemHost::new(false)?;
            run_diagnostic(&host, &settings, &layout).await
        }
    }
}

fn settings_file(options: &AppOptions, layout: &HostLayout) -> File {
    File::new(layout.resolve(&options.settings_path))
}

/// Load settings, then start logging into `log_file` at the configured
/// level. A settings error is logged before it is returned.
async fn load_with_logging(
    options: &AppOptions,
    layout: &HostLayout,
    log_file: &File,
    stdout: bool,
) -> Result<(Settings, Option<WorkerGuard>), BootstrapError> {
    log_file.touch().await?;

    let settings = Settings::load(&settings_file(options, layout)).await;
    let log_level = settings
        .as_ref()
        .map(|s| s.log_level.clone())
        .unwrap_or(LogLevel::Info);

    let guard = init_logging(LogOptions {
        log_level,
        stdout,
        log_file: Some(log_file.path().to_path_buf()),
        json_format: options.json_logs,
    })?;

    match settings {
        Ok(settings) => Ok((settings, guard)),
        Err(e) => {
            error!("{}", e);
            Err(e)
        }
    }
}

async fn orchestrate(options: &AppOptions, layout: &HostLayout) -> Result<(), BootstrapError> {
    let deploy_log = layout.deploy_log();
    let (settings, _guard) = load_with_logging(options, layout, &deploy_log, true).await?;
    info!("llmboot {} starting", version_info().version);

    let host: Arc<dyn Host> = Arc::new(SystemHost::new(true)?);
    let mut credential = settings.credential.clone();
    credential.file = credential.file.map(|path| layout.resolve(path));
    let secrets = Arc::new(EnvOrFileSecretSource::from_settings(&credential));
    let exe_path = std::env::current_exe()?;

    let ctx = StepContext::new(
        host,
        secrets,
        settings,
        layout.clone(),
        exe_path,
        options.settings_path.clone(),
    );
    let mut orchestrator = Orchestrator::new(ctx);
    match orchestrator.run().await {
        Ok(report) => {
            info!("Deployment completed ({} steps)", report.steps.len());
            Ok(())
        }
        Err(e) => {
            error!("Deployment failed: {}", e);
            Err(e)
        }
    }
}

async fn model_pull(options: &AppOptions, layout: &HostLayout) -> Result<(), BootstrapError> {
    let pull_log = layout.model_pull_log();
    let (settings, _guard) = load_with_logging(options, layout, &pull_log, false).await?;

    let host: Arc<dyn Host> = Arc::new(SystemHost::new(true)?);
    let task = ModelPullTask::new(host, &settings, layout);
    task.run().await.map(|_| ())
}

async fn print_status(layout: &HostLayout) -> Result<(), BootstrapError> {
    let file = layout.model_pull_status();
    let Some(status) = PullStatus::load(&file).await? else {
        println!("{} no model-pull status at {:?}", "unknown".yellow(), file.path());
        return Ok(());
    };

    let state = match status.state {
        ModelPullState::Succeeded => status.state.as_str().green(),
        ModelPullState::Failed => status.state.as_str().red(),
        _ => status.state.as_str().yellow(),
    };
    println!("Model:         {}", status.model);
    println!("State:         {}", state);
    println!("Health polls:  {}", status.gate_polls);
    println!("Pull attempts: {}", status.pull_attempts);
    println!("Started:       {}", status.started_at.to_rfc3339());
    println!("Updated:       {}", status.updated_at.to_rfc3339());
    if let Some(finished_at) = status.finished_at {
        println!("Finished:      {}", finished_at.to_rfc3339());
    }
    if let Some(error) = &status.error {
        println!("Error:         {}", error.red());
    }

    if status.state == ModelPullState::Failed {
        return Err(BootstrapError::ModelPullError(
            status.error.unwrap_or_else(|| "model pull failed".to_string()),
        ));
    }
    Ok(())
}
