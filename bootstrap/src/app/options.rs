//! Command line options

use std::collections::HashMap;
use std::path::PathBuf;

use crate::errors::BootstrapError;

/// What the binary was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the bootstrap sequence (default)
    Orchestrate,

    /// Run the detached model-pull task
    ModelPull,

    /// Print the model-pull status
    Status,

    /// One-shot health report
    Check,

    /// Print version information
    Version,
}

/// Application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub command: Command,

    /// Settings file, as a host path
    pub settings_path: PathBuf,

    /// Root every host path is resolved under
    pub root: PathBuf,

    /// Emit JSON log lines
    pub json_logs: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            command: Command::Orchestrate,
            settings_path: PathBuf::from("/etc/llmboot/settings.json"),
            root: PathBuf::from("/"),
            json_logs: false,
        }
    }
}

impl AppOptions {
    /// Build options from `--key=value` / `--flag` arguments
    pub fn from_args(args: &HashMap<String, String>) -> Result<Self, BootstrapError> {
        let mut options = Self::default();

        let commands: Vec<Command> = [
            ("orchestrate", Command::Orchestrate),
            ("model-pull", Command::ModelPull),
            ("status", Command::Status),
            ("check", Command::Check),
            ("diagnostic", Command::Check),
            ("version", Command::Version),
        ]
        .into_iter()
        .filter(|(flag, _)| args.contains_key(*flag))
        .map(|(_, command)| command)
        .collect();

        match commands.as_slice() {
            [] => {}
            [command] => options.command = *command,
            _ => {
                return Err(BootstrapError::ConfigError(
                    "Only one of --orchestrate, --model-pull, --status, --check, --version may be given".to_string(),
                ))
            }
        }

        if let Some(path) = args.get("settings") {
            options.settings_path = PathBuf::from(path);
        }
        if let Some(root) = args.get("root") {
            options.root = PathBuf::from(root);
        }
        if let Some(format) = args.get("log-format") {
            options.json_logs = match format.as_str() {
                "json" => true,
                "text" => false,
                other => {
                    return Err(BootstrapError::ConfigError(format!("Invalid log format: {}", other)));
                }
            };
        }

        Ok(options)
    }
}

/// Parse `--key=value` and `--flag` arguments
pub fn parse_args<I>(args: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = String>,
{
    let mut cli_args = HashMap::new();
    for arg in args {
        if let Some((key, value)) = arg.split_once('=') {
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }
    cli_args
}
