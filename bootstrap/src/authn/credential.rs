//! Repository credential resolution
//!
//! The token is resolved at runtime and handed to git through
//! process-scoped configuration. It is never part of a URL or a command line.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::errors::BootstrapError;
use crate::filesys::file::File;
use crate::host::CommandSpec;
use crate::storage::settings::CredentialSettings;

/// Source of the repository access token
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// The token, or `None` when no source provides one
    async fn repository_token(&self) -> Result<Option<SecretString>, BootstrapError>;
}

/// Reads the token from an environment variable, then from a secret file
#[derive(Debug, Clone)]
pub struct EnvOrFileSecretSource {
    env_var: String,
    file: Option<PathBuf>,
}

impl EnvOrFileSecretSource {
    pub fn new(env_var: impl Into<String>, file: Option<PathBuf>) -> Self {
        Self {
            env_var: env_var.into(),
            file,
        }
    }

    pub fn from_settings(settings: &CredentialSettings) -> Self {
        Self::new(settings.env_var.clone(), settings.file.clone())
    }
}

#[async_trait]
impl SecretSource for EnvOrFileSecretSource {
    async fn repository_token(&self) -> Result<Option<SecretString>, BootstrapError> {
        if let Ok(value) = std::env::var(&self.env_var) {
            let value = value.trim().to_string();
            if !value.is_empty() {
                debug!("Repository token found in ${}", self.env_var);
                return Ok(Some(SecretString::from(value)));
            }
        }

        if let Some(path) = &self.file {
            let file = File::new(path);
            if file.exists().await {
                let value = file.read_string().await?.trim().to_string();
                if !value.is_empty() {
                    debug!("Repository token read from {:?}", path);
                    return Ok(Some(SecretString::from(value)));
                }
            }
        }

        Ok(None)
    }
}

/// Fixed token, or none. For hosts where the token is known up front.
#[derive(Debug, Default)]
pub struct StaticSecretSource {
    token: Option<SecretString>,
}

impl StaticSecretSource {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: token.map(|t| SecretString::from(t.to_string())),
        }
    }
}

#[async_trait]
impl SecretSource for StaticSecretSource {
    async fn repository_token(&self) -> Result<Option<SecretString>, BootstrapError> {
        Ok(self
            .token
            .as_ref()
            .map(|t| SecretString::from(t.expose_secret().to_string())))
    }
}

/// `Authorization` header value for HTTP basic auth
pub fn basic_auth_header(username: &str, token: &SecretString) -> SecretString {
    let raw = format!("{}:{}", username, token.expose_secret());
    let encoded = base64::engine::general_purpose::STANDARD.encode(raw.as_bytes());
    SecretString::from(format!("Authorization: Basic {}", encoded))
}

/// Attach the token to a git command as an extra HTTP header scoped to the
/// repository origin, through `GIT_CONFIG_*` environment variables.
pub fn with_git_auth(
    command: CommandSpec,
    repo_url: &str,
    username: &str,
    token: &SecretString,
) -> Result<CommandSpec, BootstrapError> {
    let url = url::Url::parse(repo_url)
        .map_err(|e| BootstrapError::ConfigError(format!("Invalid repository URL {}: {}", repo_url, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| BootstrapError::ConfigError(format!("Repository URL has no host: {}", repo_url)))?;
    let origin = match url.port() {
        Some(port) => format!("{}://{}:{}/", url.scheme(), host, port),
        None => format!("{}://{}/", url.scheme(), host),
    };

    Ok(command
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_CONFIG_COUNT", "1")
        .env("GIT_CONFIG_KEY_0", format!("http.{}.extraHeader", origin))
        .secret_env("GIT_CONFIG_VALUE_0", basic_auth_header(username, token)))
}
