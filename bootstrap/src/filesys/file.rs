//! File operations

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::errors::BootstrapError;
use crate::utils::sha256_hash;

/// A file wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, BootstrapError> {
        let mut file = fs::File::open(&self.path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;
        Ok(contents)
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, BootstrapError> {
        let contents = self.read_string().await?;
        let value = serde_json::from_str(&contents)?;
        Ok(value)
    }

    /// Write string to file
    pub async fn write_string(&self, contents: &str) -> Result<(), BootstrapError> {
        self.ensure_parent().await?;

        let mut file = fs::File::create(&self.path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Write JSON to file
    pub async fn write_json<T: Serialize>(&self, value: &T) -> Result<(), BootstrapError> {
        let contents = serde_json::to_string_pretty(value)?;
        self.write_string(&contents).await
    }

    /// Write the contents only when they differ from what is on disk.
    ///
    /// Returns `true` when the file was (re)written.
    pub async fn write_if_changed(&self, contents: &str) -> Result<bool, BootstrapError> {
        if self.exists().await {
            let current = self.read_string().await?;
            if sha256_hash(current.as_bytes()) == sha256_hash(contents.as_bytes()) {
                return Ok(false);
            }
        }
        self.write_atomic(contents.as_bytes()).await?;
        Ok(true)
    }

    /// Create the file if it is missing. Existing contents are kept.
    pub async fn touch(&self) -> Result<(), BootstrapError> {
        self.ensure_parent().await?;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        Ok(())
    }

    /// Append bytes to the end of the file, creating it if needed
    pub async fn append(&self, contents: &[u8]) -> Result<(), BootstrapError> {
        self.ensure_parent().await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(contents).await?;
        file.flush().await?;
        Ok(())
    }

    /// Delete the file
    pub async fn delete(&self) -> Result<(), BootstrapError> {
        if self.exists().await {
            fs::remove_file(&self.path).await?;
        }
        Ok(())
    }

    /// Set Unix permission bits (e.g. `0o600`, `0o755`).
    ///
    /// A no-op on non-Unix platforms.
    pub async fn set_mode(&self, mode: u32) -> Result<(), BootstrapError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = fs::metadata(&self.path).await?;
            let mut perms = meta.permissions();
            perms.set_mode(mode);
            fs::set_permissions(&self.path, perms).await?;
        }
        #[cfg(not(unix))]
        let _ = mode;
        Ok(())
    }

    /// Unix permission bits of the file
    #[cfg(unix)]
    pub async fn mode(&self) -> Result<u32, BootstrapError> {
        use std::os::unix::fs::PermissionsExt;
        let meta = fs::metadata(&self.path).await?;
        Ok(meta.permissions().mode() & 0o7777)
    }

    /// Atomic write using a temporary file
    pub async fn write_atomic(&self, contents: &[u8]) -> Result<(), BootstrapError> {
        self.ensure_parent().await?;
        let temp_path = self.path.with_extension("tmp");

        // Write to temp file
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        // Rename to target
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    /// Atomic write of a file only its owner can read. The temporary file is
    /// created with mode 0600, so the contents never exist with wider
    /// permissions.
    pub async fn write_private(&self, contents: &[u8]) -> Result<(), BootstrapError> {
        self.ensure_parent().await?;
        let temp_path = self.path.with_extension("tmp");
        if fs::metadata(&temp_path).await.is_ok() {
            fs::remove_file(&temp_path).await?;
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    async fn ensure_parent(&self) -> Result<(), BootstrapError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }
}
