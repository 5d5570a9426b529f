//! Host abstraction
//!
//! Every side effect on the machine goes through [`Host`], so the
//! provisioning sequence can be driven against a scripted host in tests.

pub mod command;
pub mod system;

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::BootstrapError;
use crate::filesys::file::File;

pub use command::{CommandOutput, CommandSpec};
pub use system::SystemHost;

#[async_trait]
pub trait Host: Send + Sync {
    /// Run a command to completion
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, BootstrapError>;

    /// Start a command in its own process group with output discarded.
    /// Returns the process id when known.
    async fn spawn_detached(&self, command: &CommandSpec) -> Result<Option<u32>, BootstrapError>;

    /// Whether a GET on `url` answers with a success status
    async fn http_ok(&self, url: &str) -> bool;

    /// Download `url` into `dest`
    async fn download(&self, url: &str, dest: &File) -> Result<(), BootstrapError>;

    async fn sleep(&self, duration: Duration);

    /// Whether a process with this id is alive
    fn process_running(&self, pid: u32) -> bool;

    /// Logical CPU count
    fn cpu_count(&self) -> usize;
}
