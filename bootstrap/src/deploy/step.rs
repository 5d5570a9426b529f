//! Provisioning step abstraction

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::authn::credential::SecretSource;
use crate::deploy::fsm::BootstrapPhase;
use crate::errors::BootstrapError;
use crate::host::Host;
use crate::storage::layout::HostLayout;
use crate::storage::settings::Settings;
use crate::utils::generate_uuid;

/// Everything a step may touch
pub struct StepContext {
    pub host: Arc<dyn Host>,
    pub secrets: Arc<dyn SecretSource>,
    pub settings: Settings,
    pub layout: HostLayout,

    /// Binary relaunched by the model-pull launcher
    pub exe_path: PathBuf,

    /// Settings file handed to the model-pull task
    pub settings_path: PathBuf,

    /// Identifier of this bootstrap run
    pub run_id: String,
}

impl StepContext {
    pub fn new(
        host: Arc<dyn Host>,
        secrets: Arc<dyn SecretSource>,
        settings: Settings,
        layout: HostLayout,
        exe_path: PathBuf,
        settings_path: PathBuf,
    ) -> Self {
        Self {
            host,
            secrets,
            settings,
            layout,
            exe_path,
            settings_path,
            run_id: generate_uuid(),
        }
    }

    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    /// Checkout directory on this host
    pub fn checkout_dir(&self) -> PathBuf {
        self.layout.resolve(&self.settings.source.checkout_dir)
    }
}

/// One idempotent provisioning action.
///
/// `is_satisfied` is the postcondition: when it holds the step is skipped.
/// `apply` must tolerate partial prior execution.
#[async_trait]
pub trait Step: Send + Sync {
    fn phase(&self) -> BootstrapPhase;

    async fn is_satisfied(&self, _ctx: &StepContext) -> Result<bool, BootstrapError> {
        Ok(false)
    }

    async fn apply(&self, ctx: &StepContext) -> Result<(), BootstrapError>;
}
