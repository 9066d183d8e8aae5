use crate::devicepath::DevicePathResolver;
use crate::platform::Platform;
use crate::registry::Registry;
use crate::{error, Result};
use agent_settings::{Networks, Settings};
use log::info;
use metadataclient::MetadataService;
use snafu::ResultExt;
use std::sync::Arc;

/// The collaborators and behavior every provider shares.  Provider types wrap this and only
/// spell out where they differ.
pub struct CommonInfrastructure {
    metadata: Arc<dyn MetadataService>,
    registry: Arc<dyn Registry>,
    platform: Arc<dyn Platform>,
    device_path_resolver: Arc<dyn DevicePathResolver>,
}

impl CommonInfrastructure {
    pub fn new(
        metadata: Arc<dyn MetadataService>,
        registry: Arc<dyn Registry>,
        platform: Arc<dyn Platform>,
        device_path_resolver: Arc<dyn DevicePathResolver>,
    ) -> Self {
        Self {
            metadata,
            registry,
            platform,
            device_path_resolver,
        }
    }

    pub(crate) fn public_key(&self) -> Result<String> {
        self.metadata
            .get_public_key()
            .context(error::GetPublicKeySnafu)
    }

    pub(crate) fn install_ssh_key(&self, public_key: &str, username: &str) -> Result<()> {
        self.platform.setup_ssh(public_key, username)
    }

    pub(crate) fn get_settings(&self) -> Result<Settings> {
        self.registry
            .get_settings()
            .context(error::GetSettingsSnafu)
    }

    pub(crate) fn setup_networking(&self, networks: &Networks) -> Result<()> {
        self.platform.setup_dhcp(networks)
    }

    pub(crate) fn get_ephemeral_disk_path(&self, hint: &str) -> (String, bool) {
        if hint.is_empty() {
            info!("Ephemeral disk path is empty");
            return (String::new(), true);
        }
        self.platform.normalize_disk_path(hint)
    }

    pub(crate) fn device_path_resolver(&self) -> Arc<dyn DevicePathResolver> {
        Arc::clone(&self.device_path_resolver)
    }
}
