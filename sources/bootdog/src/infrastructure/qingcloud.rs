use super::{CommonInfrastructure, Infrastructure};
use crate::devicepath::DevicePathResolver;
use crate::Result;
use agent_settings::{Networks, Settings};
use std::sync::Arc;

/// QingCloud.
pub struct QingcloudInfrastructure {
    common: CommonInfrastructure,
}

impl QingcloudInfrastructure {
    pub fn new(common: CommonInfrastructure) -> Self {
        Self { common }
    }
}

impl Infrastructure for QingcloudInfrastructure {
    fn setup_ssh(&self, username: &str) -> Result<()> {
        let public_key = self.common.public_key()?;
        self.common.install_ssh_key(&public_key, username)
    }

    fn get_settings(&self) -> Result<Settings> {
        self.common.get_settings()
    }

    fn setup_networking(&self, networks: &Networks) -> Result<()> {
        self.common.setup_networking(networks)
    }

    fn get_ephemeral_disk_path(&self, hint: &str) -> (String, bool) {
        self.common.get_ephemeral_disk_path(hint)
    }

    fn device_path_resolver(&self) -> Arc<dyn DevicePathResolver> {
        self.common.device_path_resolver()
    }
}
