use super::{CommonInfrastructure, Infrastructure};
use crate::devicepath::DevicePathResolver;
use crate::Result;
use agent_settings::{Networks, Settings};
use log::warn;
use std::sync::Arc;

/// Huawei Cloud.  Its metadata service doesn't always publish a key, so a fallback key can be
/// configured for that case.
pub struct HwcloudInfrastructure {
    common: CommonInfrastructure,
    fallback_ssh_key: Option<String>,
}

impl HwcloudInfrastructure {
    pub fn new(common: CommonInfrastructure, fallback_ssh_key: Option<String>) -> Self {
        Self {
            common,
            fallback_ssh_key,
        }
    }
}

impl Infrastructure for HwcloudInfrastructure {
    fn setup_ssh(&self, username: &str) -> Result<()> {
        let public_key = match (self.common.public_key(), &self.fallback_ssh_key) {
            (Ok(key), _) => key,
            (Err(e), Some(fallback)) => {
                warn!("{}, installing the configured fallback key", e);
                fallback.clone()
            }
            (Err(e), None) => return Err(e),
        };
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::mocks::{MockMetadata, MockPlatform, MockRegistry, NoDevices};

    fn hwcloud(
        metadata: MockMetadata,
        platform: Arc<MockPlatform>,
        fallback_ssh_key: Option<&str>,
    ) -> HwcloudInfrastructure {
        let common = CommonInfrastructure::new(
            Arc::new(metadata),
            Arc::new(MockRegistry { settings: None }),
            platform,
            Arc::new(NoDevices),
        );
        HwcloudInfrastructure::new(common, fallback_ssh_key.map(str::to_string))
    }

    #[test]
    fn metadata_key_wins() {
        let platform = Arc::new(MockPlatform::default());
        let metadata = MockMetadata {
            public_key: Some("ssh-rsa from-metadata".to_string()),
            ..Default::default()
        };
        hwcloud(metadata, platform.clone(), Some("ssh-rsa fallback"))
            .setup_ssh("vcap")
            .unwrap();
        assert_eq!(
            platform.calls().ssh,
            vec![("ssh-rsa from-metadata".to_string(), "vcap".to_string())]
        );
    }

    #[test]
    fn fallback_key() {
        let platform = Arc::new(MockPlatform::default());
        hwcloud(MockMetadata::default(), platform.clone(), Some("ssh-rsa fallback"))
            .setup_ssh("vcap")
            .unwrap();
        assert_eq!(
            platform.calls().ssh,
            vec![("ssh-rsa fallback".to_string(), "vcap".to_string())]
        );
    }

    #[test]
    fn no_key_at_all() {
        let platform = Arc::new(MockPlatform::default());
        let err = hwcloud(MockMetadata::default(), platform.clone(), None)
            .setup_ssh("vcap")
            .unwrap_err();
        assert!(matches!(err, crate::Error::GetPublicKey { .. }));
        assert!(platform.calls().ssh.is_empty());
    }

    #[test]
    fn empty_ephemeral_hint() {
        let platform = Arc::new(MockPlatform::default());
        let infrastructure = hwcloud(MockMetadata::default(), platform.clone(), None);
        assert_eq!(
            infrastructure.get_ephemeral_disk_path(""),
            (String::new(), true)
        );
        assert!(platform.calls().normalize.is_empty());
        assert_eq!(
            infrastructure.device_path_resolver().get_real_device_path("/dev/sdb"),
            (String::new(), false)
        );
    }
}
