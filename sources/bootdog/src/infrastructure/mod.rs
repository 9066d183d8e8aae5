//! Provider-specific behavior behind a common contract.

mod common;
mod hwcloud;
mod qingcloud;

pub use common::CommonInfrastructure;
pub use hwcloud::HwcloudInfrastructure;
pub use qingcloud::QingcloudInfrastructure;

use crate::config::Config;
use crate::devicepath::DevicePathResolver;
use crate::{error, Result};
use agent_settings::{Networks, Settings};
use serde::Deserialize;
use snafu::OptionExt;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// What the agent needs from the infrastructure the VM runs on.
pub trait Infrastructure: Send + Sync {
    /// Authorizes the provider's public key for `username`.
    fn setup_ssh(&self, username: &str) -> Result<()>;

    fn get_settings(&self) -> Result<Settings>;

    fn setup_networking(&self, networks: &Networks) -> Result<()>;

    /// Maps the settings' ephemeral disk hint to a device on the host.  An empty hint means
    /// the VM has no ephemeral disk, which counts as found.
    fn get_ephemeral_disk_path(&self, hint: &str) -> (String, bool);

    fn device_path_resolver(&self) -> Arc<dyn DevicePathResolver>;
}

/// The supported infrastructure providers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Hwcloud,
    Qingcloud,
}

impl Provider {
    const ALL: [Provider; 2] = [Provider::Hwcloud, Provider::Qingcloud];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Hwcloud => "hwcloud",
            Provider::Qingcloud => "qingcloud",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Provider {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str() == s)
            .context(error::UnknownProviderSnafu { name: s })
    }
}

/// Builds the infrastructure for the configured provider.
pub fn new_infrastructure(config: &Config, common: CommonInfrastructure) -> Box<dyn Infrastructure> {
    match config.provider {
        Provider::Hwcloud => Box::new(HwcloudInfrastructure::new(
            common,
            config.fallback_ssh_key.clone(),
        )),
        Provider::Qingcloud => Box::new(QingcloudInfrastructure::new(common)),
    }
}
