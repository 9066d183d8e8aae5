//! bootdog's configuration file.

use crate::infrastructure::Provider;
use crate::{error, Result};
use serde::Deserialize;
use snafu::ResultExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/bootdog.toml";
const DEFAULT_METADATA_HOST: &str = "http://169.254.169.254";
const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_ARP_INTERVAL_MS: u64 = 1500;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub provider: Provider,
    #[serde(default = "default_metadata_host")]
    pub metadata_host: String,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_arp_interval_ms")]
    pub arp_interval_ms: u64,
    #[serde(default)]
    pub fallback_ssh_key: Option<String>,
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,
}

fn default_metadata_host() -> String {
    DEFAULT_METADATA_HOST.to_string()
}

fn default_http_timeout_seconds() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECONDS
}

fn default_arp_interval_ms() -> u64 {
    DEFAULT_ARP_INTERVAL_MS
}

fn default_settings_path() -> PathBuf {
    PathBuf::from(diskdog::SETTINGS_PATH)
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).context(error::ConfigReadSnafu { path })?;
        toml::from_str(&s).context(error::ConfigParseSnafu { path })
    }

    /// Timeout for every HTTP request bootdog makes, metadata service and registry alike.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn arp_interval(&self) -> Duration {
        Duration::from_millis(self.arp_interval_ms)
    }
}
