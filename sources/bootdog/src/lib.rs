/*!
# Introduction

bootdog brings a freshly provisioned VM in line with how its infrastructure provider describes
it.  It runs on every boot and on every settings refresh, so every step is safe to repeat.

The provider is chosen once, from configuration, and everything provider-specific sits behind
the `Infrastructure` trait:

* `setup_ssh` installs the public key published by the provider's metadata service
* `get_settings` fetches the agent settings from the registry named in user data
* `setup_networking` configures the DHCP client with the settings' DNS servers
* `get_ephemeral_disk_path` maps the provider's device hint to a device on the host

The host itself is reached through `Platform`, which writes SSH keys, drives `netdog` for
networking, and resolves device hints with a `DevicePathResolver`.

# Configuration

Configuration is read from a TOML file, `/etc/bootdog.toml` by default:

```toml
# hwcloud or qingcloud
provider = "qingcloud"
# the provider's metadata service
metadata_host = "http://169.254.169.254"
# timeout for metadata and registry requests
http_timeout_seconds = 10
# delay between gratuitous ARP announcements of a static address
arp_interval_ms = 1500
# hwcloud only: key to install when the metadata service has none
fallback_ssh_key = "ssh-rsa AAAA... bootdog"
# where the agent persists its settings
settings_path = "/var/vcap/bosh/settings.json"
```

Only `provider` is required.
*/

#![deny(rust_2018_idioms)]

pub mod config;
pub mod devicepath;
pub mod infrastructure;
pub mod platform;
pub mod registry;

#[cfg(test)]
mod mocks;

pub use config::Config;
pub use devicepath::{DevicePathResolver, MappedDevicePathResolver};
pub use infrastructure::{
    new_infrastructure, CommonInfrastructure, HwcloudInfrastructure, Infrastructure, Provider,
    QingcloudInfrastructure,
};
pub use platform::{LinuxPlatform, Platform};
pub use registry::{HttpRegistry, Registry};

mod error {
    use hostsys::ErrorKind;
    use reqwest::StatusCode;
    use snafu::Snafu;
    use std::path::PathBuf;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(crate)))]
    pub enum Error {
        #[snafu(display("Failed to parse config file {}: {}", path.display(), source))]
        ConfigParse {
            path: PathBuf,
            source: toml::de::Error,
        },

        #[snafu(display("Failed to read config file {}: {}", path.display(), source))]
        ConfigRead {
            path: PathBuf,
            source: std::io::Error,
        },

        #[snafu(display("Can't set up SSH for an empty username"))]
        EmptyUsername,

        #[snafu(display("Error getting public key: {}", source))]
        GetPublicKey { source: metadataclient::Error },

        #[snafu(display("Getting settings from registry: {}", source))]
        GetSettings {
            #[snafu(source(from(Error, Box::new)))]
            source: Box<Error>,
        },

        #[snafu(display("Error building HTTP client: {}", source))]
        HttpClient { source: reqwest::Error },

        #[snafu(display("Error receiving HTTP response from {}: {}", url, source))]
        HttpResponse { url: String, source: reqwest::Error },

        #[snafu(display("Error sending HTTP request to {}: {}", url, source))]
        HttpSend { url: String, source: reqwest::Error },

        #[snafu(display("Registry at {} answered {}: {}", url, code, response_body))]
        HttpStatus {
            url: String,
            code: StatusCode,
            response_body: String,
        },

        #[snafu(display("Network setup failed: {}", source))]
        Network { source: netdog::Error },

        #[snafu(display("Failed to get registry endpoint: {}", source))]
        RegistryEndpoint { source: metadataclient::Error },

        #[snafu(display("Invalid registry response from {}: {}", url, source))]
        RegistryResponse {
            url: String,
            source: serde_json::Error,
        },

        #[snafu(display("Failed to get server name: {}", source))]
        ServerName { source: metadataclient::Error },

        #[snafu(display("Invalid settings from registry: {}", source))]
        SettingsParse { source: serde_json::Error },

        #[snafu(display("Failed to set permissions on '{}': {}", path.display(), source))]
        SshPermissions {
            path: PathBuf,
            source: hostsys::Error,
        },

        #[snafu(display("Unknown provider '{}'", name))]
        UnknownProvider { name: String },

        #[snafu(display("Invalid registry URL '{}': {}", url, source))]
        UrlParse {
            url: String,
            source: url::ParseError,
        },

        #[snafu(display("Failed to write '{}': {}", path.display(), source))]
        WriteAuthorizedKeys {
            path: PathBuf,
            source: hostsys::Error,
        },
    }

    impl Error {
        pub fn kind(&self) -> ErrorKind {
            match self {
                Error::ConfigParse { .. }
                | Error::RegistryResponse { .. }
                | Error::SettingsParse { .. }
                | Error::UnknownProvider { .. }
                | Error::UrlParse { .. } => ErrorKind::MalformedData,
                Error::ConfigRead { .. } | Error::HttpStatus { .. } => ErrorKind::DataUnavailable,
                Error::EmptyUsername => ErrorKind::EmptyRequiredField,
                Error::HttpResponse { .. } | Error::HttpSend { .. } => {
                    ErrorKind::TransportUnavailable
                }
                Error::HttpClient { .. } => ErrorKind::Other,
                Error::GetPublicKey { source }
                | Error::RegistryEndpoint { source }
                | Error::ServerName { source } => source.kind(),
                Error::GetSettings { source } => source.kind(),
                Error::Network { source } => source.kind(),
                Error::SshPermissions { source, .. } | Error::WriteAuthorizedKeys { source, .. } => {
                    source.kind()
                }
            }
        }
    }
}

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
