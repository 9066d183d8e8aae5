/*!
# Introduction

metadataclient answers the questions the agent asks its infrastructure provider about the VM:
which SSH public key to install, what the instance id is, and where the registry holding the
agent's settings lives.

Providers publish this through an HTTP metadata service:

* `<host>/latest/meta-data/public-keys/0/openssh-key`
* `<host>/latest/meta-data/instance-id`
* `<host>/latest/user-data`

When the service can't be reached, or answers 404, the public key and user data are read from
the local file `/var/vcap/bosh/user_data.json` instead.  The instance id has no local fallback.

User data is JSON of the form:

```json
{"Registry": {"Endpoint": "http://registry:25777"},
 "Server": {"Name": "vm-384sd4"},
 "DNS": {"Nameserver": ["10.0.0.2"]}}
```

When nameservers are given, the registry endpoint's hostname is resolved against exactly those
nameservers and only the host part of the endpoint is replaced with the address.

Nothing is cached; every call fetches fresh data.
*/

#![deny(rust_2018_idioms)]

mod endpoint;
mod source;

pub use source::{
    FallbackSource, FileMetadataSource, HttpMetadataSource, MetadataSource, MetadataTarget,
};

use dnsresolver::DnsResolver;
use hostsys::FileSystem;
use log::{debug, info};
use serde::{Deserialize, Deserializer, Serialize};
use snafu::{ensure, OptionExt, ResultExt};
use std::sync::Arc;
use std::time::Duration;
use url::{Host, Url};

/// Where providers without a working metadata service leave user data.
pub const USER_DATA_PATH: &str = "/var/vcap/bosh/user_data.json";

/// Provider metadata as the infrastructure code consumes it.
pub trait MetadataService: Send + Sync {
    /// The OpenSSH public key exactly as served, trailing newline included.
    fn get_public_key(&self) -> Result<String>;

    fn get_instance_id(&self) -> Result<String>;

    /// The server name from user data; the registry knows the VM by this name.
    fn get_server_name(&self) -> Result<String>;

    /// The registry endpoint from user data, with its host resolved if nameservers were given.
    fn get_registry_endpoint(&self) -> Result<String>;
}

/// User data as published by the provider.  Missing sections are empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserData {
    #[serde(rename = "Registry", default, deserialize_with = "null_as_default")]
    pub registry: RegistryData,
    #[serde(rename = "Server", default, deserialize_with = "null_as_default")]
    pub server: ServerData,
    #[serde(rename = "DNS", default, deserialize_with = "null_as_default")]
    pub dns: DnsData,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegistryData {
    #[serde(rename = "Endpoint", default, deserialize_with = "null_as_default")]
    pub endpoint: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerData {
    #[serde(rename = "Name", default, deserialize_with = "null_as_default")]
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DnsData {
    #[serde(rename = "Nameserver", default, deserialize_with = "null_as_default")]
    pub nameserver: Vec<String>,
}

// Providers write `null` for sections and lists they didn't fill in.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `MetadataService` over any `MetadataSource`, resolving registry hosts with a `DnsResolver`.
pub struct ConcreteMetadataService {
    source: Box<dyn MetadataSource>,
    resolver: Arc<dyn DnsResolver>,
}

impl ConcreteMetadataService {
    /// Creates a service that asks the metadata service at `metadata_host` first, then falls
    /// back to `USER_DATA_PATH`.
    pub fn new<S: AsRef<str>>(
        metadata_host: S,
        fs: Arc<dyn FileSystem>,
        resolver: Arc<dyn DnsResolver>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = HttpMetadataSource::new(metadata_host, timeout)?;
        let file = FileMetadataSource::new(fs, USER_DATA_PATH);
        Ok(Self::with_source(
            Box::new(FallbackSource::new(http, file)),
            resolver,
        ))
    }

    pub fn with_source(source: Box<dyn MetadataSource>, resolver: Arc<dyn DnsResolver>) -> Self {
        Self { source, resolver }
    }

    /// Fetches and parses user data.
    pub fn get_user_data(&self) -> Result<UserData> {
        let bytes = self.fetch(MetadataTarget::UserData)?;
        serde_json::from_slice(&bytes).context(error::UserDataParseSnafu)
    }

    fn fetch(&self, target: MetadataTarget) -> Result<Vec<u8>> {
        self.source
            .fetch(target)?
            .context(error::MetadataUnavailableSnafu { target })
    }

    fn fetch_string(&self, target: MetadataTarget) -> Result<String> {
        let bytes = self.fetch(target)?;
        String::from_utf8(bytes).context(error::NonUtf8Snafu { target })
    }
}

impl MetadataService for ConcreteMetadataService {
    fn get_public_key(&self) -> Result<String> {
        self.fetch_string(MetadataTarget::PublicKey)
    }

    fn get_instance_id(&self) -> Result<String> {
        self.fetch_string(MetadataTarget::InstanceId)
    }

    fn get_server_name(&self) -> Result<String> {
        let name = self.get_user_data()?.server.name;
        ensure!(!name.is_empty(), error::EmptyServerNameSnafu);
        Ok(name)
    }

    fn get_registry_endpoint(&self) -> Result<String> {
        let user_data = self.get_user_data()?;
        let endpoint = user_data.registry.endpoint;
        let nameservers = user_data.dns.nameserver;
        if nameservers.is_empty() {
            debug!("No nameservers in user data, using registry endpoint as given");
            return Ok(endpoint);
        }

        let url = Url::parse(&endpoint).context(error::InvalidEndpointSnafu {
            endpoint: &endpoint,
        })?;
        let host = match url.host() {
            Some(Host::Domain(host)) => host.to_string(),
            _ => {
                debug!("Registry endpoint '{}' needs no resolution", endpoint);
                return Ok(endpoint);
            }
        };

        let ip = self
            .resolver
            .lookup_host(&nameservers, &host)
            .context(error::ResolveEndpointSnafu { host: &host })?;
        let resolved = endpoint::replace_host(&endpoint, ip).context(error::EndpointHostSnafu {
            endpoint: &endpoint,
        })?;
        info!("Using registry endpoint '{}'", resolved);
        Ok(resolved)
    }
}

mod error {
    use crate::source::MetadataTarget;
    use hostsys::ErrorKind;
    use reqwest::StatusCode;
    use snafu::Snafu;
    use std::path::PathBuf;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(crate)))]
    pub enum Error {
        #[snafu(display("Registry endpoint '{}' has no host to replace", endpoint))]
        EndpointHost { endpoint: String },

        #[snafu(display("Server name in user data is empty"))]
        EmptyServerName,

        #[snafu(display("Failed to build HTTP client: {}", source))]
        HttpClient { source: reqwest::Error },

        #[snafu(display("Invalid registry endpoint '{}': {}", endpoint, source))]
        InvalidEndpoint {
            endpoint: String,
            source: url::ParseError,
        },

        #[snafu(display("Failed to read local metadata '{}': {}", path.display(), source))]
        LocalFile {
            path: PathBuf,
            source: hostsys::Error,
        },

        #[snafu(display("No {} available from any metadata source", target))]
        MetadataUnavailable { target: MetadataTarget },

        #[snafu(display("Metadata {} is not UTF-8: {}", target, source))]
        NonUtf8 {
            target: MetadataTarget,
            source: std::string::FromUtf8Error,
        },

        #[snafu(display("Failed to resolve registry host '{}': {}", host, source))]
        ResolveEndpoint {
            host: String,
            source: dnsresolver::Error,
        },

        #[snafu(display("Unable to read response body from '{}' (code {}): {}", uri, code, source))]
        ResponseBody {
            uri: String,
            code: StatusCode,
            source: reqwest::Error,
        },

        #[snafu(display("Error {} when requesting '{}': {}", code, uri, response_body))]
        ResponseStatus {
            uri: String,
            code: StatusCode,
            response_body: String,
        },

        #[snafu(display("Error requesting '{}': {}", uri, source))]
        Transport { uri: String, source: reqwest::Error },

        #[snafu(display("Failed to parse user data: {}", source))]
        UserDataParse { source: serde_json::Error },
    }

    impl Error {
        pub fn kind(&self) -> ErrorKind {
            match self {
                Error::Transport { .. } | Error::ResponseBody { .. } => {
                    ErrorKind::TransportUnavailable
                }
                Error::ResolveEndpoint { .. } => ErrorKind::TransportUnavailable,
                Error::MetadataUnavailable { .. } => ErrorKind::DataUnavailable,
                Error::LocalFile { source, .. } => source.kind(),
                Error::NonUtf8 { .. }
                | Error::UserDataParse { .. }
                | Error::InvalidEndpoint { .. }
                | Error::EndpointHost { .. } => ErrorKind::MalformedData,
                Error::EmptyServerName => ErrorKind::EmptyRequiredField,
                Error::HttpClient { .. } | Error::ResponseStatus { .. } => ErrorKind::Other,
            }
        }
    }
}

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
