//! Places the agent can read provider metadata from.
//!
//! A source answers `Ok(None)` when it is reachable but doesn't have the requested item, and
//! an error with kind `TransportUnavailable` when it can't be reached at all; `FallbackSource`
//! moves on to its secondary source in both cases.

use crate::{error, Result};
use hostsys::{ErrorKind, FileSystem};
use log::{debug, info, trace, warn};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use snafu::{ensure, ResultExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// The items of provider metadata the agent knows how to ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataTarget {
    PublicKey,
    InstanceId,
    UserData,
}

impl MetadataTarget {
    fn http_path(&self) -> &'static str {
        match self {
            MetadataTarget::PublicKey => "latest/meta-data/public-keys/0/openssh-key",
            MetadataTarget::InstanceId => "latest/meta-data/instance-id",
            MetadataTarget::UserData => "latest/user-data",
        }
    }
}

impl fmt::Display for MetadataTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetadataTarget::PublicKey => "public key",
            MetadataTarget::InstanceId => "instance id",
            MetadataTarget::UserData => "user data",
        };
        write!(f, "{}", name)
    }
}

/// Something that can be asked for an item of metadata.
pub trait MetadataSource: Send + Sync {
    /// Returns the raw bytes of `target`, or `None` if this source doesn't have it.
    fn fetch(&self, target: MetadataTarget) -> Result<Option<Vec<u8>>>;
}

/// Reads metadata from the provider's HTTP metadata service.
pub struct HttpMetadataSource {
    client: Client,
    base_uri: String,
}

impl HttpMetadataSource {
    /// `base_uri` is the scheme and authority of the metadata service, e.g.
    /// `http://169.254.169.254`.
    pub fn new<S: AsRef<str>>(base_uri: S, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context(error::HttpClientSnafu)?;
        Ok(Self {
            client,
            base_uri: base_uri.as_ref().trim_end_matches('/').to_string(),
        })
    }
}

impl MetadataSource for HttpMetadataSource {
    fn fetch(&self, target: MetadataTarget) -> Result<Option<Vec<u8>>> {
        let uri = format!("{}/{}", self.base_uri, target.http_path());
        debug!("Requesting {}", uri);
        let response = self
            .client
            .get(&uri)
            .send()
            .context(error::TransportSnafu { uri: &uri })?;
        trace!("Metadata response: {:?}", response);

        let code = response.status();
        // The service answers 404 for items the provider didn't fill in.
        if code == StatusCode::NOT_FOUND {
            info!("Metadata service has no {}", target);
            return Ok(None);
        }

        let body = response
            .bytes()
            .context(error::ResponseBodySnafu { uri: &uri, code })?
            .to_vec();
        ensure!(
            code.is_success(),
            error::ResponseStatusSnafu {
                uri,
                code,
                response_body: printable_string(&body),
            }
        );
        info!("Received {} from metadata service", target);
        Ok(Some(body))
    }
}

/// Reads metadata from a JSON file left on the host by the provider.  The file stands in for
/// both the public key and the user data; it never has an instance id.
pub struct FileMetadataSource {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl FileMetadataSource {
    pub fn new<P: Into<PathBuf>>(fs: Arc<dyn FileSystem>, path: P) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetadataSource for FileMetadataSource {
    fn fetch(&self, target: MetadataTarget) -> Result<Option<Vec<u8>>> {
        if target == MetadataTarget::InstanceId {
            debug!("'{}' doesn't carry an instance id", self.path.display());
            return Ok(None);
        }

        let bytes = match self.fs.read_file(&self.path) {
            Err(e) if e.is_not_found() => {
                info!("No local metadata file at '{}'", self.path.display());
                return Ok(None);
            }
            result => result.context(error::LocalFileSnafu { path: &self.path })?,
        };
        info!("Read {} from '{}'", target, self.path.display());
        Ok(Some(bytes))
    }
}

/// Tries `primary` first and asks `secondary` when the primary is unreachable or doesn't have
/// the item.  Any other failure of the primary is returned as is.
pub struct FallbackSource<P, S> {
    primary: P,
    secondary: S,
}

impl<P, S> FallbackSource<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P, S> MetadataSource for FallbackSource<P, S>
where
    P: MetadataSource,
    S: MetadataSource,
{
    fn fetch(&self, target: MetadataTarget) -> Result<Option<Vec<u8>>> {
        match self.primary.fetch(target) {
            Ok(Some(bytes)) => return Ok(Some(bytes)),
            Ok(None) => debug!("Primary source has no {}, trying fallback", target),
            Err(e) if e.kind() == ErrorKind::TransportUnavailable => {
                warn!("{}; trying fallback source for {}", e, target)
            }
            Err(e) => return Err(e),
        }
        self.secondary.fetch(target)
    }
}

/// Converts `bytes` to a `String` for error messages, truncating long bodies.
fn printable_string(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if s.len() < 2048 => s.to_string(),
        Ok(s) => {
            let mut end = 2034;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}<truncated...>", &s[..end])
        }
        Err(_) => "<binary>".to_string(),
    }
}
