//! Test doubles for bootdog's collaborators.

use crate::devicepath::DevicePathResolver;
use crate::platform::Platform;
use crate::registry::Registry;
use agent_settings::{Networks, Settings};
use dnsresolver::NameserverResolver;
use metadataclient::{ConcreteMetadataService, MetadataService, MetadataSource, MetadataTarget};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

/// Metadata source that has nothing, for producing real "unavailable" errors.
struct NoMetadata;

impl MetadataSource for NoMetadata {
    fn fetch(&self, _target: MetadataTarget) -> metadataclient::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

fn no_metadata() -> ConcreteMetadataService {
    ConcreteMetadataService::with_source(Box::new(NoMetadata), Arc::new(NameserverResolver::new()))
}

/// Answers with the configured values; `None` fails the way an unavailable metadata service
/// does.
#[derive(Default)]
pub(crate) struct MockMetadata {
    pub(crate) public_key: Option<String>,
    pub(crate) instance_id: Option<String>,
    pub(crate) server_name: Option<String>,
    pub(crate) registry_endpoint: Option<String>,
}

impl MetadataService for MockMetadata {
    fn get_public_key(&self) -> metadataclient::Result<String> {
        match &self.public_key {
            Some(key) => Ok(key.clone()),
            None => no_metadata().get_public_key(),
        }
    }

    fn get_instance_id(&self) -> metadataclient::Result<String> {
        match &self.instance_id {
            Some(id) => Ok(id.clone()),
            None => no_metadata().get_instance_id(),
        }
    }

    fn get_server_name(&self) -> metadataclient::Result<String> {
        match &self.server_name {
            Some(name) => Ok(name.clone()),
            None => no_metadata().get_server_name(),
        }
    }

    fn get_registry_endpoint(&self) -> metadataclient::Result<String> {
        match &self.registry_endpoint {
            Some(endpoint) => Ok(endpoint.clone()),
            None => no_metadata().get_registry_endpoint(),
        }
    }
}

/// Registry returning fixed settings, or failing with a registry status error.
pub(crate) struct MockRegistry {
    pub(crate) settings: Option<Settings>,
}

impl Registry for MockRegistry {
    fn get_settings(&self) -> crate::Result<Settings> {
        match &self.settings {
            Some(settings) => Ok(settings.clone()),
            None => crate::error::HttpStatusSnafu {
                url: "http://registry:25777/instances/vm/settings",
                code: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                response_body: "",
            }
            .fail(),
        }
    }
}

/// Everything `MockPlatform` was asked to do.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct PlatformCalls {
    pub(crate) ssh: Vec<(String, String)>,
    pub(crate) dhcp: Vec<Networks>,
    pub(crate) manual: Vec<Networks>,
    pub(crate) normalize: Vec<String>,
}

/// Platform that records its calls and normalizes every hint to `normalized`.
#[derive(Default)]
pub(crate) struct MockPlatform {
    pub(crate) calls: Mutex<PlatformCalls>,
    pub(crate) normalized: (String, bool),
}

impl MockPlatform {
    pub(crate) fn calls(&self) -> PlatformCalls {
        self.calls.lock().unwrap().clone()
    }
}

impl Platform for MockPlatform {
    fn setup_ssh(&self, public_key: &str, username: &str) -> crate::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .ssh
            .push((public_key.to_string(), username.to_string()));
        Ok(())
    }

    fn setup_dhcp(&self, networks: &Networks) -> crate::Result<()> {
        self.calls.lock().unwrap().dhcp.push(networks.clone());
        Ok(())
    }

    fn setup_manual_networking(
        &self,
        networks: &Networks,
        completion: Option<Sender<()>>,
    ) -> crate::Result<()> {
        self.calls.lock().unwrap().manual.push(networks.clone());
        if let Some(completion) = completion {
            completion.send(()).unwrap();
        }
        Ok(())
    }

    fn normalize_disk_path(&self, hint: &str) -> (String, bool) {
        self.calls.lock().unwrap().normalize.push(hint.to_string());
        self.normalized.clone()
    }
}

/// Resolver that finds nothing.
pub(crate) struct NoDevices;

impl DevicePathResolver for NoDevices {
    fn get_real_device_path(&self, _hint: &str) -> (String, bool) {
        (String::new(), false)
    }
}
