//! Fetching agent settings from the registry.

use crate::{error, Result};
use agent_settings::Settings;
use log::{debug, info, trace};
use metadataclient::MetadataService;
use reqwest::blocking::Client;
use serde::Deserialize;
use snafu::{ensure, ResultExt};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Where the agent's settings come from.
pub trait Registry: Send + Sync {
    fn get_settings(&self) -> Result<Settings>;
}

/// The registry's response; the settings document is JSON encoded inside a JSON string.
#[derive(Debug, Deserialize)]
struct SettingsResponse {
    settings: String,
}

/// Registry reached over HTTP at the endpoint published in user data.  The VM is looked up by
/// its server name: `GET <endpoint>/instances/<server name>/settings`.
pub struct HttpRegistry {
    metadata: Arc<dyn MetadataService>,
    client: Client,
}

impl HttpRegistry {
    pub fn new(metadata: Arc<dyn MetadataService>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context(error::HttpClientSnafu)?;
        Ok(Self { metadata, client })
    }

    fn settings_url(&self) -> Result<Url> {
        let endpoint = self
            .metadata
            .get_registry_endpoint()
            .context(error::RegistryEndpointSnafu)?;
        let server_name = self
            .metadata
            .get_server_name()
            .context(error::ServerNameSnafu)?;

        let url = format!(
            "{}/instances/{}/settings",
            endpoint.trim_end_matches('/'),
            server_name
        );
        Url::parse(&url).context(error::UrlParseSnafu { url })
    }
}

impl Registry for HttpRegistry {
    fn get_settings(&self) -> Result<Settings> {
        let url = self.settings_url()?;
        debug!("Requesting settings from {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .context(error::HttpSendSnafu { url: url.as_str() })?;
        trace!("Registry response: {:?}", response);

        let code = response.status();
        let body = response
            .text()
            .context(error::HttpResponseSnafu { url: url.as_str() })?;
        ensure!(
            code.is_success(),
            error::HttpStatusSnafu {
                url: url.as_str(),
                code,
                response_body: body,
            }
        );

        let response: SettingsResponse = serde_json::from_str(&body)
            .context(error::RegistryResponseSnafu { url: url.as_str() })?;
        let settings: Settings =
            serde_json::from_str(&response.settings).context(error::SettingsParseSnafu)?;
        info!("Received settings for agent '{}'", settings.agent_id);
        Ok(settings)
    }
}
