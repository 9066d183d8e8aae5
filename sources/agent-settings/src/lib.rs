/*!
# Introduction

agent-settings contains the data model the registry hands to the agent: which networks the VM
should have, which disks it was given, and who it is.

A `Settings` value is produced by the registry and consumed read-only by the infrastructure and
network code.  A new fetch replaces the whole value; nothing patches it in place.

`Networks` keeps the order the networks appear in the registry document so that every piece of
configuration rendered from it is deterministic.
*/

#![deny(rust_2018_idioms)]

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::ops::Deref;

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default, deserialize_with = "null_as_default")]
    pub agent_id: String,
    #[serde(default)]
    pub blobstore: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub disks: Disks,
    #[serde(default)]
    pub env: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub networks: Networks,
    // Passed through untouched; deployers may send null for either.
    #[serde(default)]
    pub ntp: Value,
    #[serde(default)]
    pub mbus: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vm: Vm,
}

/// Treats an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Vm {
    #[serde(default)]
    pub name: String,
}

/// Device hints for the disks attached to the VM.  These are what the infrastructure thinks
/// the devices are called; the OS may have named them differently.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Disks {
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub ephemeral: String,
    #[serde(default)]
    pub persistent: IndexMap<String, String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    #[default]
    Manual,
    Dynamic,
    Vip,
}

/// The defaults a network may supply for the whole host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefaultKind {
    Dns,
    Gateway,
}

impl DefaultKind {
    fn as_str(&self) -> &'static str {
        match self {
            DefaultKind::Dns => "dns",
            DefaultKind::Gateway => "gateway",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Network {
    #[serde(rename = "type", default)]
    pub network_type: NetworkType,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub netmask: String,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub dns: Vec<String>,
    #[serde(default)]
    pub default: Vec<String>,
    #[serde(default)]
    pub cloud_properties: Value,
}

impl Network {
    pub fn is_dynamic(&self) -> bool {
        self.network_type == NetworkType::Dynamic
    }

    /// Whether this network was marked as the source of `kind` for the host.
    pub fn is_default_for(&self, kind: DefaultKind) -> bool {
        self.default.iter().any(|d| d == kind.as_str())
    }
}

/// Networks by name, in the order the registry listed them.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Networks {
    inner: IndexMap<String, Network>,
}

impl Networks {
    /// Returns the first network marked as the default for `kind`.  Only one network should
    /// carry each default; if several do, the first one wins.
    pub fn default_network_for(&self, kind: DefaultKind) -> Option<(&str, &Network)> {
        self.inner
            .iter()
            .find(|(_, network)| network.is_default_for(kind))
            .map(|(name, network)| (name.as_str(), network))
    }

    /// Networks configured with static addresses, in order.
    pub fn manual(&self) -> impl Iterator<Item = (&str, &Network)> {
        self.inner
            .iter()
            .filter(|(_, network)| network.network_type == NetworkType::Manual)
            .map(|(name, network)| (name.as_str(), network))
    }
}

impl Deref for Networks {
    type Target = IndexMap<String, Network>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl FromIterator<(String, Network)> for Networks {
    fn from_iter<I: IntoIterator<Item = (String, Network)>>(iter: I) -> Self {
        Networks {
            inner: iter.into_iter().collect(),
        }
    }
}

impl<const N: usize> From<[(&str, Network); N]> for Networks {
    fn from(networks: [(&str, Network); N]) -> Self {
        networks
            .into_iter()
            .map(|(name, network)| (name.to_string(), network))
            .collect()
    }
}
