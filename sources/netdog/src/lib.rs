/*!
# Introduction

netdog makes a host's network configuration match the networks in the agent's settings, while
disturbing running interfaces as little as possible.

For DHCP networks it writes `dhclient.conf` so the default DNS servers are prepended to whatever
the DHCP server hands out, and only restarts networking when the file actually changed.

For statically addressed ("manual") networks it:
* finds the interface for each network by MAC address, by crawling `/sys/class/net`
* writes `/etc/network/interfaces`, restarting only the affected interfaces when it changed
* rewrites `/etc/resolv.conf` from the default DNS network
* announces each static address with gratuitous ARP (`arping -U`) in the background, so that
  neighbors drop stale cache entries for the address

The ARP probes never fail the setup.  Callers that care can pass a channel sender, which gets a
single `()` once every probe has finished.
*/

#![deny(rust_2018_idioms)]

mod arp;
mod render;
mod sysfs;
mod ubuntu;

pub use render::{render_dhclient_conf, render_interfaces, render_resolv_conf, StaticInterface};
pub use sysfs::SYS_CLASS_NET;
pub use ubuntu::{parse_ifup_version, UbuntuNetManager};

use agent_settings::Networks;
use std::sync::mpsc::Sender;

/// Header written at the top of every generated file.
pub const GENERATED_HEADER: &str = "# Generated by bootdog";

/// Brings host networking in line with a set of networks.
pub trait NetManager: Send + Sync {
    /// Configures the DHCP client for dynamic networks.
    fn setup_dhcp(&self, networks: &Networks) -> Result<()>;

    /// Configures statically addressed networks and starts ARP announcements for them.
    /// `completion`, if given, receives one `()` after the last announcement.  If the call
    /// fails before announcing, `completion` is dropped without a send.
    fn setup_manual_networking(
        &self,
        networks: &Networks,
        completion: Option<Sender<()>>,
    ) -> Result<()>;
}

mod error {
    use hostsys::ErrorKind;
    use snafu::Snafu;
    use std::path::PathBuf;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(crate)))]
    pub enum Error {
        #[snafu(display("Invalid {} '{}' for network '{}': {}", field, value, network, source))]
        InvalidAddress {
            network: String,
            field: &'static str,
            value: String,
            source: std::net::AddrParseError,
        },

        #[snafu(display("Invalid netmask '{}' for network '{}': {}", netmask, network, source))]
        InvalidNetmask {
            network: String,
            netmask: String,
            source: ipnet::PrefixLenError,
        },

        #[snafu(display("Failed to list network interfaces: {}", source))]
        ListInterfaces { source: hostsys::Error },

        #[snafu(display(
            "MAC address '{}' of network '{}' matches several interfaces: {}",
            mac,
            network,
            interfaces
        ))]
        MultipleInterfacesForMac {
            network: String,
            mac: String,
            interfaces: String,
        },

        #[snafu(display("No interface has MAC address '{}' of network '{}'", mac, network))]
        NoInterfaceForMac { network: String, mac: String },

        #[snafu(display("Failed to restart interface '{}': {}", interface, source))]
        RestartInterface {
            interface: String,
            source: hostsys::Error,
        },

        #[snafu(display("Failed to restart networking: {}", source))]
        RestartNetworking { source: hostsys::Error },

        #[snafu(display("Failed to write '{}': {}", path.display(), source))]
        WriteConfig {
            path: PathBuf,
            source: hostsys::Error,
        },
    }

    impl Error {
        pub fn kind(&self) -> ErrorKind {
            match self {
                Error::InvalidAddress { .. } | Error::InvalidNetmask { .. } => {
                    ErrorKind::MalformedData
                }
                Error::NoInterfaceForMac { .. } | Error::MultipleInterfacesForMac { .. } => {
                    ErrorKind::AmbiguousOrMissingTarget
                }
                Error::RestartInterface { .. } | Error::RestartNetworking { .. } => {
                    ErrorKind::ToolExecutionFailed
                }
                Error::ListInterfaces { source } | Error::WriteConfig { source, .. } => {
                    source.kind()
                }
            }
        }
    }
}

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
