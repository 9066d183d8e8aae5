use crate::render::{render_dhclient_conf, render_interfaces, render_resolv_conf, StaticInterface};
use crate::sysfs::interface_for_mac;
use crate::{arp, error, NetManager, Result};
use agent_settings::{DefaultKind, Networks};
use hostsys::{CmdRunner, FileSystem};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use snafu::ResultExt;
use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

const DHCLIENT_CONF_PATH: &str = "/etc/dhcp/dhclient.conf";
const DHCLIENT3_CONF_PATH: &str = "/etc/dhcp3/dhclient.conf";
const INTERFACES_PATH: &str = "/etc/network/interfaces";
const RESOLV_CONF_PATH: &str = "/etc/resolv.conf";
const DEFAULT_ARP_INTERVAL: Duration = Duration::from_millis(1500);

lazy_static! {
    static ref IFUP_VERSION: Regex = Regex::new(r"ifup version (\d+)\.(\d+)").unwrap();
}

/// Returns the major and minor version from `ifup --version` output.
pub fn parse_ifup_version(output: &str) -> Option<(u32, u32)> {
    let caps = IFUP_VERSION.captures(output)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// `NetManager` for Ubuntu, which uses ifupdown and ISC dhclient.
pub struct UbuntuNetManager {
    fs: Arc<dyn FileSystem>,
    runner: Arc<dyn CmdRunner>,
    arp_interval: Duration,
}

impl UbuntuNetManager {
    pub fn new(fs: Arc<dyn FileSystem>, runner: Arc<dyn CmdRunner>) -> Self {
        Self {
            fs,
            runner,
            arp_interval: DEFAULT_ARP_INTERVAL,
        }
    }

    /// Sets the delay between successive ARP announcements of an address.
    pub fn with_arp_interval(mut self, interval: Duration) -> Self {
        self.arp_interval = interval;
        self
    }

    fn dhclient_conf_path(&self) -> &'static str {
        // Older releases ship the dhcp3 client, which reads its own directory.
        if self.runner.command_exists("dhclient3") {
            DHCLIENT3_CONF_PATH
        } else {
            DHCLIENT_CONF_PATH
        }
    }

    fn has_dhcp_client(&self) -> bool {
        ["dhclient3", "dhclient"]
            .iter()
            .any(|cmd| self.runner.command_exists(cmd))
    }

    /// Restarts every interface except loopback, in the form the installed ifupdown expects.
    fn restart_networking(&self) -> Result<()> {
        let exclude_loopback = match self.runner.run_command("ifup", &["--version"]) {
            Ok(output) => match parse_ifup_version(&output.stdout) {
                Some((0, 6)) => "--exclude=lo",
                _ => "--no-loopback",
            },
            Err(e) => {
                warn!("Unable to determine ifup version, assuming a current one: {}", e);
                "--no-loopback"
            }
        };

        info!("Restarting networking");
        for cmd in ["ifdown", "ifup"] {
            self.runner
                .run_command(cmd, &["-a", exclude_loopback])
                .context(error::RestartNetworkingSnafu)?;
        }
        Ok(())
    }

    fn restart_interface(&self, interface: &str) -> Result<()> {
        info!("Restarting interface '{}'", interface);
        let selector = format!("INTERFACE={}", interface);
        for action in ["stop", "start"] {
            self.runner
                .run_command("service", &["network-interface", action, &selector])
                .context(error::RestartInterfaceSnafu { interface })?;
        }
        Ok(())
    }

    /// Resolves the interface and addressing of every manual network, in settings order.
    fn static_interfaces(&self, networks: &Networks) -> Result<Vec<StaticInterface>> {
        let gateway_network = networks
            .default_network_for(DefaultKind::Gateway)
            .map(|(name, _)| name);

        networks
            .manual()
            .map(|(name, network)| {
                let interface = interface_for_mac(self.fs.as_ref(), name, &network.mac)?;
                StaticInterface::new(interface, name, network, Some(name) == gateway_network)
            })
            .collect()
    }

    fn write_config(&self, path: &str, content: &str) -> Result<bool> {
        let path = Path::new(path);
        self.fs
            .converge_file_contents(path, content.as_bytes())
            .context(error::WriteConfigSnafu { path })
    }
}

impl NetManager for UbuntuNetManager {
    fn setup_dhcp(&self, networks: &Networks) -> Result<()> {
        let dns = networks
            .default_network_for(DefaultKind::Dns)
            .map(|(_, network)| network.dns.as_slice())
            .unwrap_or_default();
        let conf = render_dhclient_conf(dns);

        let path = self.dhclient_conf_path();
        if !self.write_config(path, &conf)? {
            debug!("'{}' unchanged, not restarting networking", path);
            return Ok(());
        }
        info!("Wrote '{}'", path);

        if self.has_dhcp_client() {
            self.restart_networking()?;
        } else {
            warn!("No DHCP client installed, not restarting networking");
        }
        Ok(())
    }

    fn setup_manual_networking(
        &self,
        networks: &Networks,
        completion: Option<Sender<()>>,
    ) -> Result<()> {
        // Every interface has to be found before anything on the host is touched.
        let interfaces = self.static_interfaces(networks)?;

        if self.write_config(INTERFACES_PATH, &render_interfaces(&interfaces))? {
            info!("Wrote '{}'", INTERFACES_PATH);
            for interface in &interfaces {
                self.restart_interface(&interface.name)?;
            }
        } else {
            debug!("'{}' unchanged, not restarting interfaces", INTERFACES_PATH);
        }

        // DNS can change without any addressing change.
        let dns = networks
            .default_network_for(DefaultKind::Dns)
            .map(|(_, network)| network.dns.as_slice())
            .unwrap_or_default();
        let resolv_conf = Path::new(RESOLV_CONF_PATH);
        self.fs
            .write_file_string(resolv_conf, &render_resolv_conf(dns))
            .context(error::WriteConfigSnafu { path: resolv_conf })?;

        let targets = interfaces
            .into_iter()
            .map(|interface| (interface.name, interface.address))
            .collect();
        arp::announce(
            Arc::clone(&self.runner),
            targets,
            self.arp_interval,
            completion,
        );
        Ok(())
    }
}
