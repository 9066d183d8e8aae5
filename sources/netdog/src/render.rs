//! Renderers for the files netdog manages.  Output depends only on the input, so comparing it
//! byte for byte with what is on disk tells whether anything changed.

use crate::{error, Result, GENERATED_HEADER};
use agent_settings::Network;
use ipnet::Ipv4Net;
use snafu::ResultExt;
use std::fmt::Write;
use std::net::Ipv4Addr;

const DHCLIENT_CONF_BODY: &str = r#"
option rfc3442-classless-static-routes code 121 = array of unsigned integer 8;

send host-name "<hostname>";

request subnet-mask, broadcast-address, time-offset, routers,
	domain-name, domain-name-servers, domain-search, host-name,
	netbios-name-servers, netbios-scope, interface-mtu,
	rfc3442-classless-static-routes, ntp-servers;
"#;

/// Static addressing for one interface, with the derived network and broadcast addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticInterface {
    pub name: String,
    pub address: Ipv4Addr,
    pub network: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub broadcast: Ipv4Addr,
    pub gateway: Option<Ipv4Addr>,
}

impl StaticInterface {
    /// Computes the addressing of interface `name` for the network `network_name`.  The gateway
    /// is only included when `with_gateway` is set.
    pub fn new<S: Into<String>>(
        name: S,
        network_name: &str,
        network: &Network,
        with_gateway: bool,
    ) -> Result<Self> {
        let address = parse_ipv4(network_name, "ip", &network.ip)?;
        let netmask = parse_ipv4(network_name, "netmask", &network.netmask)?;
        let prefix = ipnet::ipv4_mask_to_prefix(netmask).context(error::InvalidNetmaskSnafu {
            network: network_name,
            netmask: &network.netmask,
        })?;
        let net = Ipv4Net::new(address, prefix).context(error::InvalidNetmaskSnafu {
            network: network_name,
            netmask: &network.netmask,
        })?;
        let gateway = if with_gateway {
            Some(parse_ipv4(network_name, "gateway", &network.gateway)?)
        } else {
            None
        };

        Ok(Self {
            name: name.into(),
            address,
            network: net.network(),
            netmask,
            broadcast: net.broadcast(),
            gateway,
        })
    }
}

fn parse_ipv4(network: &str, field: &'static str, value: &str) -> Result<Ipv4Addr> {
    value.trim().parse().context(error::InvalidAddressSnafu {
        network,
        field,
        value,
    })
}

/// Renders `dhclient.conf`, prepending `dns_servers` to the servers the DHCP server offers.
/// Repeated servers are only listed once.
pub fn render_dhclient_conf(dns_servers: &[String]) -> String {
    let mut servers: Vec<&str> = Vec::with_capacity(dns_servers.len());
    for server in dns_servers {
        if !servers.contains(&server.as_str()) {
            servers.push(server);
        }
    }

    let mut conf = format!("{}\n{}", GENERATED_HEADER, DHCLIENT_CONF_BODY);
    if !servers.is_empty() {
        let _ = write!(conf, "\nprepend domain-name-servers {};\n", servers.join(", "));
    }
    conf
}

/// Renders `/etc/network/interfaces` with the loopback interface followed by `interfaces`.
pub fn render_interfaces(interfaces: &[StaticInterface]) -> String {
    let mut conf = format!("{}\nauto lo\niface lo inet loopback\n", GENERATED_HEADER);
    for iface in interfaces {
        let _ = write!(
            conf,
            "\nauto {name}\niface {name} inet static\n    address {}\n    network {}\n    netmask {}\n    broadcast {}\n",
            iface.address,
            iface.network,
            iface.netmask,
            iface.broadcast,
            name = iface.name,
        );
        if let Some(gateway) = iface.gateway {
            let _ = write!(conf, "    gateway {}", gateway);
        }
    }
    conf
}

/// Renders `/etc/resolv.conf` listing `dns_servers` in order.
pub fn render_resolv_conf(dns_servers: &[String]) -> String {
    let mut conf = format!("{}\n", GENERATED_HEADER);
    for server in dns_servers {
        let _ = writeln!(conf, "nameserver {}", server);
    }
    conf
}

#[cfg(test)]
mod test {
    use super::*;

    const EXPECTED_DHCLIENT_CONF: &str = r#"# Generated by bootdog

option rfc3442-classless-static-routes code 121 = array of unsigned integer 8;

send host-name "<hostname>";

request subnet-mask, broadcast-address, time-offset, routers,
	domain-name, domain-name-servers, domain-search, host-name,
	netbios-name-servers, netbios-scope, interface-mtu,
	rfc3442-classless-static-routes, ntp-servers;

prepend domain-name-servers xx.xx.xx.xx, yy.yy.yy.yy, zz.zz.zz.zz;
"#;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn bosh_network() -> Network {
        Network {
            ip: "192.168.195.6".to_string(),
            netmask: "255.255.255.0".to_string(),
            gateway: "192.168.195.1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn dhclient_conf() {
        let dns = strings(&["xx.xx.xx.xx", "yy.yy.yy.yy", "zz.zz.zz.zz"]);
        assert_eq!(render_dhclient_conf(&dns), EXPECTED_DHCLIENT_CONF);
    }

    #[test]
    fn dhclient_conf_deduplicates() {
        let dns = strings(&["xx.xx.xx.xx", "yy.yy.yy.yy", "xx.xx.xx.xx", "zz.zz.zz.zz"]);
        assert_eq!(render_dhclient_conf(&dns), EXPECTED_DHCLIENT_CONF);
    }

    #[test]
    fn dhclient_conf_without_dns() {
        let conf = render_dhclient_conf(&[]);
        assert!(!conf.contains("prepend"));
        assert!(conf.ends_with("ntp-servers;\n"));
    }

    #[test]
    fn derives_network_and_broadcast() {
        let iface = StaticInterface::new("eth0", "bosh", &bosh_network(), true).unwrap();
        assert_eq!(iface.network, Ipv4Addr::new(192, 168, 195, 0));
        assert_eq!(iface.broadcast, Ipv4Addr::new(192, 168, 195, 255));
        assert_eq!(iface.gateway, Some(Ipv4Addr::new(192, 168, 195, 1)));

        let mut network = bosh_network();
        network.ip = "10.10.5.130".to_string();
        network.netmask = "255.255.255.192".to_string();
        let iface = StaticInterface::new("eth1", "other", &network, false).unwrap();
        assert_eq!(iface.network, Ipv4Addr::new(10, 10, 5, 128));
        assert_eq!(iface.broadcast, Ipv4Addr::new(10, 10, 5, 191));
        assert_eq!(iface.gateway, None);
    }

    #[test]
    fn rejects_bad_addressing() {
        let mut network = bosh_network();
        network.netmask = "255.0.255.0".to_string();
        let err = StaticInterface::new("eth0", "bosh", &network, true).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidNetmask { .. }));

        let mut network = bosh_network();
        network.ip = "192.168.195".to_string();
        let err = StaticInterface::new("eth0", "bosh", &network, true).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidAddress { field: "ip", .. }));

        // The gateway only matters where it is rendered.
        let mut network = bosh_network();
        network.gateway = String::new();
        assert!(StaticInterface::new("eth0", "bosh", &network, false).is_ok());
        assert!(StaticInterface::new("eth0", "bosh", &network, true).is_err());
    }

    #[test]
    fn interfaces_with_gateway() {
        let iface = StaticInterface::new("eth0", "bosh", &bosh_network(), true).unwrap();
        assert_eq!(
            render_interfaces(&[iface]),
            "# Generated by bootdog
auto lo
iface lo inet loopback

auto eth0
iface eth0 inet static
    address 192.168.195.6
    network 192.168.195.0
    netmask 255.255.255.0
    broadcast 192.168.195.255
    gateway 192.168.195.1"
        );
    }

    #[test]
    fn interfaces_loopback_only() {
        assert_eq!(
            render_interfaces(&[]),
            "# Generated by bootdog\nauto lo\niface lo inet loopback\n"
        );
    }

    #[test]
    fn interfaces_render_in_order() {
        let first = StaticInterface::new("eth1", "a", &bosh_network(), false).unwrap();
        let second = StaticInterface::new("eth0", "b", &bosh_network(), false).unwrap();
        let conf = render_interfaces(&[first.clone(), second.clone()]);
        assert!(conf.find("auto eth1").unwrap() < conf.find("auto eth0").unwrap());
        assert!(!conf.contains("gateway"));
        assert_eq!(conf, render_interfaces(&[first, second]));
    }

    #[test]
    fn resolv_conf() {
        assert_eq!(
            render_resolv_conf(&strings(&["10.80.130.1", "10.80.130.2"])),
            "# Generated by bootdog\nnameserver 10.80.130.1\nnameserver 10.80.130.2\n"
        );
        assert_eq!(render_resolv_conf(&[]), "# Generated by bootdog\n");
    }
}
