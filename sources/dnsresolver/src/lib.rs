/*!
# Introduction

dnsresolver looks up a hostname against a list of nameservers given by the caller, ignoring the
host's own resolver configuration (`/etc/resolv.conf`, `/etc/hosts`).

This is needed when the registry's hostname is only resolvable through DNS servers handed out
by the infrastructure in user data, before the host's resolver has been configured.

Nameservers are tried in order and the first positive answer wins.  Running out of nameservers
without an answer is an error, never an empty result.
*/

#![deny(rust_2018_idioms)]

use hickory_resolver::config::{
    LookupIpStrategy, NameServerConfigGroup, ResolverConfig, ResolverOpts,
};
use hickory_resolver::Resolver;
use log::{debug, info, warn};
use snafu::{ensure, OptionExt, ResultExt};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

const DNS_PORT: u16 = 53;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves hostnames against explicitly provided nameservers.
pub trait DnsResolver: Send + Sync {
    /// Returns the first address `host` resolves to, asking `nameservers` in order.
    fn lookup_host(&self, nameservers: &[String], host: &str) -> Result<IpAddr>;
}

/// `DnsResolver` that sends its own queries over UDP to each nameserver in turn.
#[derive(Clone, Debug)]
pub struct NameserverResolver {
    timeout: Duration,
}

impl NameserverResolver {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a resolver that gives each nameserver `timeout` to answer.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn query(&self, nameserver: SocketAddr, host: &str) -> Result<IpAddr> {
        let group =
            NameServerConfigGroup::from_ips_clear(&[nameserver.ip()], nameserver.port(), true);
        let config = ResolverConfig::from_parts(None, vec![], group);

        let mut opts = ResolverOpts::default();
        opts.timeout = self.timeout;
        opts.attempts = 1;
        opts.cache_size = 0;
        opts.use_hosts_file = false;
        opts.ip_strategy = LookupIpStrategy::Ipv4Only;

        let resolver = Resolver::new(config, opts).context(error::ResolverCreateSnafu)?;
        let answer = resolver
            .lookup_ip(host)
            .context(error::QuerySnafu { host, nameserver })?;
        answer
            .iter()
            .next()
            .context(error::NoAnswerSnafu { host, nameserver })
    }
}

impl Default for NameserverResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsResolver for NameserverResolver {
    fn lookup_host(&self, nameservers: &[String], host: &str) -> Result<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            debug!("'{}' is already an IP address", host);
            return Ok(ip);
        }
        ensure!(!nameservers.is_empty(), error::NoNameserversSnafu { host });

        for nameserver in nameservers {
            let addr = match parse_nameserver(nameserver) {
                Ok(addr) => addr,
                Err(e) => {
                    warn!("Skipping nameserver: {}", e);
                    continue;
                }
            };
            match self.query(addr, host) {
                Ok(ip) => {
                    info!("Resolved '{}' to {} using {}", host, ip, addr);
                    return Ok(ip);
                }
                Err(e) => warn!("{}", e),
            }
        }

        error::ResolutionFailedSnafu {
            host,
            nameservers: nameservers.join(", "),
        }
        .fail()
    }
}

/// Parses `ip` or `ip:port` (`[ip]:port` for IPv6), defaulting to port 53.
pub fn parse_nameserver(nameserver: &str) -> Result<SocketAddr> {
    let nameserver = nameserver.trim();
    if let Ok(addr) = nameserver.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let ip = nameserver
        .parse::<IpAddr>()
        .context(error::InvalidNameserverSnafu { nameserver })?;
    Ok(SocketAddr::new(ip, DNS_PORT))
}

mod error {
    use snafu::Snafu;
    use std::net::SocketAddr;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(crate)))]
    pub enum Error {
        #[snafu(display("Invalid nameserver address '{}': {}", nameserver, source))]
        InvalidNameserver {
            nameserver: String,
            source: std::net::AddrParseError,
        },

        #[snafu(display("No nameservers given to resolve '{}'", host))]
        NoNameservers { host: String },

        #[snafu(display("Nameserver {} returned no addresses for '{}'", nameserver, host))]
        NoAnswer { host: String, nameserver: SocketAddr },

        #[snafu(display("Failed to resolve '{}' using {}: {}", host, nameserver, source))]
        Query {
            host: String,
            nameserver: SocketAddr,
            source: hickory_resolver::error::ResolveError,
        },

        #[snafu(display("Unable to resolve '{}' with nameservers [{}]", host, nameservers))]
        ResolutionFailed { host: String, nameservers: String },

        #[snafu(display("Failed to create DNS resolver: {}", source))]
        ResolverCreate { source: std::io::Error },
    }
}

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
