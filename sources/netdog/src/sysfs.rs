//! Interface lookup by MAC address.

use crate::{error, Result};
use hostsys::FileSystem;
use log::{debug, trace};
use snafu::{ensure, OptionExt, ResultExt};

pub const SYS_CLASS_NET: &str = "/sys/class/net";

/// Returns the name of the one interface whose MAC address is `mac`.  `network` is only used
/// for error messages.
pub(crate) fn interface_for_mac(fs: &dyn FileSystem, network: &str, mac: &str) -> Result<String> {
    let clean = |s: &str| s.trim().to_lowercase();
    let wanted = clean(mac);

    // There should be directories for each of the interfaces, i.e /sys/class/net/eth0
    let pattern = format!("{}/*", SYS_CLASS_NET);
    let mut matches = Vec::new();
    for interface in fs.glob(&pattern).context(error::ListInterfacesSnafu)? {
        let address = match fs.read_file_string(&interface.join("address")) {
            Ok(address) => address,
            Err(e) => {
                trace!("Skipping '{}': {}", interface.display(), e);
                continue;
            }
        };
        if clean(&address) != wanted {
            continue;
        }
        if let Some(name) = interface.file_name().and_then(|name| name.to_str()) {
            matches.push(name.to_string());
        }
    }

    ensure!(
        matches.len() < 2,
        error::MultipleInterfacesForMacSnafu {
            network,
            mac,
            interfaces: matches.join(", "),
        }
    );
    let name = matches
        .pop()
        .filter(|_| !wanted.is_empty())
        .context(error::NoInterfaceForMacSnafu { network, mac })?;
    debug!("Network '{}' is on interface '{}'", network, name);
    Ok(name)
}
