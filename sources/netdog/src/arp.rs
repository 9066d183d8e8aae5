//! Background gratuitous ARP announcements for static addresses.

use hostsys::CmdRunner;
use log::{debug, warn};
use std::net::Ipv4Addr;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Announcements sent per address.
pub(crate) const ARP_ANNOUNCEMENTS: usize = 6;

/// Starts one thread per `(interface, address)` pair, each sending `ARP_ANNOUNCEMENTS`
/// gratuitous ARPs `interval` apart, and returns immediately.  `completion` receives a single
/// `()` once all of them are done.
pub(crate) fn announce(
    runner: Arc<dyn CmdRunner>,
    targets: Vec<(String, Ipv4Addr)>,
    interval: Duration,
    completion: Option<Sender<()>>,
) {
    let probes: Vec<_> = targets
        .into_iter()
        .map(|(interface, address)| {
            let runner = Arc::clone(&runner);
            thread::spawn(move || announce_address(runner.as_ref(), &interface, address, interval))
        })
        .collect();

    thread::spawn(move || {
        for probe in probes {
            if probe.join().is_err() {
                warn!("ARP announcement thread panicked");
            }
        }
        debug!("ARP announcements finished");
        if let Some(completion) = completion {
            // Nobody listening is fine.
            let _ = completion.send(());
        }
    });
}

fn announce_address(
    runner: &dyn CmdRunner,
    interface: &str,
    address: Ipv4Addr,
    interval: Duration,
) {
    let address = address.to_string();
    let args = ["-c", "1", "-U", "-I", interface, address.as_str()];
    for i in 0..ARP_ANNOUNCEMENTS {
        if let Err(e) = runner.run_command("arping", &args) {
            warn!(
                "ARP announcement of {} on '{}' failed: {}",
                address, interface, e
            );
        }
        if i + 1 < ARP_ANNOUNCEMENTS {
            thread::sleep(interval);
        }
    }
}
