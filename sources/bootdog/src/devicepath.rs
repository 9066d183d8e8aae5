//! Mapping the device names a provider reports to the ones the host kernel uses.

use hostsys::FileSystem;
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;

/// Finds the device on the host that a provider's device hint refers to.
pub trait DevicePathResolver: Send + Sync {
    /// Returns the real device path for `hint`, and whether such a device was found.
    fn get_real_device_path(&self, hint: &str) -> (String, bool);
}

/// Resolves hints like `/dev/sdb` that Xen and virtio guests see as `/dev/xvdb` or `/dev/vdb`.
pub struct MappedDevicePathResolver {
    fs: Arc<dyn FileSystem>,
}

impl MappedDevicePathResolver {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

/// The paths a hint could name on the host, most likely first.
fn candidates(hint: &str) -> Vec<String> {
    let mut paths = vec![hint.to_string()];
    if let Some(suffix) = hint.strip_prefix("/dev/sd") {
        paths.push(format!("/dev/xvd{}", suffix));
        paths.push(format!("/dev/vd{}", suffix));
    }
    paths
}

impl DevicePathResolver for MappedDevicePathResolver {
    fn get_real_device_path(&self, hint: &str) -> (String, bool) {
        for path in candidates(hint) {
            if self.fs.file_exists(Path::new(&path)) {
                info!("Device hint '{}' is '{}'", hint, path);
                return (path, true);
            }
            debug!("No device at '{}'", path);
        }
        (String::new(), false)
    }
}
