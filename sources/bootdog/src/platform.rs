//! The host operations infrastructure code relies on.

use crate::devicepath::DevicePathResolver;
use crate::{error, Result};
use agent_settings::Networks;
use hostsys::{CmdRunner, FileSystem};
use log::info;
use netdog::NetManager;
use snafu::{ensure, ResultExt};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// OS-level operations on the host, as infrastructure code needs them.
pub trait Platform: Send + Sync {
    /// Authorizes `public_key` for SSH logins as `username`.
    fn setup_ssh(&self, public_key: &str, username: &str) -> Result<()>;

    fn setup_dhcp(&self, networks: &Networks) -> Result<()>;

    /// See `netdog::NetManager::setup_manual_networking` for how `completion` is used.
    fn setup_manual_networking(
        &self,
        networks: &Networks,
        completion: Option<Sender<()>>,
    ) -> Result<()>;

    /// Returns the host's device for the provider's device hint, and whether one was found.
    fn normalize_disk_path(&self, hint: &str) -> (String, bool);
}

/// `Platform` for Linux hosts.
pub struct LinuxPlatform {
    fs: Arc<dyn FileSystem>,
    runner: Arc<dyn CmdRunner>,
    net_manager: Arc<dyn NetManager>,
    device_path_resolver: Arc<dyn DevicePathResolver>,
}

impl LinuxPlatform {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        runner: Arc<dyn CmdRunner>,
        net_manager: Arc<dyn NetManager>,
        device_path_resolver: Arc<dyn DevicePathResolver>,
    ) -> Self {
        Self {
            fs,
            runner,
            net_manager,
            device_path_resolver,
        }
    }

    fn chmod(&self, mode: &str, path: &Path) -> Result<()> {
        self.runner
            .run_command("chmod", &[mode, &path.to_string_lossy()])
            .context(error::SshPermissionsSnafu { path })?;
        Ok(())
    }
}

fn home_dir(username: &str) -> PathBuf {
    if username == "root" {
        PathBuf::from("/root")
    } else {
        Path::new("/home").join(username)
    }
}

impl Platform for LinuxPlatform {
    fn setup_ssh(&self, public_key: &str, username: &str) -> Result<()> {
        ensure!(!username.is_empty(), error::EmptyUsernameSnafu);

        let ssh_dir = home_dir(username).join(".ssh");
        let authorized_keys = ssh_dir.join("authorized_keys");
        let content = format!("{}\n", public_key.trim_end());
        self.fs
            .write_file_string(&authorized_keys, &content)
            .context(error::WriteAuthorizedKeysSnafu {
                path: &authorized_keys,
            })?;

        self.chmod("700", &ssh_dir)?;
        self.chmod("600", &authorized_keys)?;
        let owner = format!("{}:{}", username, username);
        self.runner
            .run_command("chown", &["-R", &owner, &ssh_dir.to_string_lossy()])
            .context(error::SshPermissionsSnafu { path: &ssh_dir })?;

        info!("Installed SSH key for '{}'", username);
        Ok(())
    }

    fn setup_dhcp(&self, networks: &Networks) -> Result<()> {
        self.net_manager
            .setup_dhcp(networks)
            .context(error::NetworkSnafu)
    }

    fn setup_manual_networking(
        &self,
        networks: &Networks,
        completion: Option<Sender<()>>,
    ) -> Result<()> {
        self.net_manager
            .setup_manual_networking(networks, completion)
            .context(error::NetworkSnafu)
    }

    fn normalize_disk_path(&self, hint: &str) -> (String, bool) {
        self.device_path_resolver.get_real_device_path(hint)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::devicepath::MappedDevicePathResolver;
    use hostsys::fakes::{FakeCmdResult, FakeCmdRunner, FakeFileSystem};
    use netdog::UbuntuNetManager;
    use std::sync::mpsc;
    use std::time::Duration;

    const KEY: &str = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABAQCw test";

    struct Fixture {
        fs: Arc<FakeFileSystem>,
        runner: Arc<FakeCmdRunner>,
        platform: LinuxPlatform,
    }

    fn fixture() -> Fixture {
        let fs = Arc::new(FakeFileSystem::new());
        let runner = Arc::new(FakeCmdRunner::new());
        let net_manager = UbuntuNetManager::new(fs.clone(), runner.clone())
            .with_arp_interval(Duration::from_millis(1));
        let platform = LinuxPlatform::new(
            fs.clone(),
            runner.clone(),
            Arc::new(net_manager),
            Arc::new(MappedDevicePathResolver::new(fs.clone())),
        );
        Fixture {
            fs,
            runner,
            platform,
        }
    }

    fn commands(runner: &FakeCmdRunner) -> Vec<String> {
        runner
            .run_commands()
            .iter()
            .map(|command| command.join(" "))
            .collect()
    }

    #[test]
    fn installs_ssh_key() {
        let f = fixture();
        f.platform.setup_ssh(&format!("{}\n", KEY), "vcap").unwrap();

        assert_eq!(
            f.fs.contents("/home/vcap/.ssh/authorized_keys").unwrap(),
            format!("{}\n", KEY)
        );
        assert_eq!(
            commands(&f.runner),
            vec![
                "chmod 700 /home/vcap/.ssh",
                "chmod 600 /home/vcap/.ssh/authorized_keys",
                "chown -R vcap:vcap /home/vcap/.ssh",
            ]
        );
    }

    #[test]
    fn root_key_goes_to_root_home() {
        let f = fixture();
        f.platform.setup_ssh(KEY, "root").unwrap();
        assert!(f.fs.contents("/root/.ssh/authorized_keys").is_some());
    }

    #[test]
    fn ssh_errors() {
        let f = fixture();
        let err = f.platform.setup_ssh(KEY, "").unwrap_err();
        assert_eq!(err.kind(), hostsys::ErrorKind::EmptyRequiredField);

        f.runner.add_cmd_result(
            "chmod 700 /home/vcap/.ssh",
            FakeCmdResult {
                exit_status: 1,
                ..Default::default()
            },
        );
        let err = f.platform.setup_ssh(KEY, "vcap").unwrap_err();
        assert_eq!(err.kind(), hostsys::ErrorKind::ToolExecutionFailed);

        f.fs.fail_writes_to("/home/bob/.ssh/authorized_keys");
        let err = f.platform.setup_ssh(KEY, "bob").unwrap_err();
        assert!(matches!(err, crate::Error::WriteAuthorizedKeys { .. }));
    }

    #[test]
    fn delegates_networking() {
        let f = fixture();
        let networks = Networks::default();
        f.platform.setup_dhcp(&networks).unwrap();
        assert!(f.fs.contents("/etc/dhcp/dhclient.conf").is_some());

        let (tx, rx) = mpsc::channel();
        f.platform
            .setup_manual_networking(&networks, Some(tx))
            .unwrap();
        rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(f.fs.contents("/etc/network/interfaces").is_some());
    }

    #[test]
    fn network_errors_are_wrapped() {
        let f = fixture();
        f.fs.fail_writes_to("/etc/dhcp/dhclient.conf");
        let err = f.platform.setup_dhcp(&Networks::default()).unwrap_err();
        assert!(matches!(err, crate::Error::Network { .. }));
    }

    #[test]
    fn normalizes_disk_paths() {
        let f = fixture();
        f.fs.set_file("/dev/xvdb", "");
        assert_eq!(
            f.platform.normalize_disk_path("/dev/sdb"),
            ("/dev/xvdb".to_string(), true)
        );
        assert_eq!(
            f.platform.normalize_disk_path("/dev/sdz"),
            (String::new(), false)
        );
    }
}
