/*!
bootdog configures this VM the way its infrastructure provider describes it.  See the library
documentation for the configuration file.

Queries print JSON on stdout; logs go to stderr.
*/

use argh::FromArgs;
use bootdog::{
    new_infrastructure, CommonInfrastructure, Config, HttpRegistry, Infrastructure, LinuxPlatform,
    MappedDevicePathResolver, Platform,
};
use diskdog::{FileSystemType, Formatter, LinuxFormatter};
use dnsresolver::NameserverResolver;
use hostsys::{CmdRunner, ExecCmdRunner, FileSystem, OsFileSystem};
use log::{info, LevelFilter};
use metadataclient::{ConcreteMetadataService, MetadataService};
use netdog::UbuntuNetManager;
use serde::Serialize;
use simplelog::{ColorChoice, Config as LogConfig, TermLogger, TerminalMode};
use snafu::ResultExt;
use std::path::PathBuf;
use std::process;
use std::sync::{mpsc, Arc};

/// Configures this VM for its infrastructure provider
#[derive(FromArgs, PartialEq, Debug)]
struct Args {
    /// log-level trace|debug|info|warn|error
    #[argh(option, default = "LevelFilter::Info")]
    log_level: LevelFilter,

    /// path to the configuration file [default: /etc/bootdog.toml]
    #[argh(option, default = "PathBuf::from(bootdog::config::DEFAULT_CONFIG_PATH)")]
    config: PathBuf,

    #[argh(subcommand)]
    subcommand: Subcommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum Subcommand {
    SetupSsh(SetupSshArgs),
    GetSettings(GetSettingsArgs),
    SetupNetworking(SetupNetworkingArgs),
    SetupManualNetworking(SetupManualNetworkingArgs),
    EphemeralDiskPath(EphemeralDiskPathArgs),
    InstanceId(InstanceIdArgs),
    Format(FormatArgs),
    WriteFstab(WriteFstabArgs),
    ChangeDevicePath(ChangeDevicePathArgs),
    FstabDevicePath(FstabDevicePathArgs),
}

/// Installs the provider's SSH public key for a user
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "setup-ssh")]
struct SetupSshArgs {
    /// the user to authorize the key for
    #[argh(positional)]
    username: String,
}

/// Prints the agent settings from the registry
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "get-settings")]
struct GetSettingsArgs {}

/// Configures DHCP networking from the registry settings
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "setup-networking")]
struct SetupNetworkingArgs {}

/// Configures static networks from the registry settings and waits for the ARP announcements
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "setup-manual-networking")]
struct SetupManualNetworkingArgs {}

/// Prints the host device for an ephemeral disk hint
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "ephemeral-disk-path")]
struct EphemeralDiskPathArgs {
    /// the device the provider reported, may be empty
    #[argh(positional)]
    hint: String,
}

/// Prints the instance id from the metadata service
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "instance-id")]
struct InstanceIdArgs {}

/// Creates a filesystem on a device unless it already has one
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "format")]
struct FormatArgs {
    /// the device to format
    #[argh(positional)]
    path: String,

    /// swap|ext4
    #[argh(positional)]
    fs_type: FileSystemType,
}

/// Adds a device's filesystem to /etc/fstab
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "write-fstab")]
struct WriteFstabArgs {
    /// the formatted device
    #[argh(positional)]
    path: String,

    /// where to mount it
    #[argh(positional)]
    mount_point: String,
}

/// Points the persisted settings at the disk now mounted at a mount point
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "change-device-path")]
struct ChangeDevicePathArgs {
    /// the device path the settings refer to
    #[argh(positional)]
    device_path: String,

    /// where the replacement disk is mounted
    #[argh(positional)]
    mount_point: String,
}

/// Prints the disk mounted at the agent's data directory
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "fstab-device-path")]
struct FstabDevicePathArgs {}

#[derive(Serialize)]
struct DiskPath {
    path: String,
    found: bool,
}

/// The pieces the subcommands are built from, wired for this host.
struct Agent {
    infrastructure: Box<dyn Infrastructure>,
    metadata: Arc<dyn MetadataService>,
    platform: Arc<dyn Platform>,
    formatter: LinuxFormatter,
}

impl Agent {
    fn new(config: &Config) -> Result<Self> {
        let fs: Arc<dyn FileSystem> = Arc::new(OsFileSystem);
        let runner: Arc<dyn CmdRunner> = Arc::new(ExecCmdRunner);

        let metadata: Arc<dyn MetadataService> = Arc::new(
            ConcreteMetadataService::new(
                &config.metadata_host,
                Arc::clone(&fs),
                Arc::new(NameserverResolver::new()),
                config.http_timeout(),
            )
            .context(error::MetadataClientSnafu)?,
        );
        let registry = HttpRegistry::new(Arc::clone(&metadata), config.http_timeout())
            .context(error::RegistryClientSnafu)?;
        let net_manager = UbuntuNetManager::new(Arc::clone(&fs), Arc::clone(&runner))
            .with_arp_interval(config.arp_interval());
        let device_path_resolver = Arc::new(MappedDevicePathResolver::new(Arc::clone(&fs)));
        let platform: Arc<dyn Platform> = Arc::new(LinuxPlatform::new(
            Arc::clone(&fs),
            Arc::clone(&runner),
            Arc::new(net_manager),
            device_path_resolver.clone(),
        ));
        let formatter = LinuxFormatter::new(runner, fs).with_settings_path(&config.settings_path);

        let common = CommonInfrastructure::new(
            Arc::clone(&metadata),
            Arc::new(registry),
            Arc::clone(&platform),
            device_path_resolver,
        );
        Ok(Self {
            infrastructure: new_infrastructure(config, common),
            metadata,
            platform,
            formatter,
        })
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context(error::OutputSnafu)?;
    println!("{}", output);
    Ok(())
}

fn run() -> Result<()> {
    let args: Args = argh::from_env();

    TermLogger::init(
        args.log_level,
        LogConfig::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .context(error::LoggerSnafu)?;

    let config = Config::from_file(&args.config).context(error::ConfigSnafu)?;
    info!("Running for provider '{}'", config.provider);
    let agent = Agent::new(&config)?;

    match args.subcommand {
        Subcommand::SetupSsh(ssh) => agent
            .infrastructure
            .setup_ssh(&ssh.username)
            .context(error::InfrastructureSnafu)?,
        Subcommand::GetSettings(_) => {
            let settings = agent
                .infrastructure
                .get_settings()
                .context(error::InfrastructureSnafu)?;
            print_json(&settings)?;
        }
        Subcommand::SetupNetworking(_) => {
            let settings = agent
                .infrastructure
                .get_settings()
                .context(error::InfrastructureSnafu)?;
            agent
                .infrastructure
                .setup_networking(&settings.networks)
                .context(error::InfrastructureSnafu)?;
        }
        Subcommand::SetupManualNetworking(_) => {
            let settings = agent
                .infrastructure
                .get_settings()
                .context(error::InfrastructureSnafu)?;
            let (tx, rx) = mpsc::channel();
            agent
                .platform
                .setup_manual_networking(&settings.networks, Some(tx))
                .context(error::InfrastructureSnafu)?;
            // Either a send or a dropped sender means the announcements are over.
            let _ = rx.recv();
            info!("ARP announcements finished");
        }
        Subcommand::EphemeralDiskPath(disk) => {
            let (path, found) = agent.infrastructure.get_ephemeral_disk_path(&disk.hint);
            print_json(&DiskPath { path, found })?;
        }
        Subcommand::InstanceId(_) => {
            let id = agent
                .metadata
                .get_instance_id()
                .context(error::InstanceIdSnafu)?;
            print_json(&id)?;
        }
        Subcommand::Format(format) => agent
            .formatter
            .format(&format.path, format.fs_type)
            .context(error::DiskSnafu { path: &format.path })?,
        Subcommand::WriteFstab(fstab) => agent
            .formatter
            .write_fstabs(&fstab.path, &fstab.mount_point)
            .context(error::DiskSnafu { path: &fstab.path })?,
        Subcommand::ChangeDevicePath(change) => agent
            .formatter
            .change_device_path(&change.device_path, &change.mount_point)
            .context(error::DiskSnafu {
                path: &change.device_path,
            })?,
        Subcommand::FstabDevicePath(_) => {
            let path = agent
                .formatter
                .get_fstab_device_path()
                .context(error::DiskSnafu {
                    path: diskdog::DATA_DIR,
                })?;
            print_json(&path)?;
        }
    }
    Ok(())
}

// Returning a Result from main makes it print a Debug representation of the error, but with Snafu
// we have nice Display representations of the error, so we wrap "main" (run) and print any error.
// https://github.com/shepmaster/snafu/issues/110
fn main() {
    if let Err(e) = run() {
        eprintln!("{}", e);
        process::exit(1);
    }
}

mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub(super) enum Error {
        #[snafu(display("{}", source))]
        Config { source: bootdog::Error },

        #[snafu(display("Failed on '{}': {}", path, source))]
        Disk {
            path: String,
            source: diskdog::Error,
        },

        #[snafu(display("{}", source))]
        Infrastructure { source: bootdog::Error },

        #[snafu(display("Failed to get instance id: {}", source))]
        InstanceId { source: metadataclient::Error },

        #[snafu(display("Logger setup error: {}", source))]
        Logger { source: log::SetLoggerError },

        #[snafu(display("Failed to create metadata client: {}", source))]
        MetadataClient { source: metadataclient::Error },

        #[snafu(display("Failed to write output: {}", source))]
        Output { source: serde_json::Error },

        #[snafu(display("Failed to create registry client: {}", source))]
        RegistryClient { source: bootdog::Error },
    }
}

type Result<T> = std::result::Result<T, error::Error>;

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Args, argh::EarlyExit> {
        Args::from_args(&["bootdog"], args)
    }

    #[test]
    fn defaults() {
        let args = parse(&["instance-id"]).unwrap();
        assert_eq!(args.log_level, LevelFilter::Info);
        assert_eq!(args.config, PathBuf::from("/etc/bootdog.toml"));
        assert_eq!(args.subcommand, Subcommand::InstanceId(InstanceIdArgs {}));
    }

    #[test]
    fn subcommands() {
        let args = parse(&["--log-level", "debug", "format", "/dev/xvdb2", "ext4"]).unwrap();
        assert_eq!(args.log_level, LevelFilter::Debug);
        assert_eq!(
            args.subcommand,
            Subcommand::Format(FormatArgs {
                path: "/dev/xvdb2".to_string(),
                fs_type: FileSystemType::Ext4,
            })
        );

        let args = parse(&["ephemeral-disk-path", ""]).unwrap();
        assert_eq!(
            args.subcommand,
            Subcommand::EphemeralDiskPath(EphemeralDiskPathArgs {
                hint: String::new()
            })
        );
    }

    #[test]
    fn device_path_subcommands() {
        let args = parse(&["change-device-path", "/dev/sdc", "/var/vcap/store"]).unwrap();
        assert_eq!(
            args.subcommand,
            Subcommand::ChangeDevicePath(ChangeDevicePathArgs {
                device_path: "/dev/sdc".to_string(),
                mount_point: "/var/vcap/store".to_string(),
            })
        );

        let args = parse(&["fstab-device-path"]).unwrap();
        assert_eq!(
            args.subcommand,
            Subcommand::FstabDevicePath(FstabDevicePathArgs {})
        );

        assert!(parse(&["change-device-path", "/dev/sdc"]).is_err());
    }

    #[test]
    fn unknown_filesystem_type() {
        assert!(parse(&["format", "/dev/xvdb2", "xfs"]).is_err());
    }
}
