use crate::parse::{disk_from_partition, parse_blkid_type, parse_blkid_uuid, parse_mounted_device};
use crate::{error, FileSystemType, Formatter, Result};
use hostsys::{CmdRunner, FileSystem};
use log::{debug, info};
use serde_json::Value;
use snafu::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const FSTAB_PATH: &str = "/etc/fstab";
pub const MOUNTS_PATH: &str = "/proc/mounts";
pub const SETTINGS_PATH: &str = "/var/vcap/bosh/settings.json";
pub const DATA_DIR: &str = "/var/vcap/data";
// Present when the kernel can initialize ext4 inode tables lazily after mount.
const LAZY_ITABLE_INIT_PATH: &str = "/sys/fs/ext4/features/lazy_itable_init";

/// `Formatter` for Linux hosts, using `blkid`, `mkswap` and `mke2fs`.
pub struct LinuxFormatter {
    runner: Arc<dyn CmdRunner>,
    fs: Arc<dyn FileSystem>,
    settings_path: PathBuf,
}

impl LinuxFormatter {
    pub fn new(runner: Arc<dyn CmdRunner>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            runner,
            fs,
            settings_path: PathBuf::from(SETTINGS_PATH),
        }
    }

    /// Uses `path` instead of `SETTINGS_PATH` as the persisted settings file.
    pub fn with_settings_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.settings_path = path.into();
        self
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        self.fs
            .read_file_string(path)
            .context(error::ReadFileSnafu { path })
    }

    fn mounted_disk(&self, mount_point: &str) -> Result<String> {
        let mounts = self.read_file(Path::new(MOUNTS_PATH))?;
        let device = parse_mounted_device(&mounts, mount_point)
            .context(error::MountPointNotFoundSnafu { mount_point })?;
        Ok(disk_from_partition(&device))
    }
}

impl Formatter for LinuxFormatter {
    fn format(&self, path: &str, fs_type: FileSystemType) -> Result<()> {
        // blkid exits non-zero when it finds nothing it recognizes on the device.
        let current = match self.runner.run_command("blkid", &["-p", path]) {
            Ok(output) => parse_blkid_type(&output.stdout),
            Err(e) => {
                debug!("blkid found no filesystem on '{}': {}", path, e);
                None
            }
        };
        if current.as_deref() == Some(fs_type.as_str()) {
            info!("'{}' already has a {} filesystem", path, fs_type);
            return Ok(());
        }

        info!("Creating {} filesystem on '{}'", fs_type, path);
        let result = match fs_type {
            FileSystemType::Swap => self.runner.run_command("mkswap", &[path]),
            FileSystemType::Ext4 => {
                let mut args = vec!["-t", "ext4", "-j"];
                if self.fs.file_exists(Path::new(LAZY_ITABLE_INIT_PATH)) {
                    args.extend(["-E", "lazy_itable_init=1"]);
                }
                args.push(path);
                self.runner.run_command("mke2fs", &args)
            }
        };
        result.context(error::FormatSnafu {
            path,
            fs_type: fs_type.as_str(),
        })?;
        Ok(())
    }

    fn write_fstabs(&self, path: &str, mount_point: &str) -> Result<()> {
        let output = self
            .runner
            .run_command("blkid", &["-p", path])
            .context(error::BlkidSnafu { path })?;
        let uuid = parse_blkid_uuid(&output.stdout)?;

        let fstab_path = Path::new(FSTAB_PATH);
        let mut fstab = match self.fs.read_file_string(fstab_path) {
            Err(e) if e.is_not_found() => String::new(),
            result => result.context(error::ReadFileSnafu { path: fstab_path })?,
        };
        if has_fstab_entry(&fstab, mount_point) {
            info!("fstab already mounts something at '{}'", mount_point);
            return Ok(());
        }

        if !fstab.is_empty() && !fstab.ends_with('\n') {
            fstab.push('\n');
        }
        fstab.push_str(&format!(
            "UUID={} {} ext4 defaults 0 2\n",
            uuid, mount_point
        ));
        info!("Adding '{}' (UUID {}) to fstab at '{}'", path, uuid, mount_point);
        self.fs
            .write_file_string(fstab_path, &fstab)
            .context(error::WriteFileSnafu { path: fstab_path })
    }

    fn change_device_path(&self, device_path: &str, mount_point: &str) -> Result<()> {
        let disk = self.mounted_disk(mount_point)?;
        let settings = self.read_file(&self.settings_path)?;
        let mut value: Value = serde_json::from_str(&settings).context(
            error::SettingsParseSnafu {
                path: &self.settings_path,
            },
        )?;

        if !replace_strings(&mut value, device_path, &disk) {
            debug!(
                "Settings don't refer to '{}', leaving them unchanged",
                device_path
            );
            return Ok(());
        }

        info!("Device '{}' is now '{}' in settings", device_path, disk);
        let updated = serde_json::to_vec(&value).context(error::SettingsSerializeSnafu)?;
        self.fs
            .write_file(&self.settings_path, &updated)
            .context(error::WriteFileSnafu {
                path: &self.settings_path,
            })
    }

    fn get_fstab_device_path(&self) -> Result<String> {
        self.mounted_disk(DATA_DIR)
    }
}

/// Whether a non-comment fstab line already mounts something at `mount_point`.
fn has_fstab_entry(fstab: &str, mount_point: &str) -> bool {
    fstab
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .any(|line| line.split_whitespace().nth(1) == Some(mount_point))
}

/// Replaces every string equal to `from` anywhere in `value` with `to`.  Returns whether
/// anything changed.
fn replace_strings(value: &mut Value, from: &str, to: &str) -> bool {
    match value {
        Value::String(s) if s == from && from != to => {
            *s = to.to_string();
            true
        }
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |changed, item| replace_strings(item, from, to) || changed),
        Value::Object(map) => map
            .values_mut()
            .fold(false, |changed, item| replace_strings(item, from, to) || changed),
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hostsys::fakes::{FakeCmdResult, FakeCmdRunner, FakeFileSystem};

    fn formatter() -> (LinuxFormatter, Arc<FakeCmdRunner>, Arc<FakeFileSystem>) {
        let runner = Arc::new(FakeCmdRunner::new());
        let fs = Arc::new(FakeFileSystem::new());
        (
            LinuxFormatter::new(runner.clone(), fs.clone()),
            runner,
            fs,
        )
    }

    fn blkid(runner: &FakeCmdRunner, path: &str, stdout: &str) {
        runner.add_cmd_result(
            format!("blkid -p {}", path),
            FakeCmdResult {
                stdout: stdout.to_string(),
                ..Default::default()
            },
        );
    }

    fn no_filesystem(runner: &FakeCmdRunner, path: &str) {
        runner.add_cmd_result(
            format!("blkid -p {}", path),
            FakeCmdResult {
                exit_status: 2,
                ..Default::default()
            },
        );
    }

    fn commands(runner: &FakeCmdRunner) -> Vec<String> {
        runner
            .run_commands()
            .iter()
            .map(|command| command.join(" "))
            .collect()
    }

    #[test]
    fn formats_swap() {
        let (formatter, runner, _) = formatter();
        no_filesystem(&runner, "/dev/xvdb1");
        formatter
            .format("/dev/xvdb1", FileSystemType::Swap)
            .unwrap();
        assert_eq!(
            commands(&runner),
            vec!["blkid -p /dev/xvdb1", "mkswap /dev/xvdb1"]
        );
    }

    #[test]
    fn formats_ext4_with_lazy_itable_init() {
        let (formatter, runner, fs) = formatter();
        no_filesystem(&runner, "/dev/xvdb2");
        fs.set_file(LAZY_ITABLE_INIT_PATH, "");
        formatter
            .format("/dev/xvdb2", FileSystemType::Ext4)
            .unwrap();
        assert_eq!(
            commands(&runner),
            vec![
                "blkid -p /dev/xvdb2",
                "mke2fs -t ext4 -j -E lazy_itable_init=1 /dev/xvdb2"
            ]
        );
    }

    #[test]
    fn formats_ext4_without_lazy_itable_init() {
        let (formatter, runner, _) = formatter();
        no_filesystem(&runner, "/dev/xvdb2");
        formatter
            .format("/dev/xvdb2", FileSystemType::Ext4)
            .unwrap();
        assert_eq!(
            commands(&runner),
            vec!["blkid -p /dev/xvdb2", "mke2fs -t ext4 -j /dev/xvdb2"]
        );
    }

    #[test]
    fn leaves_matching_filesystem_alone() {
        let (formatter, runner, _) = formatter();
        blkid(&runner, "/dev/xvdb1", r#"/dev/xvdb1: VERSION="1" TYPE="swap""#);
        formatter
            .format("/dev/xvdb1", FileSystemType::Swap)
            .unwrap();
        formatter
            .format("/dev/xvdb1", FileSystemType::Swap)
            .unwrap();
        assert_eq!(
            commands(&runner),
            vec!["blkid -p /dev/xvdb1", "blkid -p /dev/xvdb1"]
        );
    }

    #[test]
    fn reformats_other_filesystem() {
        let (formatter, runner, _) = formatter();
        blkid(&runner, "/dev/xvdb2", r#"/dev/xvdb2: UUID="abc" TYPE="ext3""#);
        formatter
            .format("/dev/xvdb2", FileSystemType::Ext4)
            .unwrap();
        assert_eq!(commands(&runner).len(), 2);
    }

    #[test]
    fn format_tool_failure() {
        let (formatter, runner, _) = formatter();
        no_filesystem(&runner, "/dev/xvdb1");
        runner.add_cmd_result(
            "mkswap /dev/xvdb1",
            FakeCmdResult {
                stderr: "mkswap: error".to_string(),
                exit_status: 1,
                ..Default::default()
            },
        );
        let err = formatter
            .format("/dev/xvdb1", FileSystemType::Swap)
            .unwrap_err();
        assert_eq!(err.kind(), hostsys::ErrorKind::ToolExecutionFailed);
    }

    #[test]
    fn appends_fstab_line() {
        let (formatter, runner, fs) = formatter();
        blkid(&runner, "/dev/xvdb2", r#"TYPE="ext4" UUID="abc-123""#);
        fs.set_file(FSTAB_PATH, "LABEL=root / ext4 defaults 0 1");
        formatter
            .write_fstabs("/dev/xvdb2", "/var/vcap/store")
            .unwrap();
        assert_eq!(
            fs.contents(FSTAB_PATH).unwrap(),
            "LABEL=root / ext4 defaults 0 1\nUUID=abc-123 /var/vcap/store ext4 defaults 0 2\n"
        );
    }

    #[test]
    fn fstab_entry_written_once() {
        let (formatter, runner, fs) = formatter();
        blkid(&runner, "/dev/xvdb2", r#"TYPE="ext4" UUID="abc-123""#);
        formatter
            .write_fstabs("/dev/xvdb2", "/var/vcap/store")
            .unwrap();
        formatter
            .write_fstabs("/dev/xvdb2", "/var/vcap/store")
            .unwrap();
        assert_eq!(fs.writes(), vec![PathBuf::from(FSTAB_PATH)]);
        assert_eq!(
            fs.contents(FSTAB_PATH).unwrap(),
            "UUID=abc-123 /var/vcap/store ext4 defaults 0 2\n"
        );
    }

    #[test]
    fn commented_fstab_entries_ignored() {
        assert!(!has_fstab_entry(
            "# UUID=x /var/vcap/store ext4 defaults 0 2\n",
            "/var/vcap/store"
        ));
        assert!(has_fstab_entry(
            "  UUID=x /var/vcap/store ext4 defaults 0 2\n",
            "/var/vcap/store"
        ));
        assert!(!has_fstab_entry(
            "UUID=x /var/vcap/store2 ext4 defaults 0 2\n",
            "/var/vcap/store"
        ));
    }

    #[test]
    fn fstab_needs_uuid() {
        let (formatter, runner, fs) = formatter();
        blkid(&runner, "/dev/xvdb2", r#"/dev/xvdb2: PTTYPE="dos""#);
        let err = formatter
            .write_fstabs("/dev/xvdb2", "/var/vcap/store")
            .unwrap_err();
        assert!(matches!(err, crate::Error::BlkidOutput { .. }));
        assert!(fs.writes().is_empty());
    }

    const MOUNTS: &str = "/dev/xvda1 / ext4 rw 0 0\n/dev/xvdb2 /var/vcap/data ext4 rw 0 0\n";

    #[test]
    fn rewrites_device_path_in_settings() {
        let (formatter, _, fs) = formatter();
        fs.set_file(MOUNTS_PATH, MOUNTS);
        fs.set_file(
            SETTINGS_PATH,
            r#"{"agent_id":"a","disks":{"ephemeral":"/dev/sdb","persistent":{"vol-1":"/dev/sdc"}}}"#,
        );
        formatter
            .change_device_path("/dev/sdb", "/var/vcap/data")
            .unwrap();
        let settings: Value =
            serde_json::from_str(&fs.contents(SETTINGS_PATH).unwrap()).unwrap();
        assert_eq!(settings["disks"]["ephemeral"], "/dev/xvdb");
        assert_eq!(settings["disks"]["persistent"]["vol-1"], "/dev/sdc");
    }

    #[test]
    fn unchanged_settings_not_written() {
        let (formatter, _, fs) = formatter();
        fs.set_file(MOUNTS_PATH, MOUNTS);
        fs.set_file(SETTINGS_PATH, r#"{"disks":{"ephemeral":"/dev/xvdb"}}"#);
        formatter
            .change_device_path("/dev/sdb", "/var/vcap/data")
            .unwrap();
        formatter
            .change_device_path("/dev/xvdb", "/var/vcap/data")
            .unwrap();
        assert!(fs.writes().is_empty());
    }

    #[test]
    fn device_path_needs_mount() {
        let (formatter, _, fs) = formatter();
        fs.set_file(MOUNTS_PATH, MOUNTS);
        let err = formatter
            .change_device_path("/dev/sdb", "/var/vcap/store")
            .unwrap_err();
        assert_eq!(err.kind(), hostsys::ErrorKind::AmbiguousOrMissingTarget);
    }

    #[test]
    fn data_dir_disk() {
        let (formatter, _, fs) = formatter();
        fs.set_file(MOUNTS_PATH, MOUNTS);
        assert_eq!(formatter.get_fstab_device_path().unwrap(), "/dev/xvdb");
    }

    #[test]
    fn custom_settings_path() {
        let (formatter, _, fs) = formatter();
        let formatter = formatter.with_settings_path("/tmp/settings.json");
        fs.set_file(MOUNTS_PATH, MOUNTS);
        fs.set_file("/tmp/settings.json", r#"["/dev/sdb"]"#);
        formatter
            .change_device_path("/dev/sdb", "/var/vcap/data")
            .unwrap();
        assert_eq!(
            fs.contents("/tmp/settings.json").unwrap(),
            r#"["/dev/xvdb"]"#
        );
    }
}
