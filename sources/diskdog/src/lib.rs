/*!
# Introduction

diskdog prepares block devices the agent was given: it puts a filesystem on them, registers them
in `/etc/fstab`, and keeps the device paths recorded in the agent's persisted settings in line
with what the kernel actually named the disk.

Every operation inspects the current state first and does nothing if the device is already in
the desired state, so it is safe to run on every boot.

* `format` asks `blkid -p` what is on the device and only runs `mkswap` or `mke2fs` when the
  device doesn't already carry the requested filesystem.
* `write_fstabs` appends a `UUID=<uuid> <mount point> ext4 defaults 0 2` line unless the mount
  point already has an entry.
* `change_device_path` rewrites a device path in the settings file to the disk currently
  mounted at a mount point.
* `get_fstab_device_path` reports the disk backing the agent's data directory.
*/

#![deny(rust_2018_idioms)]

mod formatter;
mod parse;

pub use formatter::{LinuxFormatter, DATA_DIR, FSTAB_PATH, MOUNTS_PATH, SETTINGS_PATH};
pub use parse::{disk_from_partition, parse_blkid_type, parse_blkid_uuid, parse_mounted_device};

use snafu::OptionExt;
use std::fmt;
use std::str::FromStr;

/// Filesystems the agent knows how to create.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileSystemType {
    Swap,
    Ext4,
}

impl FileSystemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileSystemType::Swap => "swap",
            FileSystemType::Ext4 => "ext4",
        }
    }
}

impl fmt::Display for FileSystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileSystemType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [FileSystemType::Swap, FileSystemType::Ext4]
            .into_iter()
            .find(|fs_type| fs_type.as_str() == s)
            .context(error::UnknownFileSystemTypeSnafu { name: s })
    }
}

/// Filesystem creation and registration for block devices.
pub trait Formatter: Send + Sync {
    /// Creates a `fs_type` filesystem on `path` unless one is already there.
    fn format(&self, path: &str, fs_type: FileSystemType) -> Result<()>;

    /// Registers the filesystem on `path` to be mounted at `mount_point` on boot.
    fn write_fstabs(&self, path: &str, mount_point: &str) -> Result<()>;

    /// Replaces `device_path` in the persisted settings with the disk mounted at `mount_point`.
    fn change_device_path(&self, device_path: &str, mount_point: &str) -> Result<()>;

    /// Returns the disk mounted at the agent's data directory.
    fn get_fstab_device_path(&self) -> Result<String>;
}

mod error {
    use hostsys::ErrorKind;
    use snafu::Snafu;
    use std::path::PathBuf;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(crate)))]
    pub enum Error {
        #[snafu(display("Failed to inspect '{}' with blkid: {}", path, source))]
        Blkid {
            path: String,
            source: hostsys::Error,
        },

        #[snafu(display("No {} in blkid output '{}'", field, output))]
        BlkidOutput { field: &'static str, output: String },

        #[snafu(display("Failed to create {} filesystem on '{}': {}", fs_type, path, source))]
        Format {
            path: String,
            fs_type: String,
            source: hostsys::Error,
        },

        #[snafu(display("Nothing is mounted at '{}'", mount_point))]
        MountPointNotFound { mount_point: String },

        #[snafu(display("Failed to read '{}': {}", path.display(), source))]
        ReadFile {
            path: PathBuf,
            source: hostsys::Error,
        },

        #[snafu(display("Failed to parse settings file '{}': {}", path.display(), source))]
        SettingsParse {
            path: PathBuf,
            source: serde_json::Error,
        },

        #[snafu(display("Failed to serialize settings: {}", source))]
        SettingsSerialize { source: serde_json::Error },

        #[snafu(display("Unknown filesystem type '{}'", name))]
        UnknownFileSystemType { name: String },

        #[snafu(display("Failed to write '{}': {}", path.display(), source))]
        WriteFile {
            path: PathBuf,
            source: hostsys::Error,
        },
    }

    impl Error {
        pub fn kind(&self) -> ErrorKind {
            match self {
                Error::Blkid { .. } | Error::Format { .. } => ErrorKind::ToolExecutionFailed,
                Error::BlkidOutput { .. }
                | Error::SettingsParse { .. }
                | Error::UnknownFileSystemType { .. } => ErrorKind::MalformedData,
                Error::MountPointNotFound { .. } => ErrorKind::AmbiguousOrMissingTarget,
                Error::ReadFile { source, .. } => source.kind(),
                Error::SettingsSerialize { .. } | Error::WriteFile { .. } => ErrorKind::Other,
            }
        }
    }
}

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
