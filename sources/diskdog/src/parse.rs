//! Parsers for the output of `blkid -p` and for the kernel mount table.

use crate::{error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use snafu::OptionExt;

lazy_static! {
    // blkid prints `<device>: KEY="value" KEY="value" ...`.
    static ref BLKID_FIELD: Regex = Regex::new(r#"(?:^|\s)([A-Z_]+)="([^"]*)""#).unwrap();
    // Partitions of devices whose names end in a digit carry a `p` separator.
    static ref P_PARTITION: Regex = Regex::new(r"^(.*\d)p\d+$").unwrap();
    static ref DIGIT_PARTITION: Regex = Regex::new(r"^(\D+)\d+$").unwrap();
}

fn blkid_field<'a>(output: &'a str, key: &str) -> Option<&'a str> {
    BLKID_FIELD
        .captures_iter(output)
        .find(|caps| &caps[1] == key)
        .and_then(|caps| caps.get(2))
        .map(|value| value.as_str())
}

/// Returns the filesystem UUID from `blkid -p` output.
pub fn parse_blkid_uuid(output: &str) -> Result<String> {
    blkid_field(output, "UUID")
        .filter(|uuid| !uuid.is_empty())
        .map(str::to_string)
        .context(error::BlkidOutputSnafu {
            field: "UUID",
            output,
        })
}

/// Returns the filesystem type from `blkid -p` output, if blkid found one.
pub fn parse_blkid_type(output: &str) -> Option<String> {
    blkid_field(output, "TYPE")
        .filter(|fs_type| !fs_type.is_empty())
        .map(str::to_string)
}

/// Returns the device mounted at `mount_point` according to a `/proc/mounts` style table.  If
/// several filesystems are stacked on the mount point, the last one is the visible one.
pub fn parse_mounted_device(mounts: &str, mount_point: &str) -> Option<String> {
    mounts
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let target = fields.next()?;
            (target == mount_point).then(|| device.to_string())
        })
        .last()
}

/// Reduces a partition device path to the disk it belongs to, e.g. `/dev/xvdb2` to
/// `/dev/xvdb` and `/dev/nvme0n1p2` to `/dev/nvme0n1`.  Anything else is returned as is.
pub fn disk_from_partition(device: &str) -> String {
    let (dir, name) = match device.rfind('/') {
        Some(i) => device.split_at(i + 1),
        None => ("", device),
    };

    let disk = if let Some(caps) = P_PARTITION.captures(name) {
        caps[1].to_string()
    } else if ["nvme", "mmcblk", "loop"]
        .iter()
        .any(|prefix| name.starts_with(prefix))
    {
        name.to_string()
    } else if let Some(caps) = DIGIT_PARTITION.captures(name) {
        caps[1].to_string()
    } else {
        name.to_string()
    };
    format!("{}{}", dir, disk)
}
