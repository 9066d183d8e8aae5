//! The fs module owns the `FileSystem` trait and its implementation over the real filesystem.

use crate::{error, Result};
use log::debug;
use snafu::ResultExt;
use std::fs;
use std::path::{Path, PathBuf};

/// Filesystem access used by the configuration crates.
pub trait FileSystem: Send + Sync {
    /// Reads the raw contents of `path`.
    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Writes `content` to `path`, creating parent directories as needed.
    fn write_file(&self, path: &Path, content: &[u8]) -> Result<()>;

    fn file_exists(&self, path: &Path) -> bool;

    /// Returns the paths matching a shell-style glob, in sorted order.
    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>>;

    /// Returns the target of the symlink at `path`.
    fn readlink(&self, path: &Path) -> Result<PathBuf>;

    fn read_file_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read_file(path)?;
        String::from_utf8(bytes).context(error::NonUtf8Snafu { path })
    }

    fn write_file_string(&self, path: &Path, content: &str) -> Result<()> {
        self.write_file(path, content.as_bytes())
    }

    /// Writes `content` to `path` only if the file is missing or differs.  Returns whether a
    /// write happened, which callers use to decide whether a service restart is needed.
    fn converge_file_contents(&self, path: &Path, content: &[u8]) -> Result<bool> {
        if self.file_exists(path) {
            let current = self.read_file(path)?;
            if current == content {
                debug!("'{}' is already up to date", path.display());
                return Ok(false);
            }
        }
        self.write_file(path, content)?;
        Ok(true)
    }
}

/// `FileSystem` backed by `std::fs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).context(error::ReadFileSnafu { path })
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context(error::CreateDirSnafu { path: parent })?;
            }
        }
        debug!("Writing {} bytes to '{}'", content.len(), path.display());
        fs::write(path, content).context(error::WriteFileSnafu { path })
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in glob::glob(pattern).context(error::GlobPatternSnafu { pattern })? {
            paths.push(entry.context(error::GlobReadSnafu { pattern })?);
        }
        paths.sort();
        Ok(paths)
    }

    fn readlink(&self, path: &Path) -> Result<PathBuf> {
        fs::read_link(path).context(error::ReadLinkSnafu { path })
    }
}
