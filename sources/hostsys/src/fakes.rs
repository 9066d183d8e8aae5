//! In-memory `FileSystem` and `CmdRunner` implementations.
//!
//! Both fakes are internally synchronized so they can be shared with background threads, e.g.
//! the ARP probes started by the network manager.

use crate::cmd::{command_line, CmdRunner, CommandOutput};
use crate::{error, Result};
use crate::fs::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking test thread shouldn't hide the recorded state from the assertions.
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
pub struct FakeFileSystem {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    globs: Mutex<HashMap<String, Vec<PathBuf>>>,
    symlinks: Mutex<HashMap<PathBuf, PathBuf>>,
    writes: Mutex<Vec<PathBuf>>,
    failing_writes: Mutex<HashSet<PathBuf>>,
}

impl FakeFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a file without recording it as a write.
    pub fn set_file<P: AsRef<Path>>(&self, path: P, content: &str) {
        lock(&self.files).insert(path.as_ref().to_path_buf(), content.as_bytes().to_vec());
    }

    pub fn set_glob<S: Into<String>>(&self, pattern: S, paths: &[&str]) {
        lock(&self.globs).insert(pattern.into(), paths.iter().map(PathBuf::from).collect());
    }

    pub fn set_symlink<P: AsRef<Path>, T: AsRef<Path>>(&self, path: P, target: T) {
        lock(&self.symlinks).insert(path.as_ref().to_path_buf(), target.as_ref().to_path_buf());
    }

    /// Makes every later write to `path` fail.
    pub fn fail_writes_to<P: AsRef<Path>>(&self, path: P) {
        lock(&self.failing_writes).insert(path.as_ref().to_path_buf());
    }

    pub fn contents<P: AsRef<Path>>(&self, path: P) -> Option<String> {
        lock(&self.files)
            .get(path.as_ref())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Every path written through the `FileSystem` trait, in order.
    pub fn writes(&self) -> Vec<PathBuf> {
        lock(&self.writes).clone()
    }
}

impl FileSystem for FakeFileSystem {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        lock(&self.files)
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        if lock(&self.failing_writes).contains(path) {
            return Err(crate::Error::WriteFile {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "fake write failure"),
            });
        }
        lock(&self.writes).push(path.to_path_buf());
        lock(&self.files).insert(path.to_path_buf(), content.to_vec());
        Ok(())
    }

    fn file_exists(&self, path: &Path) -> bool {
        lock(&self.files).contains_key(path) || lock(&self.symlinks).contains_key(path)
    }

    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        Ok(lock(&self.globs).get(pattern).cloned().unwrap_or_default())
    }

    fn readlink(&self, path: &Path) -> Result<PathBuf> {
        lock(&self.symlinks).get(path).cloned().ok_or_else(|| {
            crate::Error::ReadLink {
                path: path.to_path_buf(),
                source: io::Error::from(io::ErrorKind::NotFound),
            }
        })
    }
}

fn not_found(path: &Path) -> crate::Error {
    crate::Error::ReadFile {
        path: path.to_path_buf(),
        source: io::Error::from(io::ErrorKind::NotFound),
    }
}

/// Canned result for a command line.
#[derive(Clone, Debug, Default)]
pub struct FakeCmdResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

#[derive(Default)]
pub struct FakeCmdRunner {
    results: Mutex<HashMap<String, FakeCmdResult>>,
    commands: Mutex<Vec<Vec<String>>>,
    existing: Mutex<HashSet<String>>,
}

impl FakeCmdRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the result for a full command line, e.g. `"ifup --version"`.  Commands without
    /// a registered result succeed with empty output.
    pub fn add_cmd_result<S: Into<String>>(&self, command: S, result: FakeCmdResult) {
        lock(&self.results).insert(command.into(), result);
    }

    pub fn set_command_exists<S: Into<String>>(&self, cmd: S) {
        lock(&self.existing).insert(cmd.into());
    }

    /// Every command run so far, as program followed by arguments.
    pub fn run_commands(&self) -> Vec<Vec<String>> {
        lock(&self.commands).clone()
    }
}

impl CmdRunner for FakeCmdRunner {
    fn run_command(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        let mut recorded = vec![cmd.to_string()];
        recorded.extend(args.iter().map(|s| s.to_string()));
        lock(&self.commands).push(recorded);

        let command = command_line(cmd, args);
        let result = lock(&self.results).get(&command).cloned().unwrap_or_default();
        if result.exit_status != 0 {
            return error::CommandFailedSnafu {
                command,
                status: result.exit_status,
                stdout: result.stdout,
                stderr: result.stderr,
            }
            .fail();
        }
        Ok(CommandOutput {
            stdout: result.stdout,
            stderr: result.stderr,
            status: 0,
        })
    }

    fn command_exists(&self, cmd: &str) -> bool {
        lock(&self.existing).contains(cmd)
    }
}
