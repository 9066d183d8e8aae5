//! The cmd module owns the `CmdRunner` trait and its process-backed implementation.

use crate::{error, Result};
use log::{debug, trace};
use snafu::{ensure, ResultExt};
use std::env;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

/// Captured result of a command that exited successfully.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

/// Runs external programs on the host.
pub trait CmdRunner: Send + Sync {
    /// Runs `cmd` with `args` to completion.  A non-zero exit status is returned as
    /// `Error::CommandFailed`, carrying the captured output.
    fn run_command(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Returns whether `cmd` can be found on the search path.
    fn command_exists(&self, cmd: &str) -> bool;
}

/// Renders a command and its arguments the way a shell user would type them, for messages.
pub fn command_line(cmd: &str, args: &[&str]) -> String {
    std::iter::once(cmd)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `CmdRunner` backed by `std::process::Command`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecCmdRunner;

impl CmdRunner for ExecCmdRunner {
    fn run_command(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        let command = command_line(cmd, args);
        debug!("Running '{}'", command);
        let output = Command::new(cmd)
            .args(args)
            .output()
            .context(error::CommandSpawnSnafu { command: &command })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let status = output.status.code().unwrap_or(-1);
        trace!("'{}' exited {}, stdout: {:?}", command, status, stdout);

        ensure!(
            output.status.success(),
            error::CommandFailedSnafu {
                command,
                status,
                stdout,
                stderr,
            }
        );

        Ok(CommandOutput {
            stdout,
            stderr,
            status,
        })
    }

    fn command_exists(&self, cmd: &str) -> bool {
        if cmd.contains('/') {
            return is_executable(Path::new(cmd));
        }
        env::var_os("PATH")
            .map(|paths| env::split_paths(&paths).any(|dir| is_executable(&dir.join(cmd))))
            .unwrap_or(false)
    }
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
