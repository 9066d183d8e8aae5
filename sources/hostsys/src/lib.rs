/*!
# Introduction

hostsys provides the two host capabilities the configuration crates are built on:

* `CmdRunner` runs external programs such as `blkid`, `ifup` or `arping`, and answers whether a
  program is installed.
* `FileSystem` reads and writes files, checks for their existence, expands globs and reads
  symlinks.

The real implementations are `ExecCmdRunner` and `OsFileSystem`.  With the `fakes` feature
enabled, the `fakes` module provides in-memory versions that record every command and write so
that callers can assert on exactly what would have happened to the host.
*/

#![deny(rust_2018_idioms)]

mod cmd;
#[cfg(any(test, feature = "fakes"))]
pub mod fakes;
mod fs;

pub use cmd::{command_line, CmdRunner, CommandOutput, ExecCmdRunner};
pub use fs::{FileSystem, OsFileSystem};

/// Broad classes of failure shared by the configuration crates, so that callers can branch on
/// what went wrong without matching every crate's error variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A remote endpoint could not be reached at all.
    TransportUnavailable,
    /// A source answered, or a file was looked for, but the data isn't there.
    DataUnavailable,
    /// Data was present but couldn't be parsed.
    MalformedData,
    /// A lookup matched nothing, or more than one thing.
    AmbiguousOrMissingTarget,
    /// An external program failed to start or exited unsuccessfully.
    ToolExecutionFailed,
    /// A required value was present but empty.
    EmptyRequiredField,
    Other,
}

mod error {
    use super::ErrorKind;
    use snafu::Snafu;
    use std::io;
    use std::path::PathBuf;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(crate)))]
    pub enum Error {
        #[snafu(display("Failed to start '{}': {}", command, source))]
        CommandSpawn { command: String, source: io::Error },

        #[snafu(display("'{}' exited with status {}: {}", command, status, stderr))]
        CommandFailed {
            command: String,
            status: i32,
            stdout: String,
            stderr: String,
        },

        #[snafu(display("Failed to create directory '{}': {}", path.display(), source))]
        CreateDir { path: PathBuf, source: io::Error },

        #[snafu(display("Invalid glob pattern '{}': {}", pattern, source))]
        GlobPattern {
            pattern: String,
            source: glob::PatternError,
        },

        #[snafu(display("Failed to expand glob '{}': {}", pattern, source))]
        GlobRead {
            pattern: String,
            source: glob::GlobError,
        },

        #[snafu(display("Contents of '{}' are not UTF-8: {}", path.display(), source))]
        NonUtf8 {
            path: PathBuf,
            source: std::string::FromUtf8Error,
        },

        #[snafu(display("Failed to read '{}': {}", path.display(), source))]
        ReadFile { path: PathBuf, source: io::Error },

        #[snafu(display("Failed to read link '{}': {}", path.display(), source))]
        ReadLink { path: PathBuf, source: io::Error },

        #[snafu(display("Failed to write '{}': {}", path.display(), source))]
        WriteFile { path: PathBuf, source: io::Error },
    }

    impl Error {
        pub fn kind(&self) -> ErrorKind {
            match self {
                Error::CommandSpawn { .. } | Error::CommandFailed { .. } => {
                    ErrorKind::ToolExecutionFailed
                }
                Error::NonUtf8 { .. } | Error::GlobPattern { .. } => ErrorKind::MalformedData,
                _ if self.is_not_found() => ErrorKind::DataUnavailable,
                _ => ErrorKind::Other,
            }
        }

        /// Whether the error means the file simply isn't there, as opposed to being unreadable.
        pub fn is_not_found(&self) -> bool {
            match self {
                Error::ReadFile { source, .. } | Error::ReadLink { source, .. } => {
                    source.kind() == io::ErrorKind::NotFound
                }
                _ => false,
            }
        }
    }
}

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
