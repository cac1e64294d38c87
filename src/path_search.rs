//! Command lookup through `PATH`, following POSIX command search rules.

use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use log::debug;
use nix::unistd::{AccessFlags, access};
use thiserror::Error;

/// Longest candidate path, in bytes, that resolution will check.
pub const MAX_PATH_LEN: usize = 4096;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("{0:?} is not an executable file")]
    NotExecutable(OsString),

    #[error("PATH is unset")]
    NoSearchPath,

    #[error("{0:?} not found in PATH")]
    NotFound(OsString),

    #[error("resolved path for {0:?} is too long")]
    NameTooLong(OsString),
}

/// Returns true if the current user may execute `path` and it is a regular
/// file. Racy by nature; the file can change between the two checks.
pub fn is_executable(path: &Path) -> bool {
    access(path, AccessFlags::X_OK).is_ok()
        && fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// A snapshot of the search path used to resolve command names.
#[derive(Debug, Clone, Default)]
pub struct PathSearch {
    dirs: Option<OsString>,
    working_dir: Option<PathBuf>,
}

impl PathSearch {
    pub fn new(dirs: Option<impl Into<OsString>>) -> Self {
        Self {
            dirs: dirs.map(Into::into),
            working_dir: None,
        }
    }

    pub fn from_env() -> Self {
        Self::new(env::var_os("PATH"))
    }

    /// Resolve relative names and empty search path entries against `dir`
    /// instead of the process's current directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn anchored(&self, path: PathBuf) -> PathBuf {
        match &self.working_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        }
    }

    /// Resolve `command` to an executable file.
    ///
    /// Tokens containing `/` are checked as-is and never looked up in the
    /// search path. Otherwise each search path entry is tried left to right
    /// and the first executable match wins. Empty entries stand for the
    /// current directory.
    pub fn resolve(&self, command: &OsStr) -> Result<PathBuf, ResolveError> {
        if command.as_bytes().contains(&b'/') {
            let path = self.anchored(PathBuf::from(command));
            if path.as_os_str().len() >= MAX_PATH_LEN {
                return Err(ResolveError::NameTooLong(command.to_os_string()));
            }
            return if is_executable(&path) {
                Ok(path)
            } else {
                Err(ResolveError::NotExecutable(command.to_os_string()))
            };
        }

        let Some(dirs) = &self.dirs else {
            return Err(ResolveError::NoSearchPath);
        };

        for dir in env::split_paths(dirs) {
            let dir = if dir.as_os_str().is_empty() {
                self.working_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("."))
            } else {
                dir
            };
            let candidate = self.anchored(dir.join(command));
            if candidate.as_os_str().len() >= MAX_PATH_LEN {
                return Err(ResolveError::NameTooLong(command.to_os_string()));
            }
            if is_executable(&candidate) {
                return Ok(candidate);
            }
        }

        debug!("{:?} not found in search path", command);
        Err(ResolveError::NotFound(command.to_os_string()))
    }

    pub fn can_resolve(&self, command: &OsStr) -> bool {
        self.resolve(command).is_ok()
    }
}
