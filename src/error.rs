use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Process exit statuses. A value above [`SIGNAL_EXIT_OFFSET`] means the menu
/// was killed by signal `status - SIGNAL_EXIT_OFFSET`.
pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FATAL: u8 = 1;
pub const EXIT_NONFATAL: u8 = 2;
pub const SIGNAL_EXIT_OFFSET: u8 = 128;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not grow command list: out of memory")]
    OutOfMemory,

    #[error("could not open '{}': {}", .path.display(), .source)]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not load commands from {}: {}", .what, .source)]
    Read {
        what: String,
        source: std::io::Error,
    },

    #[error("unable to walk '{}': {}", .root.display(), .source)]
    Walk {
        root: PathBuf,
        source: walkdir::Error,
    },

    #[error("no commands found")]
    NoCommands,

    #[error("unable to {} '{}': {}", .action, .path.display(), .source)]
    Persist {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration in '{}': {}", .path.display(), .source)]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("HOME is unset; use \"-f\" to specify list path")]
    NoHome,
}

impl Error {
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }

    pub fn persist(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persist {
            action,
            path: path.into(),
            source,
        }
    }

    /// True when the error is a missing file rather than an unreadable one.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Open { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}
