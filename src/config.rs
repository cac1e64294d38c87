use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::executor::{DEFAULT_MENU_COMMAND, MenuCommand};

/// Basename of the command list kept in `$HOME` by default.
pub const DEFAULT_LIST_BASENAME: &str = ".del";

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub menu: MenuConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GeneralConfig {
    #[serde(default)]
    pub list_path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MenuConfig {
    #[serde(default = "default_menu_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_menu_command() -> String { DEFAULT_MENU_COMMAND.to_string() }

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            command: default_menu_command(),
            args: Vec::new(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RefreshConfig {
    #[serde(default)]
    pub roots: Vec<PathBuf>,
}

impl Config {
    /// Command list location: the configured path, else `$HOME/.del`.
    pub fn list_path(&self) -> Result<PathBuf> {
        resolve_list_path(self.general.list_path.as_deref(), env::var_os("HOME"))
    }

    /// Folders to search on refresh. Command line arguments take precedence
    /// over the configured roots; an empty result means `/`.
    pub fn roots(&self, arguments: &[String]) -> Vec<PathBuf> {
        if arguments.is_empty() {
            self.refresh.roots.clone()
        } else {
            arguments.iter().map(PathBuf::from).collect()
        }
    }
}

impl MenuConfig {
    /// Build the menu invocation from trailing command line arguments. When
    /// they are absent or start with an option, the configured menu program
    /// is put in front of them.
    pub fn command_line(&self, arguments: &[String]) -> MenuCommand {
        match arguments.split_first() {
            None => MenuCommand::new(&self.command, self.args.clone()),
            Some((first, _)) if first.starts_with('-') => {
                MenuCommand::new(&self.command, arguments.to_vec())
            }
            Some((program, rest)) => MenuCommand::new(program, rest.to_vec()),
        }
    }
}

fn resolve_list_path(configured: Option<&Path>, home: Option<OsString>) -> Result<PathBuf> {
    match configured {
        Some(path) => match home_relative(path) {
            Some(rest) => {
                let home = home.ok_or(Error::NoHome)?;
                Ok(PathBuf::from(home).join(rest))
            }
            None => Ok(path.to_path_buf()),
        },
        None => {
            let home = home.ok_or(Error::NoHome)?;
            Ok(PathBuf::from(home).join(DEFAULT_LIST_BASENAME))
        }
    }
}

/// The part after a leading `~/`. A bare `~` names a file called `~`.
fn home_relative(path: &Path) -> Option<&Path> {
    path.as_os_str()
        .as_bytes()
        .strip_prefix(b"~/")
        .map(|rest| Path::new(OsStr::from_bytes(rest)))
}

pub fn default_config_path() -> PathBuf {
    match ProjectDirs::from("org", "del", "del") {
        Some(dirs) => dirs.config_dir().join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

/// Load the configuration at the default location, falling back to defaults
/// when no file exists there.
pub fn load_config() -> Result<Config> {
    let config_path = default_config_path();
    if !config_path.exists() {
        return Ok(Config::default());
    }
    load_config_from(&config_path)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| Error::open(path, e))?;
    toml::from_str(&content).map_err(|source| Error::Config {
        path: path.to_path_buf(),
        source,
    })
}
