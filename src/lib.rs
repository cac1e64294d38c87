//! Desktop entry launcher.
//!
//! Builds a list of graphical commands from Freedesktop desktop entries and
//! uses a menu program such as dmenu to pick one to run.

pub mod config;
pub mod error;
pub mod executor;
pub mod list;
pub mod path_search;
pub mod refresh;
pub mod sources;
