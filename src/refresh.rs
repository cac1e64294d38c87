use std::io::BufRead;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{Error, Result};
use crate::list::{CommandList, ListSource};
use crate::path_search::PathSearch;
use crate::sources::Source;
use crate::sources::desktop::DesktopSource;
use crate::sources::list_file::ListFileSource;

pub const DEFAULT_ROOT: &str = "/";

/// Rebuild the command list at `list_path`.
///
/// Names piped through `stdin` come first, then whatever the existing list
/// still holds, then every desktop entry below `roots` (`/` when empty). An
/// empty result is refused so the previous list survives. Returns the number
/// of commands written.
pub fn refresh(
    list_path: &Path,
    roots: &[PathBuf],
    search: &PathSearch,
    stdin: Option<&mut dyn BufRead>,
) -> Result<usize> {
    let mut list = CommandList::new();

    if let Some(stdin) = stdin {
        list.load(ListSource::Stream(stdin), search)?;
    }

    let mut sources: Vec<Box<dyn Source>> = vec![Box::new(ListFileSource {
        path: list_path.to_path_buf(),
        search: search.clone(),
    })];
    if roots.is_empty() {
        sources.push(Box::new(DesktopSource::new(DEFAULT_ROOT, search.clone())));
    } else {
        for root in roots {
            sources.push(Box::new(DesktopSource::new(root, search.clone())));
        }
    }

    for source in &sources {
        source.scan(&mut list)?;
    }

    if list.is_empty() {
        return Err(Error::NoCommands);
    }

    let written = list.persist(list_path)?;
    info!("wrote {} commands to {}", written, list_path.display());
    Ok(written)
}
