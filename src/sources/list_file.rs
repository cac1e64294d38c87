use std::path::PathBuf;

use log::debug;

use crate::error::Result;
use crate::list::{CommandList, ListSource};
use crate::path_search::PathSearch;
use crate::sources::Source;

/// A previously persisted command list. A missing file means this is the
/// first refresh and contributes nothing.
pub struct ListFileSource {
    pub path: PathBuf,
    pub search: PathSearch,
}

impl Source for ListFileSource {
    fn scan(&self, list: &mut CommandList) -> Result<()> {
        match list.load(ListSource::Path(&self.path), &self.search) {
            Err(e) if e.is_not_found() => {
                debug!("{} does not exist yet", self.path.display());
                Ok(())
            }
            other => other,
        }
    }
}
