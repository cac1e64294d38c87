use crate::error::Result;
use crate::list::CommandList;

/// Something that contributes commands to a [`CommandList`].
pub trait Source {
    fn scan(&self, list: &mut CommandList) -> Result<()>;
}

pub mod desktop;
pub mod list_file;
