//! In-memory command list and its on-disk form.
//!
//! The list is a plain vector searched linearly. It rarely holds more than a
//! few hundred names, so a hash index would not pay for itself. The persisted
//! file is rewritten through a temporary file and a rename so readers see
//! either the old or the new list, never a partial one.

use std::cmp::Ordering;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use log::debug;

use crate::error::{Error, Result};
use crate::path_search::PathSearch;

/// Number of slots added to the list each time it fills up.
pub const GROWTH_INCREMENT: usize = 64;

/// Where [`CommandList::load`] reads names from.
pub enum ListSource<'a> {
    Path(&'a Path),
    Stream(&'a mut dyn BufRead),
}

#[derive(Debug, Default)]
pub struct CommandList {
    commands: Vec<OsString>,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OsStr> {
        self.commands.iter().map(OsString::as_os_str)
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, name: impl AsRef<OsStr>) -> bool {
        let name = name.as_ref();
        self.commands.iter().any(|c| eq_ignore_case(c, name))
    }

    /// Append a copy of `name` without checking for duplicates.
    pub fn add(&mut self, name: impl AsRef<OsStr>) -> Result<()> {
        let name = name.as_ref();
        if self.commands.len() == self.commands.capacity() {
            self.commands
                .try_reserve_exact(GROWTH_INCREMENT)
                .map_err(|_| Error::OutOfMemory)?;
        }

        let mut copy = OsString::new();
        copy.try_reserve_exact(name.len())
            .map_err(|_| Error::OutOfMemory)?;
        copy.push(name);
        self.commands.push(copy);
        Ok(())
    }

    /// Read newline separated names, keeping only those that still resolve.
    /// Names that no longer resolve are echoed as removed.
    pub fn load(&mut self, source: ListSource<'_>, search: &PathSearch) -> Result<()> {
        match source {
            ListSource::Path(path) => {
                let file = File::open(path).map_err(|e| Error::open(path, e))?;
                self.load_lines(&mut BufReader::new(file), search)
                    .map_err(|e| with_origin(e, path.display().to_string()))
            }
            ListSource::Stream(reader) => self
                .load_lines(reader, search)
                .map_err(|e| with_origin(e, "stdin".to_string())),
        }
    }

    fn load_lines(&mut self, reader: &mut dyn BufRead, search: &PathSearch) -> Result<()> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf).map_err(|source| Error::Read {
                what: String::new(),
                source,
            })?;
            if read == 0 {
                return Ok(());
            }
            if buf.last() == Some(&b'\n') {
                buf.pop();
            }
            let entry = OsStr::from_bytes(&buf);
            if entry.is_empty() {
                continue;
            }

            if search.can_resolve(entry) {
                if !self.contains(entry) {
                    self.add(entry)?;
                }
            } else {
                println!("- {}", entry.to_string_lossy());
            }
        }
    }

    /// Sort alphabetically ignoring ASCII case. The sort is stable, so equal
    /// names keep the order they were added in.
    pub fn sort(&mut self) {
        self.commands.sort_by(|a, b| compare_ignore_case(a, b));
    }

    /// Sort the list and atomically replace `path` with it, one name per
    /// line. Returns the number of lines written.
    pub fn persist(&mut self, path: &Path) -> Result<usize> {
        self.sort();

        let commands = &self.commands;
        let mut written = 0;
        replace_file(path, |out| {
            let mut previous: Option<&OsStr> = None;
            for command in commands {
                if previous.is_some_and(|p| eq_ignore_case(p, command)) {
                    continue;
                }
                out.write_all(command.as_bytes())?;
                out.write_all(b"\n")?;
                previous = Some(command.as_os_str());
                written += 1;
            }
            Ok(())
        })?;

        Ok(written)
    }
}

fn with_origin(err: Error, what: String) -> Error {
    match err {
        Error::Read { source, .. } => Error::Read { what, source },
        other => other,
    }
}

/// Byte-wise comparison ignoring ASCII case, like `strcasecmp`.
pub fn compare_ignore_case(a: &OsStr, b: &OsStr) -> Ordering {
    a.as_bytes()
        .iter()
        .map(u8::to_ascii_lowercase)
        .cmp(b.as_bytes().iter().map(u8::to_ascii_lowercase))
}

pub fn eq_ignore_case(a: &OsStr, b: &OsStr) -> bool {
    a.as_bytes().eq_ignore_ascii_case(b.as_bytes())
}

/// Write a new version of `path` through a temporary file in the same
/// directory, sync it and rename it into place. On any failure the temporary
/// file is removed and `path` is left as it was.
pub(crate) fn replace_file<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| ".del".into());

    let temp = tempfile::Builder::new()
        .prefix(&prefix)
        .tempfile_in(dir)
        .map_err(|e| Error::persist("create a temporary file for", path, e))?;
    debug!("writing {} via {}", path.display(), temp.path().display());

    let mut out = BufWriter::new(temp);
    fill(&mut out).map_err(|e| Error::persist("write", path, e))?;

    let temp = out
        .into_inner()
        .map_err(|e| Error::persist("flush changes to", path, e.into_error()))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::persist("sync", path, e))?;
    temp.persist(path)
        .map_err(|e| Error::persist("rename temporary file onto", path, e.error))?;

    Ok(())
}
