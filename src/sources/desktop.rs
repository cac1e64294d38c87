use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use log::{debug, info};
use nix::sys::resource::{Resource, getrlimit};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::list::CommandList;
use crate::path_search::PathSearch;
use crate::sources::Source;

pub const DESKTOP_EXTENSION: &str = ".desktop";

/// Longest `Exec` token kept; anything beyond is cut off.
pub const MAX_EXEC_TOKEN: usize = 4095;

/// Descriptors kept free while walking: stdin, stdout, stderr and the entry
/// file being parsed.
const RESERVED_DESCRIPTORS: u64 = 4;

/// Walks a directory tree without crossing mount points and adds the command
/// of every launchable desktop entry found in it.
pub struct DesktopSource {
    pub root: PathBuf,
    pub search: PathSearch,
}

impl Source for DesktopSource {
    fn scan(&self, list: &mut CommandList) -> Result<()> {
        debug!("Scanning desktop files in {:?}", self.root);
        let before = list.len();

        let walker = WalkDir::new(&self.root)
            .same_file_system(true)
            .follow_links(true)
            .max_open(max_open_dirs());

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) if source.depth() == 0 => {
                    return Err(Error::Walk {
                        root: self.root.clone(),
                        source,
                    });
                }
                Err(e) => {
                    debug!("skipping: {}", e);
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }
            self.visit(entry.path(), list)?;
        }

        info!(
            "DesktopSource: {} new commands under {:?}",
            list.len() - before,
            self.root
        );
        Ok(())
    }
}

impl DesktopSource {
    pub fn new(root: impl Into<PathBuf>, search: PathSearch) -> Self {
        Self {
            root: root.into(),
            search,
        }
    }

    /// Parse one file and add its command if it is new and installed. Only
    /// running out of memory is an error; unreadable files are skipped.
    pub fn visit(&self, path: &Path, list: &mut CommandList) -> Result<()> {
        if !is_desktop_file(path) {
            return Ok(());
        }
        let Ok(file) = File::open(path) else {
            return Ok(());
        };
        let Some(command) = parse_desktop_entry(BufReader::new(file)) else {
            return Ok(());
        };
        if list.contains(&command) {
            return Ok(());
        }

        // Lower case names are preferred, the original spelling is the
        // fallback.
        let lowercase = command.to_ascii_lowercase();
        let chosen = if self.search.can_resolve(&lowercase) {
            lowercase
        } else if lowercase != command && self.search.can_resolve(&command) {
            command
        } else {
            debug!("{}: {:?} is not installed", path.display(), command);
            return Ok(());
        };

        println!("+ {} ({})", chosen.to_string_lossy(), path.display());
        list.add(&chosen)
    }
}

pub fn is_desktop_file(path: &Path) -> bool {
    path.as_os_str()
        .as_bytes()
        .ends_with(DESKTOP_EXTENSION.as_bytes())
}

/// Extract the command name from a desktop entry.
///
/// Returns `None` when the entry is hidden (`NoDisplay`), runs in a terminal
/// (`Terminal`) or has no usable `Exec` line. Wrappers using `env` yield the
/// first word after it that is neither an assignment nor an option. Names are
/// returned exactly as the bytes in the file.
pub fn parse_desktop_entry<R: BufRead>(mut reader: R) -> Option<OsString> {
    let mut inside_entry = false;
    let mut command: Option<OsString> = None;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = trim_line_end(&buf);

        if !inside_entry {
            inside_entry = line.eq_ignore_ascii_case(b"[Desktop Entry]");
            continue;
        }
        if line.starts_with(b"[") {
            break;
        }

        if let Some(value) = field(line, b"NoDisplay").or_else(|| field(line, b"Terminal")) {
            if value.eq_ignore_ascii_case(b"true") {
                return None;
            }
        } else if let Some(exec) = field_rest(line, b"Exec") {
            command = exec_command(exec);
        }
    }

    command.filter(|c| !c.is_empty())
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &line[..end]
}

/// Value after `key = `, with the key anchored at the start of the line.
fn field_rest<'a>(line: &'a [u8], key: &[u8]) -> Option<&'a [u8]> {
    let rest = line.strip_prefix(key)?.trim_ascii_start().strip_prefix(b"=")?;
    let rest = rest.trim_ascii_start();
    (!rest.is_empty()).then_some(rest)
}

/// First word of the value after `key = `.
fn field<'a>(line: &'a [u8], key: &[u8]) -> Option<&'a [u8]> {
    split_words(field_rest(line, key)?).next()
}

fn split_words(value: &[u8]) -> impl Iterator<Item = &[u8]> {
    value
        .split(|b| b.is_ascii_whitespace())
        .filter(|w| !w.is_empty())
}

fn exec_command(exec: &[u8]) -> Option<OsString> {
    let mut words = split_words(exec).map(truncate_token);
    let program = basename(words.next()?);

    if program != b"env" {
        return Some(OsStr::from_bytes(program).to_os_string());
    }

    words
        .find(|w| !w.starts_with(b"-") && !w[1..].contains(&b'='))
        .map(|w| OsStr::from_bytes(basename(w)).to_os_string())
}

fn truncate_token(word: &[u8]) -> &[u8] {
    &word[..word.len().min(MAX_EXEC_TOKEN)]
}

fn basename(word: &[u8]) -> &[u8] {
    Path::new(OsStr::from_bytes(word))
        .file_name()
        .map(OsStrExt::as_bytes)
        .unwrap_or_default()
}

/// Directory handles the walker may hold open at once.
fn max_open_dirs() -> usize {
    let limit = getrlimit(Resource::RLIMIT_NOFILE)
        .map(|(soft, _)| soft)
        .unwrap_or(20)
        .min(i32::MAX as u64);
    limit.saturating_sub(RESERVED_DESCRIPTORS).max(1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn parse(content: &str) -> Option<String> {
        parse_desktop_entry(Cursor::new(content)).map(|c| c.to_string_lossy().into_owned())
    }

    fn names(list: &CommandList) -> Vec<String> {
        list.iter().map(|c| c.to_string_lossy().into_owned()).collect()
    }

    fn bin_with(names: &[&str]) -> (TempDir, PathSearch) {
        let dir = TempDir::new().unwrap();
        for name in names {
            let path = dir.path().join(name);
            fs::write(&path, "#!/bin/sh\n").unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        let search = PathSearch::new(Some(dir.path().as_os_str()));
        (dir, search)
    }

    #[test]
    fn exec_basename_is_the_command() {
        let entry = "[Desktop Entry]\nName=Foo\nExec=/usr/bin/foo %U\n";
        assert_eq!(parse(entry), Some("foo".to_string()));
    }

    #[test]
    fn spaces_around_equals_are_accepted() {
        let entry = "[Desktop Entry]\nExec = gimp-2.10 %F\n";
        assert_eq!(parse(entry), Some("gimp-2.10".to_string()));
    }

    #[test]
    fn terminal_entries_are_skipped() {
        let entry = "[Desktop Entry]\nExec=htop\nTerminal = true\n";
        assert_eq!(parse(entry), None);
    }

    #[test]
    fn hidden_entries_are_skipped_case_insensitively() {
        let entry = "[Desktop Entry]\nNoDisplay=TRUE\nExec=foo\n";
        assert_eq!(parse(entry), None);
    }

    #[test]
    fn false_flags_do_not_disqualify() {
        let entry = "[Desktop Entry]\nNoDisplay=false\nTerminal=false\nExec=foo\n";
        assert_eq!(parse(entry), Some("foo".to_string()));
    }

    #[test]
    fn env_wrapper_is_looked_through() {
        let entry = "[Desktop Entry]\nExec = env FOO=bar myapp --flag\n";
        assert_eq!(parse(entry), Some("myapp".to_string()));

        let entry = "[Desktop Entry]\nExec=/usr/bin/env -i A=1 B=2 /opt/app/bin/tool\n";
        assert_eq!(parse(entry), Some("tool".to_string()));
    }

    #[test]
    fn env_without_command_is_empty() {
        let entry = "[Desktop Entry]\nExec=env FOO=bar -u\n";
        assert_eq!(parse(entry), None);
    }

    #[test]
    fn fields_outside_entry_section_are_ignored() {
        let entry = "Exec=before\n[Desktop Action new]\nExec=action\n";
        assert_eq!(parse(entry), None);

        let entry = "[desktop entry]\nExec=main\n[Desktop Action new]\nExec=other\nTerminal=true\n";
        assert_eq!(parse(entry), Some("main".to_string()));
    }

    #[test]
    fn overlong_exec_is_truncated() {
        let long = "a".repeat(MAX_EXEC_TOKEN + 10);
        let entry = format!("[Desktop Entry]\nExec={long}\n");
        assert_eq!(parse(&entry).map(|c| c.len()), Some(MAX_EXEC_TOKEN));
    }

    #[test]
    fn non_utf8_exec_is_kept_verbatim() {
        let entry = b"[Desktop Entry]\nExec=/opt/caf\xe9 --new\n".to_vec();
        assert_eq!(
            parse_desktop_entry(Cursor::new(entry)),
            Some(OsStr::from_bytes(b"caf\xe9").to_os_string())
        );
    }

    #[test]
    fn only_desktop_files_are_considered() {
        assert!(is_desktop_file(Path::new("/usr/share/applications/foo.desktop")));
        assert!(!is_desktop_file(Path::new("/usr/share/applications/foo.desktop.bak")));
        assert!(!is_desktop_file(Path::new("desktop")));
    }

    #[test]
    fn lowercase_name_is_preferred() {
        let (_bin, search) = bin_with(&["foo", "Foo"]);
        let apps = TempDir::new().unwrap();
        let path = apps.path().join("foo.desktop");
        fs::write(&path, "[Desktop Entry]\nExec=Foo\n").unwrap();

        let mut list = CommandList::new();
        DesktopSource::new(apps.path(), search).visit(&path, &mut list).unwrap();

        assert_eq!(names(&list), vec!["foo"]);
    }

    #[test]
    fn original_case_is_the_fallback() {
        let (_bin, search) = bin_with(&["Foo"]);
        let apps = TempDir::new().unwrap();
        let path = apps.path().join("foo.desktop");
        fs::write(&path, "[Desktop Entry]\nExec=Foo\n").unwrap();

        let mut list = CommandList::new();
        DesktopSource::new(apps.path(), search).visit(&path, &mut list).unwrap();

        assert_eq!(names(&list), vec!["Foo"]);
    }

    #[test]
    fn uninstalled_programs_are_dropped() {
        let (_bin, search) = bin_with(&[]);
        let apps = TempDir::new().unwrap();
        let path = apps.path().join("foo.desktop");
        fs::write(&path, "[Desktop Entry]\nExec=foo\n").unwrap();

        let mut list = CommandList::new();
        DesktopSource::new(apps.path(), search).visit(&path, &mut list).unwrap();

        assert!(list.is_empty());
    }

    #[test]
    fn scan_walks_nested_directories() {
        let (_bin, search) = bin_with(&["foo", "bar"]);
        let apps = TempDir::new().unwrap();
        let nested = apps.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(apps.path().join("foo.desktop"), "[Desktop Entry]\nExec=foo\n").unwrap();
        fs::write(nested.join("bar.desktop"), "[Desktop Entry]\nExec=/usr/bin/bar\n").unwrap();
        fs::write(nested.join("bar.txt"), "[Desktop Entry]\nExec=foo\n").unwrap();

        let mut list = CommandList::new();
        DesktopSource::new(apps.path(), search).scan(&mut list).unwrap();
        list.sort();

        assert_eq!(names(&list), vec!["bar", "foo"]);
    }

    #[test]
    fn missing_root_is_a_walk_error() {
        let apps = TempDir::new().unwrap();
        let source = DesktopSource::new(apps.path().join("absent"), PathSearch::default());

        let err = source.scan(&mut CommandList::new()).unwrap_err();

        assert!(matches!(err, Error::Walk { .. }));
    }
}
