//! Runs the menu program over the command list and launches what it prints.
//!
//! The menu reads the persisted list directly from a file handle on its
//! standard input and writes one command per line to a pipe. Every complete
//! line is started right away as a background process that is never waited
//! for. Only the menu itself is waited on, and its fate decides the exit
//! status.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, BufRead, BufReader, ErrorKind};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Command, Stdio};

use log::{debug, error, warn};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use crate::error::{EXIT_FATAL, EXIT_NONFATAL, EXIT_SUCCESS, SIGNAL_EXIT_OFFSET};

pub const DEFAULT_MENU_COMMAND: &str = "dmenu";

/// Signal sent to the menu when launching has to be abandoned. Deaths by this
/// signal are expected and not reported.
pub const MENU_KILL_SIGNAL: Signal = Signal::SIGHUP;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl MenuCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

/// Show the menu and run its selections. Returns the process exit status:
/// 0 on success, 1 on a fatal error, 2 on a non-fatal one, the menu's own
/// status if it failed, or 128 plus the signal number if it was killed.
pub fn launch_menu(list_path: &Path, menu: &MenuCommand) -> u8 {
    launch_menu_with(list_path, menu, spawn_detached)
}

/// [`launch_menu`] with the way selections are started supplied by the
/// caller.
pub fn launch_menu_with<F>(list_path: &Path, menu: &MenuCommand, spawn: F) -> u8
where
    F: FnMut(&OsStr) -> io::Result<()>,
{
    let input = match File::open(list_path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            error!("{} missing; was \"del -r\" run?", list_path.display());
            return EXIT_FATAL;
        }
        Err(e) => {
            error!("open: {}: {}", list_path.display(), e);
            return EXIT_FATAL;
        }
    };

    let mut child = match Command::new(&menu.program)
        .args(&menu.args)
        .stdin(Stdio::from(input))
        .stdout(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            error!("{}: {}", menu.program, e);
            return EXIT_FATAL;
        }
    };
    let menu_pid = Pid::from_raw(child.id() as i32);
    debug!("started {} as {}", menu.program, menu_pid);

    let mut failure = match child.stdout.take() {
        Some(output) => stream_selections(BufReader::new(output), &menu.program, spawn),
        None => {
            error!("could not read {} output", menu.program);
            EXIT_FATAL
        }
    };

    let mut kill_signal = None;
    if failure == EXIT_FATAL {
        match kill(menu_pid, MENU_KILL_SIGNAL) {
            Ok(()) => kill_signal = Some(MENU_KILL_SIGNAL as i32),
            Err(e) => warn!("could not stop {}: {}", menu.program, e),
        }
    }

    match child.wait() {
        Err(e) => {
            error!("error waiting on {}: {}", menu.program, e);
            if failure == EXIT_SUCCESS {
                failure = EXIT_NONFATAL;
            }
        }
        Ok(status) => {
            if let Some(code) = status.code() {
                if failure == EXIT_SUCCESS && code != 0 {
                    error!("{} died with exit status {}", menu.program, code);
                    failure = code as u8;
                }
            } else if let Some(signal) = status.signal() {
                if Some(signal) != kill_signal {
                    error!("{} received signal {}", menu.program, signal);
                    if failure == EXIT_SUCCESS {
                        failure = (i32::from(SIGNAL_EXIT_OFFSET) + signal) as u8;
                    }
                }
            }
        }
    }

    failure
}

/// Read selections from the menu and hand each complete line to `spawn`.
///
/// Lines are passed on byte for byte. A final line without a newline means
/// the menu died mid-write; it is reported and not run. Returns
/// [`EXIT_FATAL`] if reading or spawning failed in a way that should stop the
/// menu, otherwise [`EXIT_SUCCESS`].
pub fn stream_selections<R, F>(mut output: R, menu_name: &str, mut spawn: F) -> u8
where
    R: BufRead,
    F: FnMut(&OsStr) -> io::Result<()>,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match output.read_until(b'\n', &mut buf) {
            Ok(0) => return EXIT_SUCCESS,
            Ok(_) => {}
            Err(e) => {
                error!("could not read {} output: {}", menu_name, e);
                return EXIT_FATAL;
            }
        }

        let Some(line) = buf.strip_suffix(b"\n") else {
            warn!("missing newline after '{}'", String::from_utf8_lossy(&buf));
            continue;
        };
        let command = OsStr::from_bytes(line);

        if let Err(e) = spawn(command) {
            if is_resource_exhaustion(&e) {
                error!("could not fork to execute command: {}", e);
                return EXIT_FATAL;
            }
            error!("{}: {}", command.to_string_lossy(), e);
        }
    }
}

/// Start `command` with no arguments and leave it running.
fn spawn_detached(command: &OsStr) -> io::Result<()> {
    let child = Command::new(command).spawn()?;
    debug!("launched {:?} as {}", command, child.id());
    Ok(())
}

/// Failures to create a process at all, as opposed to failures to run the
/// chosen program.
fn is_resource_exhaustion(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(code) if code == Errno::EAGAIN as i32 || code == Errno::ENOMEM as i32
    ) || err.kind() == ErrorKind::OutOfMemory
}
