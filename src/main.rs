use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{Level, error, info};

use del::config::{load_config, load_config_from};
use del::error::{EXIT_FATAL, EXIT_SUCCESS};
use del::executor::launch_menu;
use del::path_search::PathSearch;
use del::refresh::refresh;

const AFTER_HELP: &str = "\
When \"-r\" is not given, the menu is launched with the command list fed into
standard input. Trailing arguments pass flags to the menu or pick another menu:

    $ del -- -sb \"#ff0000\"
    $ del rofi -dmenu

With \"-r\", trailing arguments are folders to search. The search does not cross
filesystem boundaries, so folders on other devices must be listed explicitly.
Programs piped in on standard input are added too if they exist in $PATH.

Exit statuses:
  1     Fatal error encountered.
  2     Non-fatal error encountered.
  >128  The menu was killed by signal N, where N is the status minus 128.";

#[derive(Parser, Debug)]
#[command(author, version, about = "Launch desktop applications through dmenu", after_help = AFTER_HELP)]
struct Args {
    /// Search for desktop entries and refresh the command list
    #[arg(short, long)]
    refresh: bool,

    /// Command list to use instead of "$HOME/.del"
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    file: Option<PathBuf>,

    /// Configuration file to read instead of the default location
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Folders to search with -r, otherwise the menu and its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGUMENTS")]
    arguments: Vec<String>,
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format(|buf, record| match record.level() {
            Level::Error | Level::Warn => writeln!(buf, "del: {}", record.args()),
            level => writeln!(buf, "del: [{}] {}", level, record.args()),
        })
        .init();
}

fn main() -> ExitCode {
    init_logging();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            if let Err(err) = e.print() {
                error!("could not write usage: {}", err);
            }
            return ExitCode::from(parse_failure_status(&e));
        }
    };

    match run(args) {
        Ok(status) => ExitCode::from(status),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// `-h` and `-V` end the program successfully. Everything else clap rejects
/// is a fatal usage error.
fn parse_failure_status(e: &clap::Error) -> u8 {
    if e.use_stderr() { EXIT_FATAL } else { EXIT_SUCCESS }
}

fn run(args: Args) -> Result<u8> {
    let config = match &args.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let list_path = match args.file {
        Some(path) => path,
        None => config.list_path()?,
    };

    if !args.refresh {
        let menu = config.menu.command_line(&args.arguments);
        info!("launching {:?} over {}", menu, list_path.display());
        return Ok(launch_menu(&list_path, &menu));
    }

    let roots = config.roots(&args.arguments);
    let stdin = io::stdin();
    let mut piped = (!stdin.is_terminal()).then(|| stdin.lock());
    let search = PathSearch::from_env();

    refresh(
        &list_path,
        &roots,
        &search,
        piped.as_mut().map(|lock| lock as &mut dyn BufRead),
    )
    .with_context(|| format!("could not refresh {}", list_path.display()))?;

    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> std::result::Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("del").chain(argv.iter().copied()))
    }

    #[test]
    fn help_and_version_exit_successfully() {
        for flag in ["-h", "--version"] {
            let err = parse(&[flag]).unwrap_err();
            assert_eq!(parse_failure_status(&err), EXIT_SUCCESS);
        }
    }

    #[test]
    fn unknown_option_is_fatal() {
        let err = parse(&["-x"]).unwrap_err();
        assert_eq!(parse_failure_status(&err), EXIT_FATAL);
    }

    #[test]
    fn trailing_arguments_keep_menu_flags() {
        let args = parse(&["-r", "/opt", "/usr/share"]).unwrap();
        assert!(args.refresh);
        assert_eq!(args.arguments, vec!["/opt", "/usr/share"]);

        let args = parse(&["--", "-sb", "#ff0000"]).unwrap();
        assert!(!args.refresh);
        assert_eq!(args.arguments, vec!["-sb", "#ff0000"]);
    }
}
