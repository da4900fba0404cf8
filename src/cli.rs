//! Command-line parsing. Small enough that a hand-rolled loop does the job.

use crate::logger;

pub const USAGE: &str = "\
Usage: quizroom [OPTIONS]

Options:
  -h, --help                 Print help
  -f, --config <PATH>        Path to configuration file (default: config/default.toml)
      --log-level <LEVEL>    Force a log level (error, warn, info, debug, trace)
  -v, -vv, -vvv              Increase logging verbosity (info, debug, trace)";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: Option<String>,
    /// Level forced from the command line; overrides config and `RUST_LOG`.
    pub log_level: Option<String>,
    pub help: bool,
}

/// Parse arguments (without the program name).
pub fn parse_cli_args<I>(args: I) -> Result<CliArgs, String>
where
    I: IntoIterator<Item = String>,
{
    let mut out = CliArgs::default();
    let mut verbosity = 0u8;
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--" => break,
            "-h" | "--help" => out.help = true,
            "-f" | "--config" => {
                out.config_path = Some(iter.next().ok_or("-f/--config requires a path argument")?);
            }
            "--log-level" => {
                let level = iter.next().ok_or("--log-level requires a value")?;
                logger::parse_level(&level).map_err(|e| e.to_string())?;
                out.log_level = Some(level);
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.len() > 1 && a.starts_with('-') && a[1..].chars().all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            other => return Err(format!("unexpected argument '{other}'")),
        }
    }

    // An explicit --log-level beats -v.
    if out.log_level.is_none() {
        out.log_level = logger::level_from_verbosity(verbosity).map(str::to_string);
    }
    Ok(out)
}
