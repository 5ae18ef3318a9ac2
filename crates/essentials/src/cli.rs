//! Command-line interface handling for the essentials host.

use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
///
/// Every option except `--config` overrides a value from the configuration
/// file.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the unit configuration directory
    pub config_dir: Option<PathBuf>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    /// Parses the process arguments. Exits with usage on invalid input.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("essentials.toml")),
            config_dir: matches.get_one::<String>("config-dir").map(PathBuf::from),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

fn command() -> Command {
    Command::new("Essentials")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs the essentials modules and configurations inside a console host")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("essentials.toml"),
        )
        .arg(
            Arg::new("config-dir")
                .short('d')
                .long("config-dir")
                .value_name("DIR")
                .help("Directory the unit configuration files live in"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::from_matches(&command().get_matches_from(args))
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["essentials"]);
        assert_eq!(args.config_path, PathBuf::from("essentials.toml"));
        assert!(args.config_dir.is_none());
        assert!(args.log_level.is_none());
        assert!(!args.json_logs);
    }

    #[test]
    fn test_overrides() {
        let args = parse(&[
            "essentials",
            "-c",
            "lobby.toml",
            "--config-dir",
            "/srv/lobby",
            "--log-level",
            "debug",
            "--json-logs",
        ]);
        assert_eq!(args.config_path, PathBuf::from("lobby.toml"));
        assert_eq!(args.config_dir, Some(PathBuf::from("/srv/lobby")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
    }
}
