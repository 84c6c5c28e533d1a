//! Command-line interface for ghostblock.
//!
//! This module provides the CLI structure for the `ghostblock` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    CheckCommand, ConfigCommand, RecordCommand, RegionsCommand, SettingsCommand, StatusCommand,
};

/// ghostblock - Suppress ghost touches on a damaged touchscreen
///
/// Record the spots where phantom touches appear, then filter a stream of
/// touch events so those spots are ignored.
#[derive(Debug, Parser)]
#[command(name = "ghostblock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show filter, session and region status
    Status(StatusCommand),

    /// Inspect or edit blocked regions
    #[command(subcommand)]
    Regions(RegionsCommand),

    /// Show what would happen to a touch at X Y
    Check(CheckCommand),

    /// Record ghost touches from stdin and block them
    Record(RecordCommand),

    /// Read touches from stdin and print the ones that get through
    Filter,

    /// View or change persisted settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn cli_with(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Status(StatusCommand { json: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "ghostblock");
    }

    #[test]
    fn test_verbosity_levels() {
        use crate::logging::Verbosity;
        assert_eq!(cli_with(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli_with(3, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli_with(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(cli_with(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(cli_with(2, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_status_json() {
        let cli = Cli::try_parse_from(["ghostblock", "status", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Status(StatusCommand { json: true })
        ));
    }

    #[test]
    fn test_parse_regions_add() {
        let cli =
            Cli::try_parse_from(["ghostblock", "regions", "add", "120", "340.5", "-r", "25"])
                .unwrap();
        match cli.command {
            Command::Regions(RegionsCommand::Add { x, y, radius }) => {
                assert_eq!(x, 120.0);
                assert_eq!(y, 340.5);
                assert_eq!(radius, Some(25.0));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_regions_clear_requires_nothing() {
        let cli = Cli::try_parse_from(["ghostblock", "regions", "clear"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Regions(RegionsCommand::Clear { yes: false })
        ));
    }

    #[test]
    fn test_parse_check() {
        let cli = Cli::try_parse_from(["ghostblock", "check", "5", "6"]).unwrap();
        assert!(matches!(cli.command, Command::Check(_)));
    }

    #[test]
    fn test_parse_record_duration() {
        let cli = Cli::try_parse_from(["ghostblock", "record", "--duration", "120"]).unwrap();
        match cli.command {
            Command::Record(cmd) => assert_eq!(cmd.duration, Some(120)),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_filter() {
        let cli = Cli::try_parse_from(["ghostblock", "filter"]).unwrap();
        assert!(matches!(cli.command, Command::Filter));
    }

    #[test]
    fn test_parse_settings() {
        let cli = Cli::try_parse_from(["ghostblock", "settings", "radius", "80"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Settings(SettingsCommand::Radius { pixels: 80 })
        ));

        let cli = Cli::try_parse_from(["ghostblock", "settings", "disable"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Settings(SettingsCommand::Disable)
        ));
    }

    #[test]
    fn test_parse_rejects_negative_index() {
        assert!(Cli::try_parse_from(["ghostblock", "regions", "remove", "-1"]).is_err());
    }

    #[test]
    fn test_parse_with_config() {
        let cli = Cli::try_parse_from(["ghostblock", "-c", "/custom/config.toml", "status"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_with_verbose() {
        let cli = Cli::try_parse_from(["ghostblock", "-v", "filter"]).unwrap();
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_parse_with_quiet() {
        let cli = Cli::try_parse_from(["ghostblock", "-q", "status"]).unwrap();
        assert!(cli.quiet);
    }
}
