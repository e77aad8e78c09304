//! CLI interface for cctdi
//!
//! Command-line surface built with clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CCTDI adaptive critical-thinking assessment
///
/// Interviews a subject across the seven CCTDI dimensions, adapting each
/// question to the previous answer, and scores every dimension from 10 to 60.
#[derive(Parser, Debug)]
#[command(name = "cctdi")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Assess one virtual subject described by a persona file
    Run {
        /// Persona file, e.g. persons/1Zhang.txt
        persona: PathBuf,
    },

    /// Assess yourself: answer the questions at the keyboard
    Interview {
        /// Subject identifier recorded with the results
        subject_id: String,
    },

    /// Assess every persona in a directory concurrently
    Batch {
        /// Persona directory (default: batch.personas_dir)
        #[arg(long, value_name = "DIR")]
        personas: Option<PathBuf>,

        /// Concurrent sessions (default: batch.workers)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Show recent assessments
    History {
        /// Number of sessions to show
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// Show the full transcript and report of a session
    Replay {
        /// Session ID to replay
        session_id: String,
    },

    /// Show LLM provider availability
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Check the configuration file for errors
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["cctdi", "status"]);
        assert!(matches!(cli.command, Command::Status));
        assert!(!cli.json);
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["cctdi", "history", "--json", "--log", "debug"]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));
        assert!(matches!(cli.command, Command::History { limit: 10 }));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["cctdi", "run", "persons/4Chen.txt"]);
        match cli.command {
            Command::Run { persona } => assert_eq!(persona, PathBuf::from("persons/4Chen.txt")),
            other => panic!("Expected run command, got {:?}", other),
        }
    }

    #[test]
    fn test_batch_overrides() {
        let cli = Cli::parse_from(["cctdi", "batch", "--personas", "people", "-w", "8"]);
        match cli.command {
            Command::Batch { personas, workers } => {
                assert_eq!(personas, Some(PathBuf::from("people")));
                assert_eq!(workers, Some(8));
            }
            other => panic!("Expected batch command, got {:?}", other),
        }
    }

    #[test]
    fn test_config_subcommands() {
        let cli = Cli::parse_from(["cctdi", "--config", "/tmp/c.toml", "config", "validate"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Validate
            }
        ));
    }
}
