//! Application orchestration and command routing.
//!
//! Parses the command line and delegates to the command handlers.

use crate::commands;
use crate::logging;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::process;

/// Terminal voice-over recorder with script-aligned takes
#[derive(Parser)]
#[command(name = "taketrack")]
#[command(version)]
#[command(about = "Terminal voice-over recorder with script-aligned takes")]
#[command(long_about = "Terminal voice-over recorder with script-aligned takes.\n\nRecords one continuous audio stream while you step through a Markdown script,\nmarking takes against each chunk. Sessions are saved as audio.wav, metadata.json\nand takes.csv under a numbered directory.\n\nDEFAULT COMMAND:\n    If no command is specified, 'record' is used by default.\n\nEXAMPLES:\n    # Record against a script\n    $ taketrack --script episode.md\n    $ taketrack record --script episode.md\n\n    # Find the device to put in the config file\n    $ taketrack list-devices")]
#[command(
    after_help = "CONFIGURATION:\n    Config file:        ~/.config/taketrack/taketrack.toml\n    Logs:               ~/.local/state/taketrack/taketrack.log.*"
)]
struct Cli {
    /// Markdown script to record against (record default command)
    #[arg(short, long, value_name = "FILE")]
    script: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a session against a script (default)
    ///
    /// Space starts and ends takes, g/b mark them, s records a sync take,
    /// r ends and saves the session, q quits.
    #[command(visible_alias = "r")]
    Record {
        /// Markdown script to record against
        #[arg(short, long, value_name = "FILE")]
        script: Option<PathBuf>,
    },

    /// List available audio capture and playback devices
    ///
    /// Shows device IDs, names, and configurations to help configure
    /// `device` and `output_device` in taketrack.toml.
    #[command(name = "list-devices")]
    ListDevices,

    /// Show recent log entries from the application
    ///
    /// Display the last 50 lines of the most recent log file.
    Logs,

    /// Generate shell completion script
    ///
    /// Examples:
    ///   taketrack completions bash > taketrack.bash
    ///   taketrack completions zsh > _taketrack
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Runs the application based on command-line arguments.
///
/// # Exit Codes
/// - 0: Success
/// - 1: General error
/// - 2: Usage error (invalid arguments)
///
/// # Errors
/// - If logging initialization fails
/// - If command execution fails
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that need neither logging nor config
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            generate(*shell, &mut Cli::command(), "taketrack", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::ListDevices) => {
            if let Err(e) = commands::handle_list_devices() {
                eprintln!("Error: {e}");
                process::exit(1);
            }
            return Ok(());
        }
        Some(Commands::Logs) => {
            if let Err(e) = commands::handle_logs() {
                eprintln!("Error: {e}");
                process::exit(1);
            }
            return Ok(());
        }
        _ => {}
    }

    logging::init_logging()?;

    let script = match cli.command {
        Some(Commands::Record { script }) => script.or(cli.script),
        _ => cli.script,
    };
    let Some(script) = script else {
        let mut cmd = Cli::command();
        cmd.error(
            clap::error::ErrorKind::MissingRequiredArgument,
            "a script is required: taketrack --script <FILE>",
        )
        .exit();
    };

    commands::handle_record(&script).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_script_accepted_without_subcommand() {
        let cli = Cli::try_parse_from(["taketrack", "--script", "episode.md"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.script, Some(PathBuf::from("episode.md")));
    }

    #[test]
    fn test_record_subcommand_takes_script() {
        let cli = Cli::try_parse_from(["taketrack", "record", "-s", "a.md"]).unwrap();
        match cli.command {
            Some(Commands::Record { script }) => assert_eq!(script, Some(PathBuf::from("a.md"))),
            _ => panic!("expected record"),
        }
    }
}
