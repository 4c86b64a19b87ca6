//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// Mosaic - one prompt, many assistants
#[derive(Parser)]
#[command(
    name = "mosaic",
    about = "Broadcast one prompt to many chat assistants and merge their answers",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List known targets and which are active
    Targets,

    /// Validate a prompt and its images without sending anything
    Check {
        /// Prompt text
        #[arg(short, long)]
        prompt: String,

        /// Image file to attach (repeatable)
        #[arg(short, long = "image")]
        images: Vec<PathBuf>,
    },

    /// Extract the latest answer from a saved page
    Extract {
        /// Target whose profile to use
        #[arg(short, long)]
        target: String,

        /// Saved HTML of the target's page
        #[arg(long)]
        html: PathBuf,
    },

    /// Dry-run an injection against a saved page and print every action
    Inject {
        /// Target whose profile to use
        #[arg(short, long)]
        target: String,

        /// Saved HTML of the target's page
        #[arg(long)]
        html: PathBuf,

        /// Prompt text
        #[arg(short, long)]
        prompt: String,

        /// Image file to attach (repeatable)
        #[arg(short, long = "image")]
        images: Vec<PathBuf>,
    },

    /// Print the merge prompt built from saved answers
    Synthesize {
        /// Target that would receive the merge prompt
        #[arg(short, long)]
        target: String,

        /// Answer as ID=FILE (repeatable)
        #[arg(short, long = "answer", value_parser = parse_assignment)]
        answers: Vec<(String, PathBuf)>,
    },

    /// Run a full broadcast and collection against saved pages
    Session {
        /// Prompt text
        #[arg(short, long)]
        prompt: String,

        /// Target page as ID=FILE (repeatable)
        #[arg(long = "page", value_parser = parse_assignment)]
        pages: Vec<(String, PathBuf)>,

        /// Image file to attach (repeatable)
        #[arg(short, long = "image")]
        images: Vec<PathBuf>,

        /// Merge the collected answers through this target
        #[arg(long)]
        synthesize_into: Option<String>,
    },
}

/// Parse `ID=FILE`
pub fn parse_assignment(s: &str) -> Result<(String, PathBuf), String> {
    debug!(%s, "parse_assignment: called");
    match s.split_once('=') {
        Some((id, path)) if !id.is_empty() && !path.is_empty() => Ok((id.to_string(), PathBuf::from(path))),
        _ => Err(format!("expected ID=FILE, got '{}'", s)),
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mosaic")
        .join("logs")
        .join("mosaic.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("claude=answers/claude.html").unwrap(),
            ("claude".to_string(), PathBuf::from("answers/claude.html"))
        );
        assert!(parse_assignment("claude").is_err());
        assert!(parse_assignment("=file").is_err());
    }

    #[test]
    fn test_session_args() {
        let cli = Cli::try_parse_from([
            "mosaic",
            "session",
            "--prompt",
            "hi",
            "--page",
            "claude=c.html",
            "--page",
            "grok=g.html",
            "--synthesize-into",
            "claude",
        ])
        .unwrap();
        match cli.command {
            Command::Session {
                pages, synthesize_into, ..
            } => {
                assert_eq!(pages.len(), 2);
                assert_eq!(synthesize_into.as_deref(), Some("claude"));
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }
}
