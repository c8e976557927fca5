use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `attestor` - attestation operator for an on-ledger task log.
#[derive(Parser, Debug)]
#[command(name = "attestor")]
#[command(version = "0.1.0")]
#[command(about = "Watches ledger tasks, classifies them, submits signed responses.", long_about = None)]
pub struct Cli {
    /// Path to attestor.toml (default: ./attestor.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch the task log, respond to tasks, and serve the gateway
    Run {
        /// Use the in-process stub ledger instead of an RPC endpoint
        #[arg(long)]
        offline: bool,

        /// Gateway port override (use 0 for a random available port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Create a task on the ledger and print the confirmation receipt
    CreateTask {
        /// Task contents
        contents: String,

        /// Score difference attached to the task
        #[arg(long, default_value = "0")]
        score_difference: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_parses_with_flags() {
        let cli = Cli::parse_from(["attestor", "run", "--offline", "--port", "0"]);
        match cli.command {
            Commands::Run { offline, port } => {
                assert!(offline);
                assert_eq!(port, Some(0));
            }
            Commands::CreateTask { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn create_task_parses_defaults() {
        let cli = Cli::parse_from(["attestor", "create-task", "hello world"]);
        match cli.command {
            Commands::CreateTask {
                contents,
                score_difference,
            } => {
                assert_eq!(contents, "hello world");
                assert_eq!(score_difference, 0);
            }
            Commands::Run { .. } => panic!("expected create-task"),
        }
    }

    #[test]
    fn global_config_flag_accepted_after_subcommand() {
        let cli = Cli::parse_from(["attestor", "run", "--config", "/tmp/a.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/a.toml")));
    }
}
