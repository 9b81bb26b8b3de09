//! CLI command definitions for the `agentflow` binary.
//!
//! Uses clap derive macros for argument parsing. Commands are grouped by
//! noun (e.g., `agentflow workflow invoke`, `agentflow approvals list`).

pub mod approvals;
pub mod budget;
pub mod config;
pub mod workflow;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use approvals::ApprovalsCommand;
use config::ConfigCommand;
use workflow::WorkflowCommand;

/// Drive agent workflows with durable checkpoints and human approval.
#[derive(Parser)]
#[command(name = "agentflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans with the OpenTelemetry stdout exporter.
    #[arg(long, global = true, env = "AGENTFLOW_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Invoke, run, resume and inspect workflow runs.
    #[command(alias = "wf")]
    Workflow {
        #[command(subcommand)]
        action: WorkflowCommand,
    },

    /// Inspect pending checkpoint approvals.
    Approvals {
        #[command(subcommand)]
        action: ApprovalsCommand,
    },

    /// Show a team's spend against its budget limits.
    Budget {
        /// Team identifier.
        #[arg(long)]
        team: String,
    },

    /// Show the effective configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Default log filter for the given verbosity flags. `RUST_LOG` overrides it.
pub fn log_filter(quiet: bool, verbose: u8) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info,agentflow=debug",
        _ => "trace",
    }
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
    fn test_log_filter() {
        assert_eq!(log_filter(true, 0), "error");
        assert_eq!(log_filter(false, 0), "warn");
        assert_eq!(log_filter(true, 1), "info,agentflow=debug");
        assert_eq!(log_filter(false, 3), "trace");
    }

    #[test]
    fn test_parse_invoke() {
        let cli = Cli::try_parse_from([
            "agentflow",
            "--json",
            "workflow",
            "invoke",
            "pm-copilot",
            "--team",
            "studio",
            "--entity-id",
            "wo-1",
            "--mode",
            "staged",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Workflow {
                action: WorkflowCommand::Invoke(args),
            } => {
                assert_eq!(args.workflow_type, "pm-copilot");
                assert_eq!(args.team, "studio");
                assert_eq!(args.agent, "pm-copilot");
                assert_eq!(args.entity_type, "work_order");
                assert_eq!(args.mode, "staged");
                assert!(!args.no_run);
            }
            _ => panic!("expected workflow invoke"),
        }
    }

    #[test]
    fn test_resume_requires_a_decision() {
        let id = "01890a5d-ac96-774b-bcce-b302099a8057";
        assert!(Cli::try_parse_from(["agentflow", "workflow", "resume", id]).is_err());
        assert!(
            Cli::try_parse_from(["agentflow", "workflow", "resume", id, "--approve", "--reject"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["agentflow", "workflow", "resume", id, "--reject"]).is_ok());
    }
}
