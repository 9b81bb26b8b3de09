//! agentflow CLI entry point.
//!
//! Binary name: `agentflow`
//!
//! Parses CLI arguments, initializes tracing, the database and the workflow
//! engine, then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use agentflow_observe::tracing_setup::{init_tracing, shutdown_tracing};
use cli::{Cli, Commands, log_filter};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(log_filter(cli.quiet, cli.verbose), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "agentflow", &mut std::io::stdout());
        return Ok(());
    }

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init().await?;

    match cli.command {
        Commands::Workflow { action } => {
            cli::workflow::handle_workflow_command(action, &state, cli.json).await
        }
        Commands::Approvals { action } => {
            cli::approvals::handle_approvals_command(action, &state, cli.json).await
        }
        Commands::Budget { team } => cli::budget::handle_budget(&team, &state, cli.json).await,
        Commands::Config { action } => cli::config::handle_config_command(action, &state, cli.json),
        Commands::Completions { .. } => Ok(()),
    }
}
