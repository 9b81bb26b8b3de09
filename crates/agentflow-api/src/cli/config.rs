//! `agentflow config` subcommands.

use anyhow::{Context, Result};
use clap::Subcommand;
use console::style;

use agentflow_infra::config::config_path;
use agentflow_infra::filesystem::workflows_dir;
use agentflow_infra::sqlite::pool::database_url;

use crate::state::AppState;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration (defaults applied).
    Show,

    /// Print the locations agentflow reads from.
    Path,
}

pub fn handle_config_command(cmd: ConfigCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            if json {
                println!("{}", serde_json::to_string_pretty(state.config.as_ref())?);
            } else {
                let text = toml::to_string_pretty(state.config.as_ref())
                    .context("Failed to render configuration")?;
                print!("{text}");
            }
        }
        ConfigCommand::Path => {
            let config = config_path(&state.data_dir);
            let workflows = workflows_dir(&state.data_dir);
            let database = database_url(&state.data_dir);
            if json {
                let out = serde_json::json!({
                    "data_dir": state.data_dir,
                    "config": config,
                    "workflows": workflows,
                    "database": database,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!();
                println!("  Data dir:  {}", style(state.data_dir.display()).cyan());
                println!("  Config:    {}", config.display());
                println!("  Workflows: {}", workflows.display());
                println!("  Database:  {database}");
                println!();
            }
        }
    }
    Ok(())
}
