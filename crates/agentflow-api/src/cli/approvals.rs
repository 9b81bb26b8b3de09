//! CLI approval inbox subcommands.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use agentflow_types::approval::{Confidence, Urgency};

use crate::state::AppState;

#[derive(Subcommand)]
pub enum ApprovalsCommand {
    /// List pending checkpoint approvals, oldest first.
    List {
        /// Only approvals of this team.
        #[arg(long)]
        team: Option<String>,
    },
}

pub async fn handle_approvals_command(
    cmd: ApprovalsCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        ApprovalsCommand::List { team } => handle_list(team.as_deref(), state, json).await,
    }
}

async fn handle_list(team: Option<&str>, state: &AppState, json: bool) -> Result<()> {
    let pending = state.engine.pending_approvals(team).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pending)?);
        return Ok(());
    }

    if pending.is_empty() {
        println!();
        println!("  No pending approvals.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Run").fg(Color::Cyan),
            Cell::new("Workflow"),
            Cell::new("Team"),
            Cell::new("Checkpoint"),
            Cell::new("Urgency"),
            Cell::new("Confidence"),
            Cell::new("Preview"),
            Cell::new("Waiting Since"),
        ]);

    for request in &pending {
        table.add_row(vec![
            Cell::new(&request.approvable.approvable_id),
            Cell::new(&request.workflow_type),
            Cell::new(&request.team_id),
            Cell::new(&request.node_id),
            urgency_cell(request.urgency),
            confidence_cell(request.confidence, request.confidence_score),
            Cell::new(&request.preview),
            Cell::new(request.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  Decide with: {}",
        style("agentflow workflow resume <run> --approve | --reject").dim()
    );
    println!();
    Ok(())
}

fn urgency_cell(urgency: Urgency) -> Cell {
    let cell = Cell::new(urgency.to_string());
    match urgency {
        Urgency::High => cell.fg(Color::Red),
        Urgency::Normal => cell,
        Urgency::Low => cell.fg(Color::DarkGrey),
    }
}

fn confidence_cell(confidence: Confidence, score: f64) -> Cell {
    let cell = Cell::new(format!("{confidence} ({score:.2})"));
    match confidence {
        Confidence::High => cell.fg(Color::Green),
        Confidence::Medium => cell.fg(Color::Yellow),
        Confidence::Low => cell.fg(Color::Red),
    }
}
