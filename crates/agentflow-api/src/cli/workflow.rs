//! CLI workflow subcommands.
//!
//! Provides list, show, invoke, run, resume, status and stale operations
//! over workflow definitions and runs.

use std::future::Future;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Duration, Utc};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::{Value, json};
use tracing::Instrument;
use tracing::field::{Empty, display};
use uuid::Uuid;

use agentflow_core::workflow::definition::serialize_workflow_yaml;
use agentflow_core::workflow::engine::{EngineError, InvokeRequest};
use agentflow_observe::workflow_attrs::{WORKFLOW_STATE_ID, WORKFLOW_STATUS};
use agentflow_types::approval::ApprovalPayload;
use agentflow_types::workflow::{ExecutionMode, TriggerEntity, WorkflowState, WorkflowStatus};

use crate::state::AppState;

/// Workflow subcommands.
#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// List available workflow definitions.
    List,

    /// Show the nodes of a workflow definition.
    Show {
        /// Workflow name.
        name: String,

        /// Print the definition as YAML.
        #[arg(long)]
        yaml: bool,
    },

    /// Start a new run and drive it until it pauses or finishes.
    Invoke(InvokeArgs),

    /// Continue a Running run (e.g. after a crash).
    Run {
        /// Workflow state UUID.
        state_id: String,
    },

    /// Apply an approval decision to a paused run.
    Resume(ResumeArgs),

    /// Show one run, or list recent runs.
    Status {
        /// Workflow state UUID (omit to list).
        state_id: Option<String>,

        /// Only runs with this status (running, paused, completed, failed).
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of runs to display.
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// List runs paused longer than a threshold.
    Stale {
        /// Minimum pause age in hours.
        #[arg(long, default_value = "24")]
        older_than_hours: u32,

        /// Only runs paused for this reason.
        #[arg(long)]
        reason: Option<String>,

        /// Only runs of this team.
        #[arg(long)]
        team: Option<String>,
    },
}

#[derive(Args)]
pub struct InvokeArgs {
    /// Workflow name (e.g. pm-copilot).
    pub workflow_type: String,

    /// Team the run belongs to.
    #[arg(long)]
    pub team: String,

    /// Agent configuration to run under.
    #[arg(long, default_value = "pm-copilot")]
    pub agent: String,

    /// Type of the triggering entity.
    #[arg(long, default_value = "work_order")]
    pub entity_type: String,

    /// Identifier of the triggering entity.
    #[arg(long)]
    pub entity_id: String,

    /// Trigger payload as a JSON object.
    #[arg(long)]
    pub payload: Option<String>,

    /// Checkpoint behavior.
    #[arg(long, default_value = "staged", value_parser = ["full", "staged"])]
    pub mode: String,

    /// Persist the run without executing it.
    #[arg(long)]
    pub no_run: bool,
}

#[derive(Args)]
pub struct ResumeArgs {
    /// Workflow state UUID.
    pub state_id: String,

    /// Approve the pending checkpoint.
    #[arg(long, conflicts_with = "reject", required_unless_present = "reject")]
    pub approve: bool,

    /// Reject the pending checkpoint.
    #[arg(long)]
    pub reject: bool,

    /// Who made the decision.
    #[arg(long, env = "AGENTFLOW_APPROVER", default_value = "cli")]
    pub approver: String,

    /// Accepted subset of proposed items, as a JSON array.
    #[arg(long)]
    pub items: Option<String>,

    /// Record the decision without continuing the run.
    #[arg(long)]
    pub no_run: bool,
}

/// Handle a workflow subcommand.
pub async fn handle_workflow_command(
    cmd: WorkflowCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        WorkflowCommand::List => handle_list(state, json),
        WorkflowCommand::Show { name, yaml } => handle_show(&name, yaml, state, json),
        WorkflowCommand::Invoke(args) => handle_invoke(args, state, json).await,
        WorkflowCommand::Run { state_id } => handle_run(&state_id, state, json).await,
        WorkflowCommand::Resume(args) => handle_resume(args, state, json).await,
        WorkflowCommand::Status {
            state_id: Some(id),
            ..
        } => handle_show_run(&id, state, json).await,
        WorkflowCommand::Status {
            state_id: None,
            status,
            limit,
        } => handle_status_list(status.as_deref(), limit, state, json).await,
        WorkflowCommand::Stale {
            older_than_hours,
            reason,
            team,
        } => handle_stale(older_than_hours, reason, team, state, json).await,
    }
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

fn handle_list(state: &AppState, json: bool) -> Result<()> {
    let catalog = state.engine.catalog();

    if json {
        let out: Vec<_> = catalog
            .iter()
            .map(|d| {
                json!({
                    "name": d.name(),
                    "description": d.description(),
                    "start": d.start(),
                    "nodes": d.spec().nodes.len(),
                    "checkpoints": d.checkpoints().map(|n| n.id.as_str()).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Nodes"),
            Cell::new("Checkpoints"),
            Cell::new("Description"),
        ]);

    for d in catalog.iter() {
        let checkpoints: Vec<&str> = d.checkpoints().map(|n| n.id.as_str()).collect();
        table.add_row(vec![
            Cell::new(d.name()),
            Cell::new(d.spec().nodes.len()),
            Cell::new(checkpoints.join(", ")),
            Cell::new(d.description().unwrap_or("")),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn handle_show(name: &str, yaml: bool, state: &AppState, json: bool) -> Result<()> {
    let definition = state
        .engine
        .catalog()
        .get(name)
        .ok_or_else(|| anyhow!("Workflow '{name}' not found"))?;
    let spec = definition.spec();

    if json {
        println!("{}", serde_json::to_string_pretty(spec)?);
        return Ok(());
    }
    if yaml {
        print!("{}", serialize_workflow_yaml(spec)?);
        return Ok(());
    }

    println!();
    println!("  {} {}", style("Workflow").bold(), style(&spec.name).cyan());
    if let Some(description) = &spec.description {
        println!("  {}", style(description).dim());
    }
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Node").fg(Color::Cyan),
            Cell::new("Handler"),
            Cell::new("Checkpoint"),
            Cell::new("Transitions"),
            Cell::new("Cost"),
        ]);

    for node in &spec.nodes {
        let mut transitions: Vec<String> = node
            .branches
            .iter()
            .map(|b| format!("{} -> {}", b.when, b.goto))
            .collect();
        if let Some(target) = node.otherwise.as_ref().or(node.next.as_ref()) {
            transitions.push(format!("-> {target}"));
        }
        if let Some(target) = &node.on_reject {
            transitions.push(format!("rejected -> {target}"));
        }
        let start = if node.id == spec.start { " (start)" } else { "" };

        table.add_row(vec![
            Cell::new(format!("{}{start}", node.id)),
            Cell::new(&node.handler),
            Cell::new(if node.checkpoint { "yes" } else { "" }),
            Cell::new(transitions.join("\n")),
            Cell::new(format!("${:.2}", node.estimated_cost)),
        ]);
    }

    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Invoke / Run / Resume
// ---------------------------------------------------------------------------

async fn handle_invoke(args: InvokeArgs, state: &AppState, json: bool) -> Result<()> {
    let agent = state.agent(&args.agent)?;
    let mode: ExecutionMode = args.mode.parse().map_err(anyhow::Error::msg)?;
    let payload = parse_payload(args.payload.as_deref())?;

    let request = InvokeRequest {
        workflow_type: args.workflow_type,
        team_id: args.team,
        trigger: TriggerEntity {
            entity_type: args.entity_type,
            entity_id: args.entity_id,
            payload,
        },
        mode,
    };

    let run = if args.no_run {
        traced("invoke", state.engine.invoke(request, agent)).await?
    } else {
        let scope = state.scope(&request.team_id, &agent.name)?;
        traced("invoke", state.engine.invoke_and_run(request, agent, &scope)).await?
    };

    print_run(&run, "Invoked", json)
}

async fn handle_run(state_id: &str, state: &AppState, json: bool) -> Result<()> {
    let id = parse_state_id(state_id)?;
    let current = state.engine.get(id).await?;
    if current.status != WorkflowStatus::Running {
        bail!(
            "Run {} is {}, only running runs can be continued",
            current.id,
            current.status
        );
    }

    let scope = state.scope(&current.team_id, &current.agent_name)?;
    let run = traced("run", state.engine.run(current, &scope)).await?;
    print_run(&run, "Ran", json)
}

async fn handle_resume(args: ResumeArgs, state: &AppState, json: bool) -> Result<()> {
    let id = parse_state_id(&args.state_id)?;
    let mut payload = if args.approve {
        ApprovalPayload::approve(args.approver)
    } else {
        ApprovalPayload::reject(args.approver)
    };
    if let Some(raw) = &args.items {
        payload = payload.with_items(parse_items(raw)?);
    }

    let current = state.engine.get(id).await?;
    let scope = state.scope(&current.team_id, &current.agent_name)?;
    let run = if args.no_run {
        scope.authorize(&current)?;
        traced("resume", state.engine.resume(id, &payload)).await?
    } else {
        traced("resume", state.engine.resume_and_run(id, &payload, &scope)).await?
    };

    let verb = if payload.approved { "Approved" } else { "Rejected" };
    print_run(&run, verb, json)
}

// ---------------------------------------------------------------------------
// Status / Stale
// ---------------------------------------------------------------------------

async fn handle_show_run(state_id: &str, state: &AppState, json: bool) -> Result<()> {
    let run = state.engine.get(parse_state_id(state_id)?).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
        return Ok(());
    }

    println!();
    print_run_details(&run);
    let results = &run.state_data.results;
    if !results.is_empty() {
        println!(
            "  Results: {}",
            results.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
        );
    }
    let chain = &run.state_data.chain;
    if !chain.is_empty() {
        println!("  Chain:   {} step(s)", chain.step_outputs().len());
    }
    println!();
    Ok(())
}

async fn handle_status_list(
    status: Option<&str>,
    limit: u32,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let status = status
        .map(str::parse::<WorkflowStatus>)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let runs = state.engine.list(status, i64::from(limit)).await?;

    if json {
        let out: Vec<_> = runs.iter().map(run_summary).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!();
        println!("  No workflow runs found.");
        println!(
            "  Start one with: {}",
            style("agentflow workflow invoke <workflow> --team <team> --entity-id <id>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = runs_table(&["Node", "Updated"]);
    for run in &runs {
        table.add_row(vec![
            Cell::new(short_id(&run.id)),
            Cell::new(&run.workflow_type),
            Cell::new(&run.team_id),
            status_cell(run.status),
            Cell::new(&run.current_node),
            Cell::new(run.updated_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn handle_stale(
    older_than_hours: u32,
    reason: Option<String>,
    team: Option<String>,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let runs = state
        .engine
        .list_stale_paused(Duration::hours(i64::from(older_than_hours)), reason, team)
        .await?;

    if json {
        let out: Vec<_> = runs.iter().map(run_summary).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!();
        println!("  No runs paused longer than {older_than_hours}h.");
        println!();
        return Ok(());
    }

    let now = Utc::now();
    let mut table = runs_table(&["Paused At", "Waiting", "Reason"]);
    for run in &runs {
        let waiting = run
            .paused_for(now)
            .map(|d| format!("{}h", d.num_hours()))
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(short_id(&run.id)),
            Cell::new(&run.workflow_type),
            Cell::new(&run.team_id),
            status_cell(run.status),
            Cell::new(
                run.paused_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default(),
            ),
            Cell::new(waiting),
            Cell::new(run.state_data.pause_reason.as_deref().unwrap_or("")),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run a state-changing engine call inside a `cli.workflow` span and record
/// which run it touched and where that run ended up.
async fn traced<F>(command: &'static str, call: F) -> Result<WorkflowState>
where
    F: Future<Output = Result<WorkflowState, EngineError>>,
{
    let span = tracing::info_span!(
        "cli.workflow",
        command,
        workflow.state_id = Empty,
        workflow.status = Empty,
    );
    let run = call.instrument(span.clone()).await?;
    span.record(WORKFLOW_STATE_ID, display(run.id));
    span.record(WORKFLOW_STATUS, run.status.as_str());
    Ok(run)
}

fn parse_state_id(raw: &str) -> Result<Uuid> {
    raw.parse::<Uuid>()
        .with_context(|| format!("Invalid workflow state id '{raw}'"))
}

/// Trigger payload; must be a JSON object when given.
fn parse_payload(raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(json!({}));
    };
    let value: Value = serde_json::from_str(raw).context("Invalid JSON payload")?;
    if !value.is_object() {
        bail!("Payload must be a JSON object");
    }
    Ok(value)
}

fn parse_items(raw: &str) -> Result<Vec<Value>> {
    match serde_json::from_str(raw).context("Invalid JSON items")? {
        Value::Array(items) => Ok(items),
        _ => bail!("Items must be a JSON array"),
    }
}

fn short_id(id: &Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

fn status_cell(status: WorkflowStatus) -> Cell {
    let color = match status {
        WorkflowStatus::Running => Color::Blue,
        WorkflowStatus::Paused => Color::Yellow,
        WorkflowStatus::Completed => Color::Green,
        WorkflowStatus::Failed => Color::Red,
    };
    Cell::new(status.as_str()).fg(color)
}

fn styled_status(status: WorkflowStatus) -> String {
    let text = style(status.as_str());
    let styled = match status {
        WorkflowStatus::Running => text.blue(),
        WorkflowStatus::Paused => text.yellow(),
        WorkflowStatus::Completed => text.green(),
        WorkflowStatus::Failed => text.red(),
    };
    styled.to_string()
}

fn runs_table(extra: &[&str]) -> Table {
    let mut header = vec![
        Cell::new("ID").fg(Color::Cyan),
        Cell::new("Workflow"),
        Cell::new("Team"),
        Cell::new("Status"),
    ];
    header.extend(extra.iter().map(|h| Cell::new(*h)));

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn run_summary(run: &WorkflowState) -> Value {
    json!({
        "id": run.id.to_string(),
        "workflow_type": run.workflow_type,
        "team_id": run.team_id,
        "status": run.status.as_str(),
        "current_node": run.current_node,
        "execution_mode": run.execution_mode.as_str(),
        "pause_reason": run.state_data.pause_reason,
        "paused_at": run.paused_at.map(|t| t.to_rfc3339()),
        "updated_at": run.updated_at.to_rfc3339(),
    })
}

fn print_run_details(run: &WorkflowState) {
    println!(
        "  {} {} {}",
        style("Run").bold(),
        style(&run.workflow_type).cyan(),
        style(run.id).dim()
    );
    println!("  Team:    {}", run.team_id);
    println!("  Agent:   {}", run.agent_name);
    println!("  Status:  {}", styled_status(run.status));
    println!("  Node:    {}", run.current_node);
    println!("  Mode:    {}", run.execution_mode);
    println!("  Version: {}", run.version);
    println!("  Updated: {}", run.updated_at.format("%Y-%m-%d %H:%M"));
    if let Some(reason) = &run.state_data.pause_reason {
        println!("  Paused:  {}", style(reason).yellow());
    }
    if let Some(error) = &run.state_data.error {
        println!("  Error:   {}", style(error).red());
    }
}

/// Print a run after a state-changing command, with a hint for what to do
/// next.
fn print_run(run: &WorkflowState, verb: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(run)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} '{}'",
        style("*").green().bold(),
        verb,
        style(&run.workflow_type).cyan()
    );
    print_run_details(run);
    println!();

    let hint = match run.status {
        WorkflowStatus::Paused => format!("agentflow workflow resume {} --approve", run.id),
        WorkflowStatus::Running => format!("agentflow workflow run {}", run.id),
        WorkflowStatus::Completed | WorkflowStatus::Failed => {
            format!("agentflow workflow status {}", run.id)
        }
    };
    println!("  Next: {}", style(hint).dim());
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payload() {
        assert_eq!(parse_payload(None).unwrap(), json!({}));
        assert_eq!(
            parse_payload(Some(r#"{"hours": 12}"#)).unwrap(),
            json!({"hours": 12})
        );
        assert!(parse_payload(Some("[1, 2]")).is_err());
        assert!(parse_payload(Some("{not json")).is_err());
    }

    #[test]
    fn test_parse_items() {
        assert_eq!(parse_items(r#"["a", 2]"#).unwrap(), vec![json!("a"), json!(2)]);
        assert!(parse_items(r#"{"a": 1}"#).is_err());
    }

    #[test]
    fn test_parse_state_id() {
        let id = Uuid::now_v7();
        assert_eq!(parse_state_id(&id.to_string()).unwrap(), id);
        assert!(parse_state_id("not-a-uuid").is_err());
    }

    #[test]
    fn test_short_id() {
        let id: Uuid = "01890a5d-ac96-774b-bcce-b302099a8057".parse().unwrap();
        assert_eq!(short_id(&id), "01890a5d");
    }
}
