//! Workflow domain types for agentflow.
//!
//! `WorkflowState` is the persisted record of one run: its position in the
//! graph (`current_node`), lifecycle status, and the typed `StateData`
//! that is stored as a single JSON column. `WorkflowSpec` is the
//! serializable shape of a workflow graph before it is bound to step
//! handlers.
//!
//! State transitions are pure: each returns a new `WorkflowState` and
//! leaves the receiver untouched. Persistence and version bumps happen in
//! the repository.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::agent::AgentContext;
use crate::approval::{ApprovalData, ApprovalPayload};
use crate::chain::{ChainContext, META_PAUSE_REASON, META_RESUME_DATA};
use crate::error::TransitionError;

/// Reserved node id marking the end of a workflow.
pub const END_NODE: &str = "end";

// ---------------------------------------------------------------------------
// Status and mode
// ---------------------------------------------------------------------------

/// Lifecycle status of a workflow run.
///
/// Running and Paused are active; Completed and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown workflow status '{other}'")),
        }
    }
}

/// How checkpoints behave for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Never pause at checkpoints.
    Full,
    /// Pause at every checkpoint unless the auto-approval policy allows it.
    #[default]
    Staged,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Staged => "staged",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "staged" => Ok(Self::Staged),
            other => Err(format!("unknown execution mode '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// The business entity whose change started a run (e.g. a work order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEntity {
    pub entity_type: String,
    pub entity_id: String,
    /// Trigger parameters. May carry `organization`, `client`, `project`
    /// objects that seed the run's `AgentContext`.
    #[serde(default)]
    pub payload: Value,
}

// ---------------------------------------------------------------------------
// State data
// ---------------------------------------------------------------------------

/// Typed view of the `state_data` JSON column.
///
/// Business result keys (`deliverable_alternatives`, `task_breakdown`, ...)
/// live at the top level next to the bookkeeping fields, so a result may
/// never use one of [`StateData::RESERVED_KEYS`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateData {
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub agent_context: AgentContext,
    #[serde(default)]
    pub chain: ChainContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_data: Option<ApprovalData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Checkpoint whose approval has been consumed; its step is not re-run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_passed: Option<String>,
    #[serde(flatten)]
    pub results: Map<String, Value>,
}

impl StateData {
    /// Top-level keys owned by the bookkeeping fields.
    pub const RESERVED_KEYS: &[&str] = &[
        "input",
        "agent_context",
        "chain",
        "approval_data",
        "pause_reason",
        "resume_data",
        "error",
        "checkpoint_passed",
    ];

    pub fn is_reserved_key(key: &str) -> bool {
        Self::RESERVED_KEYS.contains(&key)
    }

    pub fn new(input: Value, agent_context: AgentContext) -> Self {
        Self {
            input,
            agent_context,
            ..Self::default()
        }
    }

    pub fn result(&self, key: &str) -> Option<&Value> {
        self.results.get(key)
    }
}

// ---------------------------------------------------------------------------
// Workflow state
// ---------------------------------------------------------------------------

/// Persisted record of one workflow invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// UUIDv7 run ID.
    pub id: Uuid,
    pub team_id: String,
    pub workflow_type: String,
    /// Agent configuration the run executes under.
    pub agent_name: String,
    pub current_node: String,
    pub status: WorkflowStatus,
    pub execution_mode: ExecutionMode,
    pub state_data: StateData,
    pub approval_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
    /// Optimistic-lock version; bumped on every persisted update.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// New run positioned at `start_node` with status Running.
    pub fn new(
        team_id: impl Into<String>,
        workflow_type: impl Into<String>,
        agent_name: impl Into<String>,
        start_node: impl Into<String>,
        execution_mode: ExecutionMode,
        state_data: StateData,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            team_id: team_id.into(),
            workflow_type: workflow_type.into(),
            agent_name: agent_name.into(),
            current_node: start_node.into(),
            status: WorkflowStatus::Running,
            execution_mode,
            state_data,
            approval_required: false,
            paused_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Age of the pause, if paused.
    pub fn paused_for(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        match (self.status, self.paused_at) {
            (WorkflowStatus::Paused, Some(at)) => Some(now - at),
            _ => None,
        }
    }

    /// Move to `node`, still running.
    pub fn advanced_to(&self, node: impl Into<String>) -> Self {
        Self {
            current_node: node.into(),
            ..self.clone()
        }
    }

    /// Suspend at the current node awaiting approval.
    pub fn paused(&self, reason: impl Into<String>, now: DateTime<Utc>) -> Self {
        let reason = reason.into();
        let mut next = self.clone();
        next.status = WorkflowStatus::Paused;
        next.approval_required = true;
        next.paused_at = Some(now);
        next.state_data.chain = next
            .state_data
            .chain
            .with_metadata(META_PAUSE_REASON, Value::String(reason.clone()));
        next.state_data.pause_reason = Some(reason);
        next
    }

    pub fn completed(&self) -> Self {
        Self {
            status: WorkflowStatus::Completed,
            current_node: END_NODE.to_string(),
            approval_required: false,
            ..self.clone()
        }
    }

    pub fn failed(&self, error: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.status = WorkflowStatus::Failed;
        next.approval_required = false;
        next.state_data.error = Some(error.into());
        next
    }

    /// Apply a human decision to a paused run.
    ///
    /// Only valid from Paused. The returned state is Running at the same
    /// node with the checkpoint marked as passed, so the engine takes the
    /// node's outgoing transition without re-executing it. `approval_data`
    /// and `resume_data` record the decision.
    pub fn resumed(
        &self,
        payload: &ApprovalPayload,
        now: DateTime<Utc>,
    ) -> Result<Self, TransitionError> {
        if self.status != WorkflowStatus::Paused {
            return Err(TransitionError::NotPaused(self.status));
        }
        payload.validate()?;

        let resume_data = serde_json::to_value(payload)
            .map_err(|e| TransitionError::MalformedPayload(e.to_string()))?;

        let mut next = self.clone();
        next.status = WorkflowStatus::Running;
        next.approval_required = false;
        next.paused_at = None;
        next.state_data.approval_data = Some(ApprovalData {
            approved: payload.approved,
            approver_id: payload.approver_id.clone(),
            approved_items: payload.approved_items.clone(),
            node_id: self.current_node.clone(),
            decided_at: now,
        });
        next.state_data.pause_reason = None;
        next.state_data.checkpoint_passed = Some(self.current_node.clone());
        next.state_data.chain = next
            .state_data
            .chain
            .with_metadata(META_RESUME_DATA, resume_data.clone());
        next.state_data.resume_data = Some(resume_data);
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// Workflow spec (unbound graph)
// ---------------------------------------------------------------------------

/// Serializable workflow graph. Bound to step handlers before it can run.
///
/// ```yaml
/// name: pm-copilot
/// start: analyze
/// nodes:
///   - id: analyze
///     handler: work_order_analysis
///     branches:
///       - when: "accumulated_context.step_0.requires_insights == true"
///         goto: insights
///     otherwise: draft_deliverables
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: String,
    pub nodes: Vec<NodeSpec>,
}

/// One node of a `WorkflowSpec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    /// Registered step handler name.
    pub handler: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether this node may pause for human approval.
    #[serde(default)]
    pub checkpoint: bool,
    /// Static successor. Defaults to `end`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Conditional successors, first match wins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<BranchSpec>,
    /// Successor when no branch matches. Defaults to `end`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otherwise: Option<String>,
    /// Successor when a checkpoint is rejected. Defaults to `end`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_reject: Option<String>,
    /// Budget consumed by one execution, in USD.
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handler: handler.into(),
            description: None,
            checkpoint: false,
            next: None,
            branches: Vec::new(),
            otherwise: None,
            on_reject: None,
            estimated_cost: 0.0,
            params: Map::new(),
        }
    }

    pub fn checkpoint(mut self) -> Self {
        self.checkpoint = true;
        self
    }

    pub fn then(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn branch(mut self, when: impl Into<String>, goto: impl Into<String>) -> Self {
        self.branches.push(BranchSpec {
            when: when.into(),
            goto: goto.into(),
        });
        self
    }

    pub fn otherwise(mut self, target: impl Into<String>) -> Self {
        self.otherwise = Some(target.into());
        self
    }

    pub fn on_reject(mut self, target: impl Into<String>) -> Self {
        self.on_reject = Some(target.into());
        self
    }

    pub fn cost(mut self, estimated_cost: f64) -> Self {
        self.estimated_cost = estimated_cost;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Every node id this node can transition to, `end` included.
    pub fn targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::new();
        if self.branches.is_empty() {
            targets.push(self.next.as_deref().unwrap_or(END_NODE));
        } else {
            targets.extend(self.branches.iter().map(|b| b.goto.as_str()));
            targets.push(self.otherwise.as_deref().unwrap_or(END_NODE));
        }
        if self.checkpoint {
            targets.push(self.on_reject.as_deref().unwrap_or(END_NODE));
        }
        targets
    }
}

/// A conditional edge: go to `goto` when `when` evaluates true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSpec {
    pub when: String,
    pub goto: String,
}
