//! Workflow engine: drives a `WorkflowState` through its definition.
//!
//! # Execution flow
//!
//! 1. `invoke` checks the agent, creates a Running state at the start node,
//!    and persists it.
//! 2. `run` loops while the state is Running: execute the current node's
//!    handler, fold its output into the chain context, then either pause at
//!    a checkpoint or take the node's transition. Every transition is
//!    persisted (compare-and-swap on version) before the loop moves on.
//! 3. A pause files an approval request, persists `Paused`, and returns.
//!    The process may exit; nothing lives only in memory.
//! 4. `resume` resolves the approval request, then persists the decision on
//!    the Paused state. The next `run` takes the checkpoint's outgoing (or
//!    reject) transition without re-executing the checkpoint.
//!
//! The agent a run belongs to is checked on every entry point, so disabling
//! an agent stops its paused and running runs from advancing.
//!
//! Nodes run strictly one after another. A step error fails the run and is
//! recorded in `state_data.error`; budget and configuration problems are
//! returned as errors.

use std::sync::Arc;

use agentflow_types::agent::AgentContext;
use agentflow_types::approval::{
    ApprovableRef, ApprovalPayload, ApprovalStatus, CheckpointApprovalRequest, Urgency,
};
use agentflow_types::config::{AgentConfig, AutomationSettings, BudgetLimits, GlobalConfig};
use agentflow_types::error::{RepositoryError, TransitionError};
use agentflow_types::workflow::{
    END_NODE, ExecutionMode, StateData, TriggerEntity, WorkflowState, WorkflowStatus,
};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::{Map, Value};
use tracing::Instrument;
use uuid::Uuid;

use crate::budget::{BudgetGuard, SpendRecord};
use crate::repository::approval::ApprovalInbox;
use crate::repository::workflow::{PausedFilter, WorkflowStateRepository};

use super::catalog::WorkflowCatalog;
use super::checkpoint::{CheckpointError, CheckpointManager};
use super::condition::ConditionEvaluator;
use super::definition::{BoundNode, DefinitionError, WorkflowDefinition};
use super::policy::{ApprovalDecision, AutoApprovalPolicy};
use super::step::{StepInput, StepOutput};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Upper bound on node executions in a single `run` call.
pub const MAX_NODE_EXECUTIONS: usize = 100;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors surfaced to the caller of the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(
        "budget exceeded for team '{team_id}' at node '{node_id}' (estimated cost ${estimated_cost:.2})"
    )]
    BudgetExceeded {
        team_id: String,
        node_id: String,
        estimated_cost: f64,
    },

    #[error("invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error("workflow state {0} was modified concurrently; reload and retry")]
    ConcurrentModification(Uuid),

    #[error("invalid workflow definition: {0}")]
    Definition(#[from] DefinitionError),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("unknown workflow type '{0}'")]
    UnknownWorkflow(String),

    #[error("workflow state not found: {0}")]
    StateNotFound(Uuid),

    #[error("workflow state {0} is already being run")]
    AlreadyRunning(Uuid),
}

impl From<CheckpointError> for EngineError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::ConcurrentModification { state_id, .. } => {
                Self::ConcurrentModification(state_id)
            }
            CheckpointError::StateNotFound(id) => Self::StateNotFound(id),
            CheckpointError::Repository(msg) => Self::Repository(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Invocation inputs
// ---------------------------------------------------------------------------

/// Settings a run executes under, resolved by the caller.
#[derive(Debug, Clone)]
pub struct RunScope {
    pub agent: AgentConfig,
    pub automation: AutomationSettings,
    pub budget: BudgetLimits,
}

impl RunScope {
    /// Resolve the agent and the team-scoped settings. An unknown agent or
    /// missing automation settings are a configuration error.
    pub fn resolve(
        config: &GlobalConfig,
        team_id: &str,
        agent_name: &str,
    ) -> Result<Self, EngineError> {
        let agent = config.agent(agent_name).cloned().ok_or_else(|| {
            EngineError::Configuration(format!("agent '{agent_name}' is not configured"))
        })?;
        let automation = config.automation_for(team_id).ok_or_else(|| {
            EngineError::Configuration(format!(
                "no [automation] settings configured (globally or for team '{team_id}')"
            ))
        })?;
        if !(0.0..=1.0).contains(&automation.auto_approval_threshold) {
            return Err(EngineError::Configuration(format!(
                "auto_approval_threshold must be within [0, 1], got {}",
                automation.auto_approval_threshold
            )));
        }
        Ok(Self {
            agent,
            automation,
            budget: config.budget_for(team_id),
        })
    }

    /// Check that `state` may advance under this scope's agent.
    pub fn authorize(&self, state: &WorkflowState) -> Result<(), EngineError> {
        if self.agent.name != state.agent_name {
            return Err(EngineError::Configuration(format!(
                "run {} belongs to agent '{}', not '{}'",
                state.id, state.agent_name, self.agent.name
            )));
        }
        authorize_agent(&self.agent, &state.workflow_type)
    }
}

fn authorize_agent(agent: &AgentConfig, workflow_type: &str) -> Result<(), EngineError> {
    if !agent.enabled {
        return Err(EngineError::Configuration(format!(
            "agent '{}' is disabled",
            agent.name
        )));
    }
    if !agent.allows(workflow_type) {
        return Err(EngineError::Configuration(format!(
            "agent '{}' is not allowed to run workflow '{}'",
            agent.name, workflow_type
        )));
    }
    Ok(())
}

/// Parameters of a new run.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub workflow_type: String,
    pub team_id: String,
    pub trigger: TriggerEntity,
    pub mode: ExecutionMode,
}

// ---------------------------------------------------------------------------
// In-flight guard
// ---------------------------------------------------------------------------

/// Marks a state id as being run by this process; released on drop.
struct InFlightGuard<'a> {
    runs: &'a DashMap<Uuid, ()>,
    id: Uuid,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(runs: &'a DashMap<Uuid, ()>, id: Uuid) -> Result<Self, EngineError> {
        match runs.entry(id) {
            Entry::Occupied(_) => Err(EngineError::AlreadyRunning(id)),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(Self { runs, id })
            }
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.runs.remove(&self.id);
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// The executor loop plus its collaborators.
///
/// Generic over storage (`R`), the approval inbox (`A`) and the budget
/// guard (`B`) so tests can run it entirely in memory.
pub struct WorkflowEngine<R, A, B>
where
    R: WorkflowStateRepository,
    A: ApprovalInbox,
    B: BudgetGuard,
{
    checkpoint: CheckpointManager<R>,
    inbox: A,
    budget: B,
    catalog: Arc<WorkflowCatalog>,
    policy: AutoApprovalPolicy,
    evaluator: ConditionEvaluator,
    in_flight: DashMap<Uuid, ()>,
}

impl<R, A, B> WorkflowEngine<R, A, B>
where
    R: WorkflowStateRepository,
    A: ApprovalInbox,
    B: BudgetGuard,
{
    pub fn new(repo: R, inbox: A, budget: B, catalog: Arc<WorkflowCatalog>) -> Self {
        Self {
            checkpoint: CheckpointManager::new(repo),
            inbox,
            budget,
            catalog,
            policy: AutoApprovalPolicy::new(),
            evaluator: ConditionEvaluator::new(),
            in_flight: DashMap::new(),
        }
    }

    pub fn catalog(&self) -> &WorkflowCatalog {
        &self.catalog
    }

    pub fn inbox(&self) -> &A {
        &self.inbox
    }

    fn definition(&self, workflow_type: &str) -> Result<Arc<WorkflowDefinition>, EngineError> {
        self.catalog
            .get(workflow_type)
            .ok_or_else(|| EngineError::UnknownWorkflow(workflow_type.to_string()))
    }

    // -----------------------------------------------------------------------
    // Invoke
    // -----------------------------------------------------------------------

    /// Create and persist a new run, positioned at the start node with
    /// status Running. Does not execute anything.
    pub async fn invoke(
        &self,
        request: InvokeRequest,
        agent: &AgentConfig,
    ) -> Result<WorkflowState, EngineError> {
        authorize_agent(agent, &request.workflow_type)?;
        let definition = self.definition(&request.workflow_type)?;

        let agent_context = AgentContext::from_value(&request.trigger.payload);
        let input = trigger_input(&request.trigger);
        let state = WorkflowState::new(
            request.team_id,
            request.workflow_type,
            agent.name.clone(),
            definition.start(),
            request.mode,
            StateData::new(input, agent_context),
        );

        let stored = self.checkpoint.create(&state).await?;
        tracing::info!(
            state_id = %stored.id,
            workflow_type = %stored.workflow_type,
            mode = %stored.execution_mode,
            "workflow invoked"
        );
        Ok(stored)
    }

    /// `invoke` followed by `run`.
    pub async fn invoke_and_run(
        &self,
        request: InvokeRequest,
        agent: &AgentConfig,
        scope: &RunScope,
    ) -> Result<WorkflowState, EngineError> {
        let state = self.invoke(request, agent).await?;
        self.run(state, scope).await
    }

    // -----------------------------------------------------------------------
    // Run
    // -----------------------------------------------------------------------

    /// Drive `state` until it pauses, completes, or fails.
    ///
    /// A state that is not Running is returned unchanged. Fails with
    /// `Configuration` when the scope's agent may not run the state.
    pub async fn run(
        &self,
        state: WorkflowState,
        scope: &RunScope,
    ) -> Result<WorkflowState, EngineError> {
        if state.status != WorkflowStatus::Running {
            tracing::debug!(state_id = %state.id, status = %state.status, "run is a no-op");
            return Ok(state);
        }
        scope.authorize(&state)?;
        let definition = self.definition(&state.workflow_type)?;
        let _guard = InFlightGuard::acquire(&self.in_flight, state.id)?;

        let span = tracing::info_span!(
            "workflow.run",
            workflow.name = %state.workflow_type,
            workflow.state_id = %state.id,
            workflow.mode = %state.execution_mode,
            workflow.status = tracing::field::Empty,
        );
        let result = self
            .run_loop(state, &definition, scope)
            .instrument(span.clone())
            .await;
        if let Ok(state) = &result {
            span.record("workflow.status", state.status.as_str());
        }
        result
    }

    async fn run_loop(
        &self,
        mut state: WorkflowState,
        definition: &WorkflowDefinition,
        scope: &RunScope,
    ) -> Result<WorkflowState, EngineError> {
        let mut executed = 0usize;

        while state.status == WorkflowStatus::Running {
            let Some(node) = definition.node(&state.current_node) else {
                let message = format!(
                    "node '{}' not found in workflow '{}'",
                    state.current_node,
                    definition.name()
                );
                tracing::error!(state_id = %state.id, "{message}");
                state = self.checkpoint.save(&state.failed(message)).await?;
                break;
            };

            if state.state_data.checkpoint_passed.as_deref() == Some(node.id()) {
                state = self.leave_checkpoint(state, node).await?;
                continue;
            }

            if executed >= MAX_NODE_EXECUTIONS {
                let message = format!("exceeded {MAX_NODE_EXECUTIONS} node executions in one run");
                tracing::error!(state_id = %state.id, node_id = node.id(), "{message}");
                state = self.checkpoint.save(&state.failed(message)).await?;
                break;
            }
            executed += 1;

            self.check_budget(&mut state, node, scope).await?;

            let index = state.state_data.chain.next_step_index();
            let input = step_input(&state, node, index);
            tracing::debug!(
                state_id = %state.id,
                node_id = node.id(),
                handler = node.handler.name(),
                step_index = index,
                "executing node"
            );

            let node_span = tracing::info_span!(
                "workflow.node",
                workflow.node.id = node.id(),
                workflow.node.handler = node.handler.name(),
            );
            let output = match node.handler.execute(&input).instrument(node_span).await {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!(
                        state_id = %state.id,
                        node_id = node.id(),
                        error = %e,
                        "step failed, failing workflow"
                    );
                    state = self
                        .checkpoint
                        .save(&state.failed(format!("node '{}': {e}", node.id())))
                        .await?;
                    break;
                }
            };

            if node.spec.estimated_cost > 0.0 {
                self.record_spend(&state, node).await?;
            }
            if output.degraded {
                tracing::info!(state_id = %state.id, node_id = node.id(), "step produced degraded output");
            }

            if let Some(key) = output.results.keys().find(|k| StateData::is_reserved_key(k)) {
                let message = format!("node '{}': result key '{key}' is reserved", node.id());
                tracing::warn!(state_id = %state.id, node_id = node.id(), "{message}");
                state = self.checkpoint.save(&state.failed(message)).await?;
                break;
            }
            state = fold_output(state, node, index, &output);

            if node.is_checkpoint() && state.execution_mode == ExecutionMode::Staged {
                let decision = self
                    .policy
                    .decide_optional(output.suggestion.as_ref(), &scope.automation);
                match decision {
                    ApprovalDecision::AutoApprove => {
                        tracing::info!(state_id = %state.id, node_id = node.id(), "checkpoint auto-approved");
                    }
                    ApprovalDecision::Review(reason) => {
                        let paused = state.paused(reason.code(), Utc::now());
                        self.file_approval_request(&paused, &output, reason.describe())
                            .await?;
                        state = self.checkpoint.save(&paused).await?;
                        tracing::info!(
                            state_id = %state.id,
                            node_id = node.id(),
                            reason = reason.code(),
                            "workflow paused at checkpoint"
                        );
                        break;
                    }
                }
            }

            let next = node
                .next_node(&state.state_data.chain, &self.evaluator)
                .to_string();
            state = self.transition(state, &next).await?;
        }

        tracing::info!(
            state_id = %state.id,
            status = %state.status,
            node_id = %state.current_node,
            "run loop finished"
        );
        Ok(state)
    }

    /// Take the outgoing edge of a checkpoint whose decision has been
    /// recorded: `on_reject` when rejected, the normal transition otherwise.
    async fn leave_checkpoint(
        &self,
        mut state: WorkflowState,
        node: &BoundNode,
    ) -> Result<WorkflowState, EngineError> {
        let approved = state
            .state_data
            .approval_data
            .as_ref()
            .is_none_or(|a| a.approved);
        state.state_data.checkpoint_passed = None;

        let next = if approved {
            node.next_node(&state.state_data.chain, &self.evaluator)
                .to_string()
        } else {
            node.reject_target().to_string()
        };
        tracing::debug!(
            state_id = %state.id,
            node_id = node.id(),
            approved,
            next = %next,
            "leaving checkpoint"
        );
        self.transition(state, &next).await
    }

    async fn transition(
        &self,
        state: WorkflowState,
        next: &str,
    ) -> Result<WorkflowState, EngineError> {
        let next_state = if next == END_NODE {
            state.completed()
        } else {
            state.advanced_to(next)
        };
        Ok(self.checkpoint.save(&next_state).await?)
    }

    async fn check_budget(
        &self,
        state: &mut WorkflowState,
        node: &BoundNode,
        scope: &RunScope,
    ) -> Result<(), EngineError> {
        let cost = node.spec.estimated_cost;
        if cost <= 0.0 {
            return Ok(());
        }
        let allowed = self
            .budget
            .can_run(&state.team_id, &scope.budget, cost)
            .await
            .map_err(|e| EngineError::Repository(e.to_string()))?;
        if allowed {
            return Ok(());
        }

        let err = EngineError::BudgetExceeded {
            team_id: state.team_id.clone(),
            node_id: node.id().to_string(),
            estimated_cost: cost,
        };
        tracing::warn!(state_id = %state.id, node_id = node.id(), cost, "budget exceeded");
        *state = self.checkpoint.save(&state.failed(err.to_string())).await?;
        Err(err)
    }

    async fn record_spend(&self, state: &WorkflowState, node: &BoundNode) -> Result<(), EngineError> {
        self.budget
            .record_spend(&SpendRecord {
                team_id: state.team_id.clone(),
                workflow_type: state.workflow_type.clone(),
                node_id: node.id().to_string(),
                amount: node.spec.estimated_cost,
            })
            .await
            .map_err(|e| EngineError::Repository(e.to_string()))
    }

    /// File the review ticket for a pause. A ticket still pending from an
    /// earlier attempt whose state write was lost is reused.
    async fn file_approval_request(
        &self,
        state: &WorkflowState,
        output: &StepOutput,
        reason: &str,
    ) -> Result<Uuid, EngineError> {
        let approvable = ApprovableRef::workflow_state(state.id);
        if let Some(existing) = self
            .inbox
            .pending_for(&approvable)
            .await
            .map_err(|e| EngineError::Repository(e.to_string()))?
        {
            tracing::debug!(state_id = %state.id, ticket_id = %existing.id, "reusing pending approval ticket");
            return Ok(existing.id);
        }

        let suggestion = output.suggestion.clone().unwrap_or_default();
        let urgency = if suggestion.has_budget_impact {
            Urgency::High
        } else {
            Urgency::Normal
        };
        let preview = output
            .preview
            .clone()
            .unwrap_or_else(|| format!("Checkpoint '{}' needs review", state.current_node));

        let request = CheckpointApprovalRequest {
            id: Uuid::now_v7(),
            approvable,
            team_id: state.team_id.clone(),
            workflow_type: state.workflow_type.clone(),
            node_id: state.current_node.clone(),
            preview: format!("{preview} ({reason})"),
            confidence: suggestion.confidence,
            confidence_score: suggestion.confidence_score,
            urgency,
            status: ApprovalStatus::Pending,
            approver_id: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        self.inbox
            .create(&request)
            .await
            .map_err(|e| EngineError::Repository(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Resume
    // -----------------------------------------------------------------------

    /// Apply a human decision to a paused run and persist it.
    ///
    /// Fails with `InvalidTransition` unless the stored state is Paused; the
    /// stored state is then left untouched. The approval ticket is resolved
    /// before the state is written, so a failed ticket update leaves the run
    /// Paused and a retry after a failed state write finds nothing left to
    /// resolve. Two concurrent resumes of the same state cannot both
    /// succeed: the loser gets `ConcurrentModification`. Call `run`
    /// afterwards to continue.
    pub async fn resume(
        &self,
        state_id: Uuid,
        payload: &ApprovalPayload,
    ) -> Result<WorkflowState, EngineError> {
        let state = self.checkpoint.restore(state_id).await?;
        let resumed = state.resumed(payload, Utc::now())?;
        self.resolve_approval_request(state_id, payload).await?;
        let stored = self.checkpoint.save(&resumed).await?;

        tracing::info!(
            state_id = %state_id,
            approved = payload.approved,
            approver_id = %payload.approver_id,
            node_id = %stored.current_node,
            "workflow resumed"
        );
        Ok(stored)
    }

    async fn resolve_approval_request(
        &self,
        state_id: Uuid,
        payload: &ApprovalPayload,
    ) -> Result<(), EngineError> {
        let approvable = ApprovableRef::workflow_state(state_id);
        let pending = self
            .inbox
            .pending_for(&approvable)
            .await
            .map_err(|e| EngineError::Repository(e.to_string()))?;
        let Some(ticket) = pending else {
            tracing::warn!(state_id = %state_id, "no pending approval ticket for resumed state");
            return Ok(());
        };

        let status = if payload.approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        match self.inbox.resolve(&ticket.id, status, &payload.approver_id).await {
            Ok(()) => Ok(()),
            // resolved by a concurrent resume between the lookup and the update
            Err(RepositoryError::NotFound) => Err(EngineError::ConcurrentModification(state_id)),
            Err(e) => Err(EngineError::Repository(e.to_string())),
        }
    }

    /// `resume` followed by `run`. The scope's agent is checked before the
    /// decision is recorded.
    pub async fn resume_and_run(
        &self,
        state_id: Uuid,
        payload: &ApprovalPayload,
        scope: &RunScope,
    ) -> Result<WorkflowState, EngineError> {
        let current = self.checkpoint.restore(state_id).await?;
        scope.authorize(&current)?;
        let state = self.resume(state_id, payload).await?;
        self.run(state, scope).await
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn get(&self, state_id: Uuid) -> Result<WorkflowState, EngineError> {
        Ok(self.checkpoint.restore(state_id).await?)
    }

    /// Re-read a state and run it if it is still Running.
    pub async fn run_by_id(
        &self,
        state_id: Uuid,
        scope: &RunScope,
    ) -> Result<WorkflowState, EngineError> {
        let state = self.get(state_id).await?;
        self.run(state, scope).await
    }

    pub async fn list(
        &self,
        status: Option<WorkflowStatus>,
        limit: i64,
    ) -> Result<Vec<WorkflowState>, EngineError> {
        let repo = self.checkpoint.repo();
        let result = match status {
            Some(status) => repo.list_by_status(status, limit).await,
            None => repo.list_recent(limit).await,
        };
        result.map_err(|e| EngineError::Repository(e.to_string()))
    }

    /// Paused runs older than `older_than`, optionally with a given
    /// pause reason. Oldest first.
    pub async fn list_stale_paused(
        &self,
        older_than: Duration,
        pause_reason: Option<String>,
        team_id: Option<String>,
    ) -> Result<Vec<WorkflowState>, EngineError> {
        let filter = PausedFilter {
            paused_before: Some(Utc::now() - older_than),
            pause_reason,
            team_id,
            limit: None,
        };
        self.checkpoint
            .repo()
            .list_paused(&filter)
            .await
            .map_err(|e| EngineError::Repository(e.to_string()))
    }

    pub async fn pending_approvals(
        &self,
        team_id: Option<&str>,
    ) -> Result<Vec<CheckpointApprovalRequest>, EngineError> {
        self.inbox
            .list_pending(team_id)
            .await
            .map_err(|e| EngineError::Repository(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Trigger parameters as stored in `state_data.input`: the payload object
/// plus `entity_type` / `entity_id`.
fn trigger_input(trigger: &TriggerEntity) -> Value {
    let mut input = match &trigger.payload {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    };
    input.insert(
        "entity_type".to_string(),
        Value::String(trigger.entity_type.clone()),
    );
    input.insert(
        "entity_id".to_string(),
        Value::String(trigger.entity_id.clone()),
    );
    Value::Object(input)
}

fn step_input(state: &WorkflowState, node: &BoundNode, index: usize) -> StepInput {
    StepInput {
        state_id: state.id,
        team_id: state.team_id.clone(),
        workflow_type: state.workflow_type.clone(),
        node_id: node.id().to_string(),
        step_index: index,
        input: state.state_data.input.clone(),
        chain: state.state_data.chain.clone(),
        agent_context: state.state_data.agent_context.clone(),
        approval: state.state_data.approval_data.clone(),
        results: state.state_data.results.clone(),
        params: node.spec.params.clone(),
    }
}

fn fold_output(
    mut state: WorkflowState,
    node: &BoundNode,
    index: usize,
    output: &StepOutput,
) -> WorkflowState {
    state.state_data.chain =
        state
            .state_data
            .chain
            .with_step_output(index, output.data.clone(), node.id());
    for (key, value) in &output.results {
        state.state_data.results.insert(key.clone(), value.clone());
    }
    state
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
