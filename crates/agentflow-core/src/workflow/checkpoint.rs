//! Durable checkpoint manager for workflow state.
//!
//! Wraps `WorkflowStateRepository` to give the engine one place where state
//! transitions are persisted. Every write is a compare-and-swap on the
//! state's version, so two processes racing on the same run (for example
//! a double resume) cannot both win: the loser gets
//! `CheckpointError::ConcurrentModification` and must re-read.

use agentflow_types::error::RepositoryError;
use agentflow_types::workflow::WorkflowState;
use uuid::Uuid;

use crate::repository::workflow::WorkflowStateRepository;

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Persists workflow state transitions.
///
/// Generic over `R: WorkflowStateRepository` so it works with any storage
/// backend (SQLite, in-memory mock, etc.).
pub struct CheckpointManager<R: WorkflowStateRepository> {
    repo: R,
}

impl<R: WorkflowStateRepository> CheckpointManager<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Access the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Persist a newly created run.
    pub async fn create(&self, state: &WorkflowState) -> Result<WorkflowState, CheckpointError> {
        let stored = self
            .repo
            .create(state)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(
            state_id = %stored.id,
            workflow_type = %stored.workflow_type,
            node_id = %stored.current_node,
            "checkpointed new run"
        );
        Ok(stored)
    }

    /// Persist a transition. Returns the state with its new version.
    pub async fn save(&self, state: &WorkflowState) -> Result<WorkflowState, CheckpointError> {
        let stored = self.repo.update(state).await.map_err(|e| match e {
            RepositoryError::Conflict(_) => CheckpointError::ConcurrentModification {
                state_id: state.id,
                expected_version: state.version,
            },
            RepositoryError::NotFound => CheckpointError::StateNotFound(state.id),
            other => CheckpointError::Repository(other.to_string()),
        })?;

        tracing::debug!(
            state_id = %stored.id,
            node_id = %stored.current_node,
            status = %stored.status,
            version = stored.version,
            "checkpointed state"
        );
        Ok(stored)
    }

    /// Re-hydrate a run from storage.
    pub async fn restore(&self, state_id: Uuid) -> Result<WorkflowState, CheckpointError> {
        self.repo
            .get(&state_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?
            .ok_or(CheckpointError::StateNotFound(state_id))
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Underlying repository operation failed.
    #[error("checkpoint repository error: {0}")]
    Repository(String),

    /// Another writer updated the state first.
    #[error("workflow state {state_id} was modified concurrently (expected version {expected_version})")]
    ConcurrentModification { state_id: Uuid, expected_version: i64 },

    #[error("workflow state not found: {0}")]
    StateNotFound(Uuid),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
