//! Workflow state repository trait definition.
//!
//! The engine persists every transition of a `WorkflowState` through this
//! trait. The infrastructure layer (agentflow-infra) implements it with
//! SQLite persistence.

use agentflow_types::error::RepositoryError;
use agentflow_types::workflow::{WorkflowState, WorkflowStatus};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Filter for paused-state queries.
#[derive(Debug, Clone, Default)]
pub struct PausedFilter {
    /// Only states paused before this instant.
    pub paused_before: Option<DateTime<Utc>>,
    /// Only states paused with exactly this reason.
    pub pause_reason: Option<String>,
    pub team_id: Option<String>,
    pub limit: Option<i64>,
}

/// Repository trait for workflow state persistence.
///
/// `update` is a compare-and-swap on `version`: the write only lands when
/// the stored version equals `state.version`, and the returned state carries
/// the bumped version. A lost race yields `RepositoryError::Conflict`.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowStateRepository: Send + Sync {
    /// Insert a new state. Returns it as stored.
    fn create(
        &self,
        state: &WorkflowState,
    ) -> impl std::future::Future<Output = Result<WorkflowState, RepositoryError>> + Send;

    /// Get a state by its UUID.
    fn get(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowState>, RepositoryError>> + Send;

    /// Compare-and-swap update keyed on `state.version`.
    fn update(
        &self,
        state: &WorkflowState,
    ) -> impl std::future::Future<Output = Result<WorkflowState, RepositoryError>> + Send;

    /// List states with the given status, newest first.
    fn list_by_status(
        &self,
        status: WorkflowStatus,
        limit: i64,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowState>, RepositoryError>> + Send;

    /// List the most recently updated states regardless of status.
    fn list_recent(
        &self,
        limit: i64,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowState>, RepositoryError>> + Send;

    /// List paused states, oldest pause first.
    fn list_paused(
        &self,
        filter: &PausedFilter,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowState>, RepositoryError>> + Send;
}
