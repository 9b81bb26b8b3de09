//! Approval inbox trait definition.
//!
//! Paused checkpoints file a `CheckpointApprovalRequest` here; resuming a
//! run resolves it.

use agentflow_types::approval::{ApprovableRef, ApprovalStatus, CheckpointApprovalRequest};
use agentflow_types::error::RepositoryError;
use uuid::Uuid;

/// Storage for checkpoint approval tickets.
///
/// Implementations live in agentflow-infra (e.g., `SqliteApprovalInbox`).
pub trait ApprovalInbox: Send + Sync {
    /// File a request. Returns its ticket id.
    fn create(
        &self,
        request: &CheckpointApprovalRequest,
    ) -> impl std::future::Future<Output = Result<Uuid, RepositoryError>> + Send;

    /// The pending ticket for an approvable, if any.
    fn pending_for(
        &self,
        approvable: &ApprovableRef,
    ) -> impl std::future::Future<
        Output = Result<Option<CheckpointApprovalRequest>, RepositoryError>,
    > + Send;

    /// Mark a pending ticket approved or rejected.
    fn resolve(
        &self,
        ticket_id: &Uuid,
        status: ApprovalStatus,
        approver_id: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All pending tickets, oldest first, optionally for one team.
    fn list_pending(
        &self,
        team_id: Option<&str>,
    ) -> impl std::future::Future<Output = Result<Vec<CheckpointApprovalRequest>, RepositoryError>> + Send;
}
