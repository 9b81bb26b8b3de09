//! In-memory collaborators for engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use agentflow_types::approval::{ApprovableRef, ApprovalStatus, CheckpointApprovalRequest};
use agentflow_types::config::BudgetLimits;
use agentflow_types::error::RepositoryError;
use agentflow_types::workflow::{WorkflowState, WorkflowStatus};
use chrono::Utc;
use uuid::Uuid;

use crate::budget::{BudgetGuard, SpendRecord};
use crate::repository::approval::ApprovalInbox;
use crate::repository::workflow::{PausedFilter, WorkflowStateRepository};

/// State store with the same compare-and-swap rule as the SQLite one.
#[derive(Default)]
pub struct InMemoryStateRepository {
    states: Mutex<HashMap<Uuid, WorkflowState>>,
    fail_updates: AtomicBool,
}

impl InMemoryStateRepository {
    /// Make every `update` fail with a query error until switched off.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

impl WorkflowStateRepository for InMemoryStateRepository {
    async fn create(&self, state: &WorkflowState) -> Result<WorkflowState, RepositoryError> {
        let mut states = self.states.lock().unwrap();
        if states.contains_key(&state.id) {
            return Err(RepositoryError::Conflict(format!("duplicate id {}", state.id)));
        }
        states.insert(state.id, state.clone());
        Ok(state.clone())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<WorkflowState>, RepositoryError> {
        Ok(self.states.lock().unwrap().get(id).cloned())
    }

    async fn update(&self, state: &WorkflowState) -> Result<WorkflowState, RepositoryError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("disk I/O error".to_string()));
        }
        let mut states = self.states.lock().unwrap();
        let stored = states.get_mut(&state.id).ok_or(RepositoryError::NotFound)?;
        if stored.version != state.version {
            return Err(RepositoryError::Conflict(format!(
                "expected version {}, found {}",
                state.version, stored.version
            )));
        }
        let mut next = state.clone();
        next.version += 1;
        next.updated_at = Utc::now();
        *stored = next.clone();
        Ok(next)
    }

    async fn list_by_status(
        &self,
        status: WorkflowStatus,
        limit: i64,
    ) -> Result<Vec<WorkflowState>, RepositoryError> {
        let mut found: Vec<_> = self
            .states
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<WorkflowState>, RepositoryError> {
        let mut found: Vec<_> = self.states.lock().unwrap().values().cloned().collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn list_paused(&self, filter: &PausedFilter) -> Result<Vec<WorkflowState>, RepositoryError> {
        let mut found: Vec<_> = self
            .states
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.status == WorkflowStatus::Paused)
            .filter(|s| match (filter.paused_before, s.paused_at) {
                (Some(before), Some(at)) => at < before,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .filter(|s| {
                filter
                    .pause_reason
                    .as_ref()
                    .is_none_or(|r| s.state_data.pause_reason.as_ref() == Some(r))
            })
            .filter(|s| filter.team_id.as_ref().is_none_or(|t| &s.team_id == t))
            .cloned()
            .collect();
        found.sort_by_key(|s| s.paused_at);
        if let Some(limit) = filter.limit {
            found.truncate(limit.max(0) as usize);
        }
        Ok(found)
    }
}

/// Approval inbox backed by a vector.
#[derive(Default)]
pub struct InMemoryInbox {
    requests: Mutex<Vec<CheckpointApprovalRequest>>,
    fail_create: AtomicBool,
    fail_resolve: AtomicBool,
}

impl InMemoryInbox {
    /// Tickets filed, in any status.
    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_resolve(&self, fail: bool) {
        self.fail_resolve.store(fail, Ordering::SeqCst);
    }
}

impl ApprovalInbox for InMemoryInbox {
    async fn create(&self, request: &CheckpointApprovalRequest) -> Result<Uuid, RepositoryError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        self.requests.lock().unwrap().push(request.clone());
        Ok(request.id)
    }

    async fn pending_for(
        &self,
        approvable: &ApprovableRef,
    ) -> Result<Option<CheckpointApprovalRequest>, RepositoryError> {
        Ok(self
            .requests
            .lock()
            .unwrap()
            .iter()
            .find(|r| &r.approvable == approvable && r.status == ApprovalStatus::Pending)
            .cloned())
    }

    async fn resolve(
        &self,
        ticket_id: &Uuid,
        status: ApprovalStatus,
        approver_id: &str,
    ) -> Result<(), RepositoryError> {
        if self.fail_resolve.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        let mut requests = self.requests.lock().unwrap();
        let ticket = requests
            .iter_mut()
            .find(|r| &r.id == ticket_id && r.status == ApprovalStatus::Pending)
            .ok_or(RepositoryError::NotFound)?;
        ticket.status = status;
        ticket.approver_id = Some(approver_id.to_string());
        ticket.resolved_at = Some(Utc::now());
        Ok(())
    }

    async fn list_pending(
        &self,
        team_id: Option<&str>,
    ) -> Result<Vec<CheckpointApprovalRequest>, RepositoryError> {
        Ok(self
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status == ApprovalStatus::Pending)
            .filter(|r| team_id.is_none_or(|t| r.team_id == t))
            .cloned()
            .collect())
    }
}

/// Budget guard with a fixed answer that records every spend.
#[derive(Clone)]
pub struct FixedBudget {
    allow: bool,
    spends: Arc<Mutex<Vec<f64>>>,
}

impl FixedBudget {
    pub fn allow() -> Self {
        Self {
            allow: true,
            spends: Arc::default(),
        }
    }

    pub fn deny() -> Self {
        Self {
            allow: false,
            spends: Arc::default(),
        }
    }

    pub fn recorded(&self) -> Vec<f64> {
        self.spends.lock().unwrap().clone()
    }
}

impl BudgetGuard for FixedBudget {
    async fn can_run(
        &self,
        _team_id: &str,
        _limits: &BudgetLimits,
        _estimated_cost: f64,
    ) -> Result<bool, RepositoryError> {
        Ok(self.allow)
    }

    async fn record_spend(&self, record: &SpendRecord) -> Result<(), RepositoryError> {
        self.spends.lock().unwrap().push(record.amount);
        Ok(())
    }
}
