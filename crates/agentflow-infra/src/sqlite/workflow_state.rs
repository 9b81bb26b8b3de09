//! SQLite workflow state repository.
//!
//! Implements `WorkflowStateRepository` from `agentflow-core`. The typed
//! `StateData` is stored as a single JSON column and decoded at this
//! boundary; `pause_reason` is duplicated into its own column so the stale
//! listing can filter on it.
//!
//! Updates are compare-and-swap on `version`: the row only changes when the
//! stored version still equals the caller's, and every successful write
//! bumps it by one.

use agentflow_core::repository::workflow::{PausedFilter, WorkflowStateRepository};
use agentflow_types::error::RepositoryError;
use agentflow_types::workflow::{ExecutionMode, StateData, WorkflowState, WorkflowStatus};
use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite};
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed implementation of `WorkflowStateRepository`.
pub struct SqliteWorkflowStateRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowStateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct WorkflowStateRow {
    id: String,
    team_id: String,
    workflow_type: String,
    agent_name: String,
    current_node: String,
    status: String,
    execution_mode: String,
    state_data: String,
    approval_required: bool,
    paused_at: Option<String>,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl WorkflowStateRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            team_id: row.try_get("team_id")?,
            workflow_type: row.try_get("workflow_type")?,
            agent_name: row.try_get("agent_name")?,
            current_node: row.try_get("current_node")?,
            status: row.try_get("status")?,
            execution_mode: row.try_get("execution_mode")?,
            state_data: row.try_get("state_data")?,
            approval_required: row.try_get("approval_required")?,
            paused_at: row.try_get("paused_at")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_state(self) -> Result<WorkflowState, RepositoryError> {
        let status: WorkflowStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let execution_mode: ExecutionMode =
            self.execution_mode.parse().map_err(RepositoryError::Query)?;
        let state_data: StateData = serde_json::from_str(&self.state_data)
            .map_err(|e| RepositoryError::Query(format!("invalid state_data JSON: {e}")))?;

        Ok(WorkflowState {
            id: parse_uuid(&self.id)?,
            team_id: self.team_id,
            workflow_type: self.workflow_type,
            agent_name: self.agent_name,
            current_node: self.current_node,
            status,
            execution_mode,
            state_data,
            approval_required: self.approval_required,
            paused_at: self.paused_at.as_deref().map(parse_datetime).transpose()?,
            version: self.version,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn decode_rows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<WorkflowState>, RepositoryError> {
    rows.iter()
        .map(|row| {
            WorkflowStateRow::from_row(row)
                .map_err(query_error)?
                .into_state()
        })
        .collect()
}

fn encode_state_data(state: &WorkflowState) -> Result<String, RepositoryError> {
    serde_json::to_string(&state.state_data)
        .map_err(|e| RepositoryError::Query(format!("serialize state_data: {e}")))
}

// ---------------------------------------------------------------------------
// WorkflowStateRepository impl
// ---------------------------------------------------------------------------

impl WorkflowStateRepository for SqliteWorkflowStateRepository {
    async fn create(&self, state: &WorkflowState) -> Result<WorkflowState, RepositoryError> {
        let state_data = encode_state_data(state)?;

        sqlx::query(
            r#"INSERT INTO workflow_states
               (id, team_id, workflow_type, agent_name, current_node, status, execution_mode,
                state_data, approval_required, paused_at, pause_reason, version, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(state.id.to_string())
        .bind(&state.team_id)
        .bind(&state.workflow_type)
        .bind(&state.agent_name)
        .bind(&state.current_node)
        .bind(state.status.as_str())
        .bind(state.execution_mode.as_str())
        .bind(&state_data)
        .bind(state.approval_required)
        .bind(state.paused_at.as_ref().map(format_datetime))
        .bind(&state.state_data.pause_reason)
        .bind(state.version)
        .bind(format_datetime(&state.created_at))
        .bind(format_datetime(&state.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("workflow state {} already exists", state.id))
            }
            other => query_error(other),
        })?;

        tracing::debug!(state_id = %state.id, workflow_type = %state.workflow_type, "workflow state created");
        Ok(state.clone())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<WorkflowState>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_states WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = WorkflowStateRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_state()?))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, state: &WorkflowState) -> Result<WorkflowState, RepositoryError> {
        let state_data = encode_state_data(state)?;
        let updated_at = Utc::now();

        let result = sqlx::query(
            r#"UPDATE workflow_states SET
                 current_node = ?,
                 status = ?,
                 execution_mode = ?,
                 state_data = ?,
                 approval_required = ?,
                 paused_at = ?,
                 pause_reason = ?,
                 version = version + 1,
                 updated_at = ?
               WHERE id = ? AND version = ?"#,
        )
        .bind(&state.current_node)
        .bind(state.status.as_str())
        .bind(state.execution_mode.as_str())
        .bind(&state_data)
        .bind(state.approval_required)
        .bind(state.paused_at.as_ref().map(format_datetime))
        .bind(&state.state_data.pause_reason)
        .bind(format_datetime(&updated_at))
        .bind(state.id.to_string())
        .bind(state.version)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            // Read through the writer so the check sees the row the CAS lost to.
            let stored: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM workflow_states WHERE id = ?")
                    .bind(state.id.to_string())
                    .fetch_optional(&self.pool.writer)
                    .await
                    .map_err(query_error)?;
            return Err(match stored {
                None => RepositoryError::NotFound,
                Some((found,)) => RepositoryError::Conflict(format!(
                    "workflow state {} expected version {}, found {found}",
                    state.id, state.version
                )),
            });
        }

        let mut next = state.clone();
        next.version += 1;
        next.updated_at = updated_at;
        Ok(next)
    }

    async fn list_by_status(
        &self,
        status: WorkflowStatus,
        limit: i64,
    ) -> Result<Vec<WorkflowState>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_states WHERE status = ? ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        decode_rows(&rows)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<WorkflowState>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM workflow_states ORDER BY updated_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        decode_rows(&rows)
    }

    async fn list_paused(&self, filter: &PausedFilter) -> Result<Vec<WorkflowState>, RepositoryError> {
        let mut query =
            QueryBuilder::<Sqlite>::new("SELECT * FROM workflow_states WHERE status = 'paused'");
        if let Some(before) = &filter.paused_before {
            query.push(" AND paused_at < ").push_bind(format_datetime(before));
        }
        if let Some(reason) = &filter.pause_reason {
            query.push(" AND pause_reason = ").push_bind(reason.clone());
        }
        if let Some(team_id) = &filter.team_id {
            query.push(" AND team_id = ").push_bind(team_id.clone());
        }
        query.push(" ORDER BY paused_at ASC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit);
        }

        let rows = query
            .build()
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        decode_rows(&rows)
    }
}
