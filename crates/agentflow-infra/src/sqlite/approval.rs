//! SQLite approval inbox.

use agentflow_core::repository::approval::ApprovalInbox;
use agentflow_types::approval::{
    ApprovableRef, ApprovalStatus, CheckpointApprovalRequest, Confidence, Urgency,
};
use agentflow_types::error::RepositoryError;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed implementation of `ApprovalInbox`.
pub struct SqliteApprovalInbox {
    pool: DatabasePool,
}

impl SqliteApprovalInbox {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct ApprovalRow {
    id: String,
    approvable_type: String,
    approvable_id: String,
    team_id: String,
    workflow_type: String,
    node_id: String,
    preview: String,
    confidence: String,
    confidence_score: f64,
    urgency: String,
    status: String,
    approver_id: Option<String>,
    created_at: String,
    resolved_at: Option<String>,
}

impl ApprovalRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            approvable_type: row.try_get("approvable_type")?,
            approvable_id: row.try_get("approvable_id")?,
            team_id: row.try_get("team_id")?,
            workflow_type: row.try_get("workflow_type")?,
            node_id: row.try_get("node_id")?,
            preview: row.try_get("preview")?,
            confidence: row.try_get("confidence")?,
            confidence_score: row.try_get("confidence_score")?,
            urgency: row.try_get("urgency")?,
            status: row.try_get("status")?,
            approver_id: row.try_get("approver_id")?,
            created_at: row.try_get("created_at")?,
            resolved_at: row.try_get("resolved_at")?,
        })
    }

    fn into_request(self) -> Result<CheckpointApprovalRequest, RepositoryError> {
        let confidence: Confidence =
            serde_json::from_value(serde_json::Value::String(self.confidence.clone()))
                .map_err(|_| {
                    RepositoryError::Query(format!("invalid confidence: {}", self.confidence))
                })?;
        let urgency: Urgency = self.urgency.parse().map_err(RepositoryError::Query)?;
        let status: ApprovalStatus = self.status.parse().map_err(RepositoryError::Query)?;

        Ok(CheckpointApprovalRequest {
            id: parse_uuid(&self.id)?,
            approvable: ApprovableRef {
                approvable_type: self.approvable_type,
                approvable_id: self.approvable_id,
            },
            team_id: self.team_id,
            workflow_type: self.workflow_type,
            node_id: self.node_id,
            preview: self.preview,
            confidence,
            confidence_score: self.confidence_score,
            urgency,
            status,
            approver_id: self.approver_id,
            created_at: parse_datetime(&self.created_at)?,
            resolved_at: self.resolved_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

fn decode_rows(
    rows: &[sqlx::sqlite::SqliteRow],
) -> Result<Vec<CheckpointApprovalRequest>, RepositoryError> {
    rows.iter()
        .map(|row| ApprovalRow::from_row(row).map_err(query_error)?.into_request())
        .collect()
}

// ---------------------------------------------------------------------------
// ApprovalInbox impl
// ---------------------------------------------------------------------------

impl ApprovalInbox for SqliteApprovalInbox {
    async fn create(&self, request: &CheckpointApprovalRequest) -> Result<Uuid, RepositoryError> {
        sqlx::query(
            r#"INSERT INTO checkpoint_approvals
               (id, approvable_type, approvable_id, team_id, workflow_type, node_id, preview,
                confidence, confidence_score, urgency, status, approver_id, created_at, resolved_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(request.id.to_string())
        .bind(&request.approvable.approvable_type)
        .bind(&request.approvable.approvable_id)
        .bind(&request.team_id)
        .bind(&request.workflow_type)
        .bind(&request.node_id)
        .bind(&request.preview)
        .bind(request.confidence.to_string())
        .bind(request.confidence_score)
        .bind(request.urgency.to_string())
        .bind(request.status.to_string())
        .bind(&request.approver_id)
        .bind(format_datetime(&request.created_at))
        .bind(request.resolved_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        tracing::info!(
            ticket_id = %request.id,
            approvable_id = %request.approvable.approvable_id,
            node_id = %request.node_id,
            urgency = %request.urgency,
            "approval requested"
        );
        Ok(request.id)
    }

    async fn pending_for(
        &self,
        approvable: &ApprovableRef,
    ) -> Result<Option<CheckpointApprovalRequest>, RepositoryError> {
        let row = sqlx::query(
            r#"SELECT * FROM checkpoint_approvals
               WHERE approvable_type = ? AND approvable_id = ? AND status = 'pending'
               ORDER BY created_at DESC LIMIT 1"#,
        )
        .bind(&approvable.approvable_type)
        .bind(&approvable.approvable_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = ApprovalRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_request()?))
            }
            None => Ok(None),
        }
    }

    async fn resolve(
        &self,
        ticket_id: &Uuid,
        status: ApprovalStatus,
        approver_id: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE checkpoint_approvals
               SET status = ?, approver_id = ?, resolved_at = ?
               WHERE id = ? AND status = 'pending'"#,
        )
        .bind(status.to_string())
        .bind(approver_id)
        .bind(format_datetime(&Utc::now()))
        .bind(ticket_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        tracing::debug!(%ticket_id, %status, approver_id, "approval resolved");
        Ok(())
    }

    async fn list_pending(
        &self,
        team_id: Option<&str>,
    ) -> Result<Vec<CheckpointApprovalRequest>, RepositoryError> {
        let rows = match team_id {
            Some(team_id) => {
                sqlx::query(
                    "SELECT * FROM checkpoint_approvals WHERE status = 'pending' AND team_id = ? ORDER BY created_at ASC",
                )
                .bind(team_id)
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT * FROM checkpoint_approvals WHERE status = 'pending' ORDER BY created_at ASC",
                )
                .fetch_all(&self.pool.reader)
                .await
            }
        }
        .map_err(query_error)?;

        decode_rows(&rows)
    }
}
