//! SQLite spend ledger behind `BudgetGuard`.
//!
//! Every costed node appends a row to `agent_spend`. `can_run` sums the
//! team's spend for the current UTC day and month and checks the estimate
//! against the limits the caller passes in.

use agentflow_core::budget::{BudgetGuard, SpendRecord, within_limits};
use agentflow_types::config::BudgetLimits;
use agentflow_types::error::RepositoryError;
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};

use super::pool::DatabasePool;
use super::{format_datetime, query_error};

/// A team's spend in the current day and month, USD.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpendSummary {
    pub today: f64,
    pub month: f64,
}

/// SQLite-backed implementation of `BudgetGuard`.
pub struct SqliteBudgetGuard {
    pool: DatabasePool,
}

impl SqliteBudgetGuard {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Spend for `team_id` in the UTC day and month containing `now`.
    pub async fn spend_summary(
        &self,
        team_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SpendSummary, RepositoryError> {
        let today = now.date_naive();
        let day_start = today.and_time(NaiveTime::MIN).and_utc();
        let month_start = day_start - Duration::days(i64::from(today.day0()));

        Ok(SpendSummary {
            today: self.spent_since(team_id, day_start).await?,
            month: self.spent_since(team_id, month_start).await?,
        })
    }

    async fn spent_since(&self, team_id: &str, since: DateTime<Utc>) -> Result<f64, RepositoryError> {
        let (total,): (f64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount), 0.0) FROM agent_spend WHERE team_id = ? AND spent_at >= ?",
        )
        .bind(team_id)
        .bind(format_datetime(&since))
        .fetch_one(&self.pool.reader)
        .await
        .map_err(query_error)?;
        Ok(total)
    }

    async fn insert_spend(&self, record: &SpendRecord, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        if !record.amount.is_finite() || record.amount < 0.0 {
            return Err(RepositoryError::Query(format!(
                "invalid spend amount {}",
                record.amount
            )));
        }
        sqlx::query(
            "INSERT INTO agent_spend (team_id, workflow_type, node_id, amount, spent_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.team_id)
        .bind(&record.workflow_type)
        .bind(&record.node_id)
        .bind(record.amount)
        .bind(format_datetime(&at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;
        Ok(())
    }
}

impl BudgetGuard for SqliteBudgetGuard {
    async fn can_run(
        &self,
        team_id: &str,
        limits: &BudgetLimits,
        estimated_cost: f64,
    ) -> Result<bool, RepositoryError> {
        if limits.daily_limit.is_none() && limits.monthly_limit.is_none() {
            return Ok(true);
        }
        let spent = self.spend_summary(team_id, Utc::now()).await?;
        let allowed = within_limits(limits, spent.today, spent.month, estimated_cost);
        if !allowed {
            tracing::warn!(
                team_id,
                spent_today = spent.today,
                spent_month = spent.month,
                estimated_cost,
                "budget limit reached"
            );
        }
        Ok(allowed)
    }

    async fn record_spend(&self, record: &SpendRecord) -> Result<(), RepositoryError> {
        self.insert_spend(record, Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::test_pool;
    use chrono::TimeZone;

    fn spend(team_id: &str, amount: f64) -> SpendRecord {
        SpendRecord {
            team_id: team_id.to_string(),
            workflow_type: "pm-copilot".to_string(),
            node_id: "draft_deliverables".to_string(),
            amount,
        }
    }

    #[tokio::test]
    async fn test_summary_splits_day_and_month() {
        let (pool, _dir) = test_pool().await;
        let guard = SqliteBudgetGuard::new(pool);
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();

        guard.insert_spend(&spend("team-a", 1.5), now).await.unwrap();
        guard
            .insert_spend(&spend("team-a", 2.0), now - Duration::days(3))
            .await
            .unwrap();
        // Previous month.
        guard
            .insert_spend(&spend("team-a", 9.0), now - Duration::days(20))
            .await
            .unwrap();
        guard.insert_spend(&spend("team-b", 4.0), now).await.unwrap();

        let summary = guard.spend_summary("team-a", now).await.unwrap();
        assert_eq!(summary, SpendSummary { today: 1.5, month: 3.5 });
    }

    #[tokio::test]
    async fn test_can_run_against_daily_limit() {
        let (pool, _dir) = test_pool().await;
        let guard = SqliteBudgetGuard::new(pool);
        let limits = BudgetLimits {
            daily_limit: Some(1.0),
            monthly_limit: None,
        };

        assert!(guard.can_run("team-a", &limits, 0.5).await.unwrap());
        guard.record_spend(&spend("team-a", 0.75)).await.unwrap();
        assert!(!guard.can_run("team-a", &limits, 0.5).await.unwrap());
        assert!(guard.can_run("team-b", &limits, 0.5).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlimited_skips_ledger() {
        let (pool, _dir) = test_pool().await;
        let guard = SqliteBudgetGuard::new(pool);
        guard.record_spend(&spend("team-a", 1_000.0)).await.unwrap();
        assert!(
            guard
                .can_run("team-a", &BudgetLimits::default(), 50.0)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_negative_spend_rejected() {
        let (pool, _dir) = test_pool().await;
        let guard = SqliteBudgetGuard::new(pool);
        let err = guard.record_spend(&spend("team-a", -1.0)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Query(_)));
    }
}
