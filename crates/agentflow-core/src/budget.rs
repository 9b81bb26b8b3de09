//! Spend gating for budget-consuming workflow steps.
//!
//! The engine asks a `BudgetGuard` before every node with a non-zero
//! estimated cost. Limits are passed in explicitly; the guard owns only the
//! spend ledger.

use agentflow_types::config::BudgetLimits;
use agentflow_types::error::RepositoryError;

/// One recorded spend.
#[derive(Debug, Clone, PartialEq)]
pub struct SpendRecord {
    pub team_id: String,
    pub workflow_type: String,
    pub node_id: String,
    /// USD.
    pub amount: f64,
}

/// Shared daily/monthly spend counters.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait BudgetGuard: Send + Sync {
    /// Whether spending `estimated_cost` more keeps the team within `limits`.
    fn can_run(
        &self,
        team_id: &str,
        limits: &BudgetLimits,
        estimated_cost: f64,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Add to the ledger after a costed node ran.
    fn record_spend(
        &self,
        record: &SpendRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}

/// Pure limit check shared by guard implementations.
pub fn within_limits(limits: &BudgetLimits, spent_today: f64, spent_month: f64, estimate: f64) -> bool {
    let daily_ok = limits
        .daily_limit
        .is_none_or(|limit| spent_today + estimate <= limit);
    let monthly_ok = limits
        .monthly_limit
        .is_none_or(|limit| spent_month + estimate <= limit);
    daily_ok && monthly_ok
}
