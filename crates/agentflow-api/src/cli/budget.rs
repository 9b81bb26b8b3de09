//! `agentflow budget` -- a team's spend against its limits.

use anyhow::Result;
use chrono::Utc;
use console::style;

use crate::state::AppState;

pub async fn handle_budget(team: &str, state: &AppState, json: bool) -> Result<()> {
    let limits = state.config.budget_for(team);
    let spent = state.spend_ledger().spend_summary(team, Utc::now()).await?;

    if json {
        let out = serde_json::json!({
            "team_id": team,
            "spent_today": spent.today,
            "spent_month": spent.month,
            "daily_limit": limits.daily_limit,
            "monthly_limit": limits.monthly_limit,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  {} {}", style("Budget").bold(), style(team).cyan());
    println!("  Today:      {}", usage(spent.today, limits.daily_limit));
    println!("  This month: {}", usage(spent.month, limits.monthly_limit));
    println!();
    Ok(())
}

fn usage(spent: f64, limit: Option<f64>) -> String {
    match limit {
        None => format!("${spent:.2} (no limit)"),
        Some(limit) => {
            let text = format!("${spent:.2} of ${limit:.2}");
            if spent >= limit {
                style(text).red().to_string()
            } else {
                text
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_without_limit() {
        assert_eq!(usage(3.5, None), "$3.50 (no limit)");
    }

    #[test]
    fn test_usage_under_limit() {
        assert_eq!(usage(1.0, Some(10.0)), "$1.00 of $10.00");
    }
}
