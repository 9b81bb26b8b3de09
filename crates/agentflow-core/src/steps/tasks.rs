//! Task breakdown for approved deliverables.

use serde_json::{Value, json};

use super::deliverables::DELIVERABLES_KEY;
use crate::workflow::step::{StepError, StepHandler, StepInput, StepOutput};

/// Results key holding the task list.
pub const TASKS_KEY: &str = "task_breakdown";

/// Delivery phases and their share of the deliverable's hours.
const PHASES: [(&str, f64); 5] = [
    ("Brief and research", 0.15),
    ("Draft", 0.35),
    ("Internal review", 0.15),
    ("Client review", 0.15),
    ("Finalise", 0.2),
];

const FALLBACK_HOURS: f64 = 8.0;

/// Splits each chosen deliverable into phased tasks.
///
/// Uses the reviewer's approved items when present, else the recommended
/// alternative.
#[derive(Debug, Default)]
pub struct TaskBreakdownStep;

fn chosen_deliverables(input: &StepInput) -> Vec<(String, f64)> {
    let alternatives = input
        .result(DELIVERABLES_KEY)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let hours_for = |title: &str| {
        alternatives
            .iter()
            .find(|a| a["title"] == title)
            .and_then(|a| a["estimated_hours"].as_f64())
            .unwrap_or(FALLBACK_HOURS)
    };

    if let Some(items) = input.approved_items() {
        return items
            .iter()
            .filter_map(|item| match item {
                Value::String(title) => Some((title.clone(), hours_for(title.as_str()))),
                Value::Object(map) => {
                    let title = map.get("title")?.as_str()?.to_string();
                    let hours = map
                        .get("estimated_hours")
                        .and_then(Value::as_f64)
                        .unwrap_or_else(|| hours_for(title.as_str()));
                    Some((title, hours))
                }
                _ => None,
            })
            .collect();
    }

    alternatives
        .iter()
        .find(|a| a["recommended"] == true)
        .or_else(|| alternatives.first())
        .and_then(|a| {
            let title = a["title"].as_str()?.to_string();
            Some((title, a["estimated_hours"].as_f64().unwrap_or(FALLBACK_HOURS)))
        })
        .into_iter()
        .collect()
}

impl StepHandler for TaskBreakdownStep {
    fn name(&self) -> &str {
        "task_breakdown"
    }

    async fn execute(&self, input: &StepInput) -> Result<StepOutput, StepError> {
        let deliverables = chosen_deliverables(input);
        if deliverables.is_empty() {
            return Ok(StepOutput::default()
                .with_field("task_count", json!(0))
                .with_result(TASKS_KEY, json!([]))
                .degraded("no deliverable to break down"));
        }

        let mut tasks = Vec::new();
        for (title, hours) in &deliverables {
            for (phase, share) in PHASES {
                let order = tasks.len() + 1;
                tasks.push(json!({
                    "order": order,
                    "title": format!("{phase}: {title}"),
                    "deliverable": title,
                    "phase": phase,
                    "estimated_hours": (hours * share * 2.0).round() / 2.0,
                }));
            }
        }
        let total_hours: f64 = tasks
            .iter()
            .filter_map(|t| t["estimated_hours"].as_f64())
            .sum();

        Ok(StepOutput::default()
            .with_field("task_count", json!(tasks.len()))
            .with_field("total_hours", json!(total_hours))
            .with_field(
                "deliverables",
                json!(deliverables.iter().map(|(t, _)| t).collect::<Vec<_>>()),
            )
            .with_result(TASKS_KEY, Value::Array(tasks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::fixtures::step_input;
    use agentflow_types::approval::ApprovalData;
    use chrono::Utc;

    fn with_alternatives() -> StepInput {
        let mut input = step_input("task_breakdown", json!({}));
        input.results.insert(
            DELIVERABLES_KEY.to_string(),
            json!([
                {"title": "Wordmark", "estimated_hours": 20.0, "recommended": true},
                {"title": "Monogram", "estimated_hours": 10.0, "recommended": false},
            ]),
        );
        input
    }

    fn approve(items: Vec<Value>) -> ApprovalData {
        ApprovalData {
            approved: true,
            approver_id: "pm".to_string(),
            approved_items: Some(items),
            node_id: "draft_deliverables".to_string(),
            decided_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_recommended_alternative_by_default() {
        let output = TaskBreakdownStep.execute(&with_alternatives()).await.unwrap();

        let tasks = output.results[TASKS_KEY].as_array().unwrap();
        assert_eq!(tasks.len(), PHASES.len());
        assert_eq!(tasks[0]["title"], json!("Brief and research: Wordmark"));
        assert_eq!(tasks[1]["estimated_hours"], json!(7.0));
        assert_eq!(output.data["total_hours"], json!(20.0));
    }

    #[tokio::test]
    async fn test_approved_items_drive_breakdown() {
        let mut input = with_alternatives();
        input.approval = Some(approve(vec![json!("Monogram"), json!({"title": "Poster", "estimated_hours": 4})]));

        let output = TaskBreakdownStep.execute(&input).await.unwrap();
        assert_eq!(output.data["deliverables"], json!(["Monogram", "Poster"]));
        assert_eq!(output.data["task_count"], json!(10));
        assert_eq!(output.results[TASKS_KEY][9]["order"], json!(10));
    }

    #[tokio::test]
    async fn test_nothing_to_break_down_degrades() {
        let output = TaskBreakdownStep
            .execute(&step_input("task_breakdown", json!({})))
            .await
            .unwrap();
        assert!(output.degraded);
    }
}
