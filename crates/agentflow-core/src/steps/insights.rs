//! Project insights: risks and context notes gathered before drafting.

use serde_json::{Value, json};

use super::{ANALYSIS_KEY, Narrator, hourly_rate};
use crate::workflow::step::{StepError, StepHandler, StepInput, StepOutput};

/// Results key holding the insight list.
pub const INSIGHTS_KEY: &str = "project_insights";

const SYSTEM_PROMPT: &str = "You are a delivery lead. Given the context and the listed risks, \
    write a short paragraph of advice for the team.";

#[derive(Debug, Default)]
pub struct ProjectInsightsStep {
    narrator: Narrator,
}

impl ProjectInsightsStep {
    pub fn new(narrator: Narrator) -> Self {
        Self { narrator }
    }

    fn collect(input: &StepInput, analysis: &Value) -> Vec<String> {
        let mut insights = Vec::new();

        if analysis["complexity"] == "high" {
            insights.push(
                "High complexity: plan an internal review before the client sees drafts."
                    .to_string(),
            );
        }
        if let Some(days) = analysis["days_until_deadline"].as_i64().filter(|d| *d < 7) {
            insights.push(format!(
                "Deadline in {days} day(s): book client review time now."
            ));
        }
        if let (Some(hours), Some(budget)) = (
            analysis["estimated_hours"].as_f64(),
            input.input_field("budget").and_then(Value::as_f64),
        ) {
            let cost = hours * hourly_rate(input);
            if cost > budget {
                insights.push(format!(
                    "Estimated effort (${cost:.0}) exceeds the budget (${budget:.0})."
                ));
            }
        }
        if let Some(preferences) = input
            .agent_context
            .client_context
            .get("preferences")
            .and_then(Value::as_str)
        {
            insights.push(format!("Client preferences: {preferences}"));
        }
        if let Some(previous) = input
            .agent_context
            .project_context
            .get("previous_deliverables")
            .and_then(Value::as_array)
            .filter(|items| !items.is_empty())
        {
            insights.push(format!(
                "{} earlier deliverable(s) on this project can be reused.",
                previous.len()
            ));
        }

        if insights.is_empty() {
            insights.push("No risks identified from the work order.".to_string());
        }
        insights
    }
}

impl StepHandler for ProjectInsightsStep {
    fn name(&self) -> &str {
        "project_insights"
    }

    async fn execute(&self, input: &StepInput) -> Result<StepOutput, StepError> {
        let Some(analysis) = input.result(ANALYSIS_KEY) else {
            return Ok(StepOutput::default()
                .with_field("insights", json!([]))
                .with_result(INSIGHTS_KEY, json!([]))
                .degraded("work order analysis missing"));
        };

        let insights = Self::collect(input, analysis);
        let mut output = StepOutput::default()
            .with_field("insights", json!(insights))
            .with_result(INSIGHTS_KEY, json!(insights));

        let prompt = format!(
            "{}\n\n## Risks\n\n{}",
            input.context_prompt(),
            insights
                .iter()
                .map(|i| format!("- {i}"))
                .collect::<Vec<_>>()
                .join("\n")
        );
        if let Some(advice) = self.narrator.narrate(SYSTEM_PROMPT, prompt).await? {
            output = output.with_field("advice", json!(advice));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::fixtures::step_input;

    #[tokio::test]
    async fn test_budget_overrun_and_client_preferences() {
        let mut input = step_input(
            "insights",
            json!({
                "budget": 1000,
                "client": {"preferences": "muted colours"},
            }),
        );
        input.results.insert(
            ANALYSIS_KEY.to_string(),
            json!({"complexity": "high", "estimated_hours": 30.0, "days_until_deadline": 3}),
        );

        let output = ProjectInsightsStep::default().execute(&input).await.unwrap();
        let insights = output.results[INSIGHTS_KEY].as_array().unwrap();
        assert_eq!(insights.len(), 4);
        assert!(insights[1].as_str().unwrap().starts_with("Deadline in 3"));
        assert!(insights[2].as_str().unwrap().contains("$3000"));
        assert_eq!(insights[3], json!("Client preferences: muted colours"));
    }

    #[tokio::test]
    async fn test_quiet_order_has_placeholder_insight() {
        let mut input = step_input("insights", json!({}));
        input.results.insert(
            ANALYSIS_KEY.to_string(),
            json!({"complexity": "low", "estimated_hours": 4.0}),
        );
        let output = ProjectInsightsStep::default().execute(&input).await.unwrap();
        assert_eq!(output.data["insights"].as_array().unwrap().len(), 1);
        assert!(!output.degraded);
    }

    #[tokio::test]
    async fn test_missing_analysis_degrades() {
        let output = ProjectInsightsStep::default()
            .execute(&step_input("insights", json!({})))
            .await
            .unwrap();
        assert!(output.degraded);
    }
}
