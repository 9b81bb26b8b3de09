//! Work-order analysis: the first node of the PM-copilot workflow.

use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value, json};

use super::{ANALYSIS_KEY, Narrator};
use crate::workflow::step::{StepError, StepHandler, StepInput, StepOutput};

const RESEARCH_TERMS: &[&str] = &["research", "market", "competitor", "strategy", "audience"];

const SYSTEM_PROMPT: &str = "You are a project manager's assistant. Summarise the work order \
    in two sentences for the delivery team.";

/// Baseline effort per deliverable type, in hours.
pub(crate) fn base_hours(deliverable_type: &str) -> f64 {
    match deliverable_type {
        "logo" => 20.0,
        "website" => 80.0,
        "campaign" => 40.0,
        "report" => 16.0,
        _ => 24.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    fn assess(word_count: usize, days_left: Option<i64>) -> Self {
        if word_count > 150 || days_left.is_some_and(|d| d < 7) {
            Self::High
        } else if word_count > 50 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    fn effort_factor(self) -> f64 {
        match self {
            Self::Low => 0.75,
            Self::Medium => 1.0,
            Self::High => 1.5,
        }
    }
}

/// Classifies a work order: deliverable type, complexity, effort, and
/// whether project insights should run before drafting.
#[derive(Debug, Default)]
pub struct WorkOrderAnalysisStep {
    narrator: Narrator,
}

impl WorkOrderAnalysisStep {
    pub fn new(narrator: Narrator) -> Self {
        Self { narrator }
    }
}

impl StepHandler for WorkOrderAnalysisStep {
    fn name(&self) -> &str {
        "work_order_analysis"
    }

    async fn execute(&self, input: &StepInput) -> Result<StepOutput, StepError> {
        let title = input.input_str("title").unwrap_or_default();
        let description = input.input_str("description").unwrap_or_default();
        let deliverable_type = input
            .input_str("deliverable_type")
            .unwrap_or("general")
            .to_lowercase();

        let days_left = match input.input_str("deadline") {
            Some(raw) => Some(
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|e| StepError::InvalidInput(format!("deadline '{raw}': {e}")))?
                    .signed_duration_since(Utc::now().date_naive())
                    .num_days(),
            ),
            None => None,
        };

        let word_count = description.split_whitespace().count();
        let complexity = Complexity::assess(word_count, days_left);
        let lowered = description.to_lowercase();
        let requires_insights = match input.input_field("requires_insights") {
            Some(Value::Bool(explicit)) => *explicit,
            _ => complexity == Complexity::High || RESEARCH_TERMS.iter().any(|t| lowered.contains(t)),
        };
        let estimated_hours = (base_hours(&deliverable_type) * complexity.effort_factor()).round();

        let mut analysis = Map::new();
        analysis.insert("title".to_string(), json!(title));
        analysis.insert("deliverable_type".to_string(), json!(deliverable_type));
        analysis.insert("complexity".to_string(), json!(complexity.as_str()));
        analysis.insert("requires_insights".to_string(), json!(requires_insights));
        analysis.insert("estimated_hours".to_string(), json!(estimated_hours));
        analysis.insert("word_count".to_string(), json!(word_count));
        if let Some(days) = days_left {
            analysis.insert("days_until_deadline".to_string(), json!(days));
        }

        if let Some(summary) = self
            .narrator
            .narrate(
                SYSTEM_PROMPT,
                format!(
                    "{}\n\n## Work Order\n\nTitle: {title}\n\n{description}",
                    input.context_prompt()
                ),
            )
            .await?
        {
            analysis.insert("summary".to_string(), json!(summary));
        }

        let output = StepOutput::new(analysis.clone())
            .with_result(ANALYSIS_KEY, Value::Object(analysis));
        if title.is_empty() && description.is_empty() {
            return Ok(output.degraded("work order has no title or description"));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::fixtures::step_input;

    async fn analyse(input: Value) -> StepOutput {
        WorkOrderAnalysisStep::default()
            .execute(&step_input("analyze", input))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_short_logo_order_is_low_complexity() {
        let output = analyse(json!({
            "title": "New logo",
            "description": "Refresh the wordmark for the spring launch.",
            "deliverable_type": "Logo",
        }))
        .await;

        assert_eq!(output.data["deliverable_type"], json!("logo"));
        assert_eq!(output.data["complexity"], json!("low"));
        assert_eq!(output.data["requires_insights"], json!(false));
        assert_eq!(output.data["estimated_hours"], json!(15.0));
        assert_eq!(output.results[ANALYSIS_KEY], Value::Object(output.data.clone()));
        assert!(!output.degraded);
    }

    #[tokio::test]
    async fn test_research_terms_request_insights() {
        let output = analyse(json!({
            "title": "Positioning",
            "description": "Competitor review ahead of the campaign.",
        }))
        .await;
        assert_eq!(output.data["requires_insights"], json!(true));
    }

    #[tokio::test]
    async fn test_explicit_flag_wins() {
        let output = analyse(json!({
            "title": "Positioning",
            "description": "Market research",
            "requires_insights": false,
        }))
        .await;
        assert_eq!(output.data["requires_insights"], json!(false));
    }

    #[tokio::test]
    async fn test_close_deadline_is_high_complexity() {
        let tomorrow = (Utc::now().date_naive() + chrono::Days::new(1)).format("%Y-%m-%d");
        let output = analyse(json!({
            "title": "Report",
            "description": "Quarterly numbers",
            "deliverable_type": "report",
            "deadline": tomorrow.to_string(),
        }))
        .await;
        assert_eq!(output.data["complexity"], json!("high"));
        assert_eq!(output.data["requires_insights"], json!(true));
    }

    #[tokio::test]
    async fn test_bad_deadline_is_invalid_input() {
        let err = WorkOrderAnalysisStep::default()
            .execute(&step_input("analyze", json!({"deadline": "soon"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_empty_order_degrades() {
        let output = analyse(json!({})).await;
        assert!(output.degraded);
        assert_eq!(output.data["deliverable_type"], json!("general"));
    }
}
