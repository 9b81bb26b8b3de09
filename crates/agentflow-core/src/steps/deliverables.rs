//! Deliverable drafting: proposes alternatives for review at a checkpoint.

use agentflow_types::approval::{Confidence, Suggestion};
use serde_json::{Map, Value, json};

use super::insights::INSIGHTS_KEY;
use super::work_order::base_hours;
use super::{ANALYSIS_KEY, Narrator, hourly_rate};
use crate::workflow::step::{StepError, StepHandler, StepInput, StepOutput};

/// Results key holding the proposed alternatives.
pub const DELIVERABLES_KEY: &str = "deliverable_alternatives";

/// Effort relative to the estimate, per alternative position.
const EFFORT_STEPS: [f64; 3] = [0.8, 1.0, 1.3];

const SYSTEM_PROMPT: &str = "You are a creative lead. In three sentences, explain the trade-offs \
    between the proposed deliverable alternatives.";

fn builtin_template(deliverable_type: &str) -> Option<&'static [&'static str]> {
    let titles: &'static [&'static str] = match deliverable_type {
        "logo" => &["Wordmark", "Icon with wordmark", "Monogram"],
        "website" => &["Single-page site", "Multi-page marketing site", "Site with CMS"],
        "campaign" => &["Social-first campaign", "Integrated campaign", "Email nurture sequence"],
        "report" => &["Executive summary", "Full report", "Slide deck"],
        _ => return None,
    };
    Some(titles)
}

/// Drafts deliverable alternatives from the analysis and a template for the
/// deliverable type. Node param `templates` (type -> list of titles)
/// extends or overrides the builtin templates.
#[derive(Debug, Default)]
pub struct DeliverableDrafterStep {
    narrator: Narrator,
}

impl DeliverableDrafterStep {
    pub fn new(narrator: Narrator) -> Self {
        Self { narrator }
    }

    fn template(input: &StepInput, deliverable_type: &str) -> Option<Vec<String>> {
        let custom = input
            .params
            .get("templates")
            .and_then(|t| t.get(deliverable_type))
            .and_then(Value::as_array)
            .map(|titles| {
                titles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|titles| !titles.is_empty());
        custom.or_else(|| {
            builtin_template(deliverable_type)
                .map(|titles| titles.iter().map(|t| t.to_string()).collect())
        })
    }
}

impl StepHandler for DeliverableDrafterStep {
    fn name(&self) -> &str {
        "deliverable_drafter"
    }

    async fn execute(&self, input: &StepInput) -> Result<StepOutput, StepError> {
        let empty = Value::Object(Map::new());
        let analysis = input.result(ANALYSIS_KEY).unwrap_or(&empty);
        let deliverable_type = analysis["deliverable_type"]
            .as_str()
            .or_else(|| input.input_str("deliverable_type"))
            .unwrap_or("general")
            .to_lowercase();
        let work_title = analysis["title"]
            .as_str()
            .or_else(|| input.input_str("title"))
            .unwrap_or("work order")
            .to_string();
        let hours = analysis["estimated_hours"]
            .as_f64()
            .unwrap_or_else(|| base_hours(&deliverable_type));
        let rate = hourly_rate(input);

        let template = Self::template(input, &deliverable_type);
        let titles = template
            .clone()
            .unwrap_or_else(|| vec![format!("Custom {deliverable_type} deliverable")]);

        let alternatives: Vec<Value> = titles
            .iter()
            .enumerate()
            .map(|(i, title)| {
                let effort = EFFORT_STEPS.get(i).copied().unwrap_or(1.5);
                let alt_hours = (hours * effort).round();
                json!({
                    "title": title,
                    "description": format!("{title} for '{work_title}'"),
                    "estimated_hours": alt_hours,
                    "estimated_cost": alt_hours * rate,
                    "recommended": i == 0,
                })
            })
            .collect();

        let recommended_cost = alternatives[0]["estimated_cost"].as_f64().unwrap_or(0.0);
        let over_budget = input
            .input_field("budget")
            .and_then(Value::as_f64)
            .is_some_and(|budget| recommended_cost > budget);
        let flagged = input
            .input_field("budget_change")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let score = match analysis["complexity"].as_str() {
            Some("low") => 0.9,
            Some("medium") => 0.85,
            Some("high") => 0.7,
            _ => 0.6,
        };
        let suggestion = Suggestion {
            confidence: Confidence::from_score(score),
            confidence_score: score,
            has_budget_impact: over_budget || flagged,
        };

        let preview = format!(
            "{} deliverable alternative(s) for '{work_title}' (recommended: {}, ${recommended_cost:.0})",
            alternatives.len(),
            titles[0],
        );

        let mut output = StepOutput::default()
            .with_field("deliverable_type", json!(deliverable_type))
            .with_field("alternatives", json!(alternatives))
            .with_field("over_budget", json!(over_budget))
            .with_result(DELIVERABLES_KEY, json!(alternatives))
            .with_suggestion(suggestion)
            .with_preview(preview);
        if let Some(insights) = input.result(INSIGHTS_KEY).and_then(Value::as_array) {
            output = output.with_field("insights_considered", json!(insights.len()));
        }

        let prompt = format!(
            "{}\n\n## Alternatives\n\n{}",
            input.context_prompt(),
            titles.join("\n")
        );
        if let Some(rationale) = self.narrator.narrate(SYSTEM_PROMPT, prompt).await? {
            output = output.with_field("rationale", json!(rationale));
        }

        if template.is_none() {
            return Ok(output.degraded(format!("no template for '{deliverable_type}'")));
        }
        Ok(output)
    }
}
