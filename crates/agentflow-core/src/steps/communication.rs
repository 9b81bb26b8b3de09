//! Client communication drafts.

use agentflow_types::approval::{Confidence, Suggestion};
use serde_json::{Value, json};

use super::Narrator;
use crate::workflow::step::{StepError, StepHandler, StepInput, StepOutput};

/// Results key holding the draft message.
pub const DRAFT_KEY: &str = "communication_draft";

const SYSTEM_PROMPT: &str = "You write concise, friendly client emails on behalf of a project \
    manager. Reply with the email body only.";

fn subject_template(message_type: &str) -> Option<&'static str> {
    match message_type {
        "status_update" => Some("Project update: {project}"),
        "delivery" => Some("Your {project} deliverables are ready"),
        "approval_request" => Some("Approval needed: {project}"),
        _ => None,
    }
}

fn opening(message_type: &str) -> &'static str {
    match message_type {
        "status_update" => "Here is where things stand:",
        "delivery" => "Everything is ready for you to review:",
        "approval_request" => "We need your sign-off on the following:",
        _ => "A quick note from the team:",
    }
}

/// Drafts a client message from bullet points. With a provider configured
/// the body is generated and confidence drops to medium so a human reads
/// it first. Mentions of money always need review.
#[derive(Debug, Default)]
pub struct CommunicationDrafterStep {
    narrator: Narrator,
}

impl CommunicationDrafterStep {
    pub fn new(narrator: Narrator) -> Self {
        Self { narrator }
    }
}

impl StepHandler for CommunicationDrafterStep {
    fn name(&self) -> &str {
        "communication_drafter"
    }

    async fn execute(&self, input: &StepInput) -> Result<StepOutput, StepError> {
        let message_type = input.input_str("message_type").unwrap_or("status_update");
        let points: Vec<&str> = input
            .input_field("points")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if points.is_empty() {
            return Err(StepError::InvalidInput(
                "communication needs at least one point".to_string(),
            ));
        }

        let ctx = &input.agent_context;
        let project = ctx
            .project_context
            .get("name")
            .and_then(Value::as_str)
            .or_else(|| input.input_str("title"))
            .unwrap_or("your project");
        let recipient = ctx
            .client_context
            .get("contact")
            .or_else(|| ctx.client_context.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("there");

        let template = subject_template(message_type);
        let subject = input
            .input_str("subject")
            .map(str::to_string)
            .unwrap_or_else(|| {
                template
                    .unwrap_or("Update on {project}")
                    .replace("{project}", project)
            });

        let bullets = points
            .iter()
            .map(|p| format!("- {p}"))
            .collect::<Vec<_>>()
            .join("\n");
        let generated = self
            .narrator
            .narrate(
                SYSTEM_PROMPT,
                format!(
                    "{}\n\n## Message\n\nType: {message_type}\nRecipient: {recipient}\n\n{bullets}",
                    input.context_prompt()
                ),
            )
            .await?;
        let (body, score) = match generated {
            Some(body) => (body, 0.65),
            None => (
                format!(
                    "Hi {recipient},\n\n{}\n{bullets}\n\nBest regards",
                    opening(message_type)
                ),
                0.85,
            ),
        };

        let mentions_money = points
            .iter()
            .any(|p| p.contains('$') || p.to_lowercase().contains("budget"));
        let draft = json!({
            "message_type": message_type,
            "recipient": recipient,
            "subject": subject,
            "body": body,
        });
        let output = StepOutput::default()
            .with_field("subject", json!(subject))
            .with_field("generated", json!(score < 0.8))
            .with_result(DRAFT_KEY, draft)
            .with_suggestion(Suggestion {
                confidence: Confidence::from_score(score),
                confidence_score: score,
                has_budget_impact: mentions_money,
            })
            .with_preview(format!("Email to {recipient}: {subject}"));

        if template.is_none() {
            return Ok(output.degraded(format!("no template for message type '{message_type}'")));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::fixtures::step_input;

    #[tokio::test]
    async fn test_status_update_from_template() {
        let input = step_input(
            "draft_message",
            json!({
                "message_type": "status_update",
                "points": ["Logo drafts done", "Review on Friday"],
                "client": {"contact": "Dana"},
                "project": {"name": "Rebrand"},
            }),
        );
        let output = CommunicationDrafterStep::default().execute(&input).await.unwrap();

        let draft = &output.results[DRAFT_KEY];
        assert_eq!(draft["subject"], json!("Project update: Rebrand"));
        assert!(draft["body"].as_str().unwrap().starts_with("Hi Dana,"));
        assert!(draft["body"].as_str().unwrap().contains("- Review on Friday"));
        let suggestion = output.suggestion.unwrap();
        assert_eq!(suggestion.confidence, Confidence::High);
        assert!(!suggestion.has_budget_impact);
    }

    #[tokio::test]
    async fn test_money_needs_review() {
        let input = step_input(
            "draft_message",
            json!({"points": ["Extra round costs $400"]}),
        );
        let output = CommunicationDrafterStep::default().execute(&input).await.unwrap();
        assert!(output.suggestion.unwrap().has_budget_impact);
    }

    #[tokio::test]
    async fn test_unknown_type_degrades() {
        let input = step_input(
            "draft_message",
            json!({"message_type": "newsletter", "points": ["Hello"]}),
        );
        let output = CommunicationDrafterStep::default().execute(&input).await.unwrap();
        assert!(output.degraded);
        assert_eq!(output.results[DRAFT_KEY]["subject"], json!("Update on your project"));
    }

    #[tokio::test]
    async fn test_no_points_is_invalid() {
        let err = CommunicationDrafterStep::default()
            .execute(&step_input("draft_message", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::InvalidInput(_)));
    }
}
