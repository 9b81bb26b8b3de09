//! Builtin step handlers for the PM-copilot workflows.
//!
//! Handlers are deterministic over their input. When a text-generation
//! provider is configured, the ones that write prose also ask it for a
//! narrative; a generation failure fails the node.

pub mod communication;
pub mod deliverables;
pub mod insights;
pub mod tasks;
pub mod tool_call;
pub mod work_order;

use std::sync::Arc;

use crate::llm::box_provider::BoxTextGenerationProvider;
use crate::llm::provider::{GenerationError, GenerationRequest};
use crate::routing::{AssignmentStep, CandidateScoringStep};
use crate::workflow::registry::StepRegistry;
use crate::workflow::step::StepInput;

pub use communication::CommunicationDrafterStep;
pub use deliverables::DeliverableDrafterStep;
pub use insights::ProjectInsightsStep;
pub use tasks::TaskBreakdownStep;
pub use tool_call::ToolCallStep;
pub use work_order::WorkOrderAnalysisStep;

/// Results key written by the work-order analysis.
pub const ANALYSIS_KEY: &str = "analysis";

/// Used when neither the node nor the trigger sets `hourly_rate`.
pub const DEFAULT_HOURLY_RATE: f64 = 100.0;

/// Billing rate for effort estimates: node param, then trigger input.
pub(crate) fn hourly_rate(input: &StepInput) -> f64 {
    input
        .params
        .get("hourly_rate")
        .or_else(|| input.input_field("hourly_rate"))
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(DEFAULT_HOURLY_RATE)
}

/// Optional prose generation shared by the builtin handlers.
#[derive(Debug, Clone, Default)]
pub struct Narrator {
    provider: Option<Arc<BoxTextGenerationProvider>>,
}

impl Narrator {
    pub fn new(provider: Option<Arc<BoxTextGenerationProvider>>) -> Self {
        Self { provider }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// `Ok(None)` when no provider is configured.
    pub async fn narrate(
        &self,
        system: &str,
        prompt: String,
    ) -> Result<Option<String>, GenerationError> {
        let Some(provider) = &self.provider else {
            return Ok(None);
        };
        let completion = provider
            .generate(&GenerationRequest::new(prompt).with_system(system))
            .await?;
        tracing::debug!(
            provider = provider.name(),
            model = %completion.model,
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            "generated narrative"
        );
        Ok(Some(completion.text.trim().to_string()))
    }
}

/// Registry with every builtin handler except `tool_call`, which needs a
/// gateway and is registered by the caller.
pub fn builtin_registry(provider: Option<Arc<BoxTextGenerationProvider>>) -> StepRegistry {
    let narrator = Narrator::new(provider);
    let mut registry = StepRegistry::new();
    registry
        .register(WorkOrderAnalysisStep::new(narrator.clone()))
        .register(ProjectInsightsStep::new(narrator.clone()))
        .register(DeliverableDrafterStep::new(narrator.clone()))
        .register(TaskBreakdownStep)
        .register(CommunicationDrafterStep::new(narrator))
        .register(CandidateScoringStep)
        .register(AssignmentStep);
    registry
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::{Completion, TextGenerationProvider};

    struct Canned;

    impl TextGenerationProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<Completion, GenerationError> {
            Ok(Completion {
                text: format!("  narrative for {} chars  ", request.prompt.len()),
                model: "canned-1".to_string(),
                input_tokens: 1,
                output_tokens: 1,
            })
        }
    }

    #[tokio::test]
    async fn test_narrator_without_provider_is_silent() {
        let narrator = Narrator::default();
        assert!(!narrator.is_enabled());
        assert!(narrator.narrate("sys", "hello".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_narrator_trims_completion() {
        let narrator = Narrator::new(Some(Arc::new(BoxTextGenerationProvider::new(Canned))));
        let text = narrator.narrate("sys", "hello".to_string()).await.unwrap();
        assert_eq!(text.as_deref(), Some("narrative for 5 chars"));
    }

    #[test]
    fn test_builtin_registry_names() {
        let registry = builtin_registry(None);
        for name in [
            "work_order_analysis",
            "project_insights",
            "deliverable_drafter",
            "task_breakdown",
            "communication_drafter",
            "candidate_scoring",
            "assignment_finalizer",
        ] {
            assert!(registry.contains(name), "missing {name}");
        }
        assert!(!registry.contains("tool_call"));
    }
}
