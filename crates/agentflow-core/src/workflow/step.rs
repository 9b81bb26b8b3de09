//! Step handler interface.
//!
//! Every workflow node is bound to a `StepHandler`. The engine hands it a
//! `StepInput` snapshot and folds the returned `StepOutput` into the run's
//! chain context. A handler is atomic from the engine's point of view: it
//! either returns an output or an error that fails the run.
//!
//! `StepHandler` uses RPITIT, so `BoxStepHandler` provides the type-erased
//! form stored in the registry (same blanket-impl pattern as
//! `BoxTextGenerationProvider`).

use std::future::Future;
use std::pin::Pin;

use agentflow_types::agent::AgentContext;
use agentflow_types::approval::{ApprovalData, Confidence, Suggestion};
use agentflow_types::chain::ChainContext;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::llm::provider::GenerationError;
use crate::tools::ToolError;

// ---------------------------------------------------------------------------
// Input / output
// ---------------------------------------------------------------------------

/// Everything a handler may read. Owned snapshot; handlers cannot mutate
/// run state directly.
#[derive(Debug, Clone)]
pub struct StepInput {
    pub state_id: Uuid,
    pub team_id: String,
    pub workflow_type: String,
    pub node_id: String,
    /// Index this step's output will be recorded under.
    pub step_index: usize,
    /// Trigger parameters.
    pub input: Value,
    pub chain: ChainContext,
    pub agent_context: AgentContext,
    /// The most recent checkpoint decision, once one has been made.
    pub approval: Option<ApprovalData>,
    /// Business result keys produced so far.
    pub results: Map<String, Value>,
    /// Node parameters from the workflow spec.
    pub params: Map<String, Value>,
}

impl StepInput {
    /// Look up a trigger parameter.
    pub fn input_field(&self, key: &str) -> Option<&Value> {
        self.input.get(key)
    }

    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.input.get(key).and_then(Value::as_str)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// A business result produced by an earlier step.
    pub fn result(&self, key: &str) -> Option<&Value> {
        self.results.get(key)
    }

    /// Items the reviewer approved at the last checkpoint, if any.
    pub fn approved_items(&self) -> Option<&[Value]> {
        self.approval
            .as_ref()
            .filter(|a| a.approved)
            .and_then(|a| a.approved_items.as_deref())
            .filter(|items| !items.is_empty())
    }

    /// Render the agent and chain contexts as one prompt preamble.
    pub fn context_prompt(&self) -> String {
        [self.agent_context.to_prompt_string(), self.chain.to_prompt_string()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// What a handler produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutput {
    /// Folded into the chain context under this step's index.
    pub data: Map<String, Value>,
    /// Merged into the top level of `state_data`.
    pub results: Map<String, Value>,
    /// Confidence of what this step proposes. Checkpoints without one are
    /// never auto-approved.
    pub suggestion: Option<Suggestion>,
    /// Short preview for the approval inbox.
    pub preview: Option<String>,
    /// Optional input was missing and the output is a best-effort fallback.
    pub degraded: bool,
}

impl StepOutput {
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_result(mut self, key: impl Into<String>, value: Value) -> Self {
        self.results.insert(key.into(), value);
        self
    }

    pub fn with_suggestion(mut self, suggestion: Suggestion) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = Some(preview.into());
        self
    }

    /// Mark as a fallback: recorded in the data and confidence capped at low.
    pub fn degraded(mut self, reason: impl Into<String>) -> Self {
        self.degraded = true;
        self.data.insert("degraded".to_string(), Value::Bool(true));
        self.data
            .insert("degraded_reason".to_string(), Value::String(reason.into()));
        if let Some(suggestion) = self.suggestion.as_mut() {
            suggestion.confidence = Confidence::Low;
            suggestion.confidence_score = suggestion.confidence_score.min(0.4);
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Infrastructure failure inside a step. Fails the run; never retried.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("text generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("tool call failed: {0}")]
    Tool(#[from] ToolError),

    #[error("invalid step input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// Handler traits
// ---------------------------------------------------------------------------

/// A unit of workflow work.
pub trait StepHandler: Send + Sync {
    /// Registry name, referenced by `NodeSpec::handler`.
    fn name(&self) -> &str;

    fn execute(
        &self,
        input: &StepInput,
    ) -> impl Future<Output = Result<StepOutput, StepError>> + Send;
}

/// Object-safe version of [`StepHandler`] with boxed futures.
pub trait StepHandlerDyn: Send + Sync {
    fn name(&self) -> &str;

    fn execute_boxed<'a>(
        &'a self,
        input: &'a StepInput,
    ) -> Pin<Box<dyn Future<Output = Result<StepOutput, StepError>> + Send + 'a>>;
}

impl<T: StepHandler> StepHandlerDyn for T {
    fn name(&self) -> &str {
        StepHandler::name(self)
    }

    fn execute_boxed<'a>(
        &'a self,
        input: &'a StepInput,
    ) -> Pin<Box<dyn Future<Output = Result<StepOutput, StepError>> + Send + 'a>> {
        Box::pin(self.execute(input))
    }
}

/// Type-erased step handler.
pub struct BoxStepHandler {
    inner: Box<dyn StepHandlerDyn + Send + Sync>,
}

impl BoxStepHandler {
    pub fn new<T: StepHandler + 'static>(handler: T) -> Self {
        Self {
            inner: Box::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn execute(&self, input: &StepInput) -> Result<StepOutput, StepError> {
        self.inner.execute_boxed(input).await
    }
}

impl std::fmt::Debug for BoxStepHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxStepHandler")
            .field("name", &self.name())
            .finish()
    }
}
