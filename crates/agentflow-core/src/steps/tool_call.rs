//! Generic tool invocation step.
//!
//! Node params:
//! - `tool` (required): tool name passed to the gateway
//! - `arguments`: object merged into the call parameters
//! - `result_key`: results key to store the tool's data under

use serde_json::{Map, Value, json};

use crate::tools::ToolGateway;
use crate::workflow::step::{StepError, StepHandler, StepInput, StepOutput};

#[derive(Debug)]
pub struct ToolCallStep<G: ToolGateway> {
    gateway: G,
}

impl<G: ToolGateway> ToolCallStep<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    /// Call parameters: the trigger's entity reference, the team, then the
    /// node's `arguments` on top.
    fn params(input: &StepInput) -> Map<String, Value> {
        let mut params = Map::new();
        for key in ["entity_type", "entity_id"] {
            if let Some(value) = input.input_field(key) {
                params.insert(key.to_string(), value.clone());
            }
        }
        params.insert("team_id".to_string(), json!(input.team_id));
        if let Some(Value::Object(arguments)) = input.params.get("arguments") {
            params.extend(arguments.clone());
        }
        params
    }
}

impl<G: ToolGateway> StepHandler for ToolCallStep<G> {
    fn name(&self) -> &str {
        "tool_call"
    }

    async fn execute(&self, input: &StepInput) -> Result<StepOutput, StepError> {
        let tool = input.param_str("tool").ok_or_else(|| {
            StepError::InvalidInput(format!("node '{}' has no 'tool' param", input.node_id))
        })?;

        let result = self.gateway.execute(tool, &Self::params(input)).await?;
        if !result.success {
            return Err(StepError::Internal(format!(
                "tool '{tool}' failed with status {}: {}",
                result.status,
                result.error.as_deref().unwrap_or("no error message")
            )));
        }
        tracing::debug!(node_id = %input.node_id, tool, status = result.status, "tool call succeeded");

        let mut output = StepOutput::default()
            .with_field("tool", json!(tool))
            .with_field("status", json!(result.status))
            .with_field("data", result.data.clone());
        if let Some(key) = input.param_str("result_key") {
            output = output.with_result(key, result.data);
        }
        Ok(output)
    }
}
