//! Span attribute names for workflow execution.
//!
//! The engine opens a `workflow.run` span per run with these fields, and a
//! `workflow.node` span per executed node. The CLI records
//! [`WORKFLOW_STATE_ID`] and [`WORKFLOW_STATUS`] on its `cli.workflow`
//! command span. Keep the literals in the `info_span!` calls and these
//! constants in step.

// --- workflow.run ---

/// Workflow type being run (e.g., "pm-copilot").
pub const WORKFLOW_NAME: &str = "workflow.name";

/// UUID of the persisted `WorkflowState`.
pub const WORKFLOW_STATE_ID: &str = "workflow.state_id";

/// Execution mode: "full" or "staged".
pub const WORKFLOW_MODE: &str = "workflow.mode";

/// Status the run ended the call in. Recorded when the span closes.
pub const WORKFLOW_STATUS: &str = "workflow.status";

// --- workflow.node ---

/// Node id within the workflow definition.
pub const WORKFLOW_NODE_ID: &str = "workflow.node.id";

/// Step handler the node is bound to.
pub const WORKFLOW_NODE_HANDLER: &str = "workflow.node.handler";

// --- Span names ---

pub const SPAN_RUN: &str = "workflow.run";
pub const SPAN_NODE: &str = "workflow.node";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_share_namespace() {
        for attr in [
            WORKFLOW_NAME,
            WORKFLOW_STATE_ID,
            WORKFLOW_MODE,
            WORKFLOW_STATUS,
            WORKFLOW_NODE_ID,
            WORKFLOW_NODE_HANDLER,
        ] {
            assert!(attr.starts_with("workflow."), "{attr}");
        }
    }
}
