//! Observability for agentflow: subscriber setup and the span attribute
//! names the engine emits.

pub mod tracing_setup;
pub mod workflow_attrs;
