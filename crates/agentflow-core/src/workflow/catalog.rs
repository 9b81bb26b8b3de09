//! Named, bound workflow definitions available to the engine.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use agentflow_types::workflow::{NodeSpec, WorkflowSpec};
use serde_json::json;

use super::definition::{DefinitionError, WorkflowDefinition, discover_workflows};
use super::registry::StepRegistry;

pub const PM_COPILOT: &str = "pm-copilot";
pub const WORK_ROUTING: &str = "work-routing";
pub const CLIENT_COMMUNICATION: &str = "client-communication";

/// Workflow type -> definition.
#[derive(Debug, Clone, Default)]
pub struct WorkflowCatalog {
    definitions: BTreeMap<String, Arc<WorkflowDefinition>>,
}

impl WorkflowCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The three builtin workflows bound against `registry`.
    pub fn builtin(registry: &StepRegistry) -> Result<Self, DefinitionError> {
        let mut catalog = Self::new();
        for spec in [pm_copilot_spec(), work_routing_spec(), client_communication_spec()] {
            catalog.insert(WorkflowDefinition::bind(spec, registry)?)?;
        }
        Ok(catalog)
    }

    /// Add a definition. Names must be unique.
    pub fn insert(&mut self, definition: WorkflowDefinition) -> Result<(), DefinitionError> {
        let name = definition.name().to_string();
        if self.definitions.contains_key(&name) {
            return Err(DefinitionError::ValidationError(format!(
                "workflow '{name}' is already defined"
            )));
        }
        self.definitions.insert(name, Arc::new(definition));
        Ok(())
    }

    /// Bind every YAML workflow under `dir`. A file that parses but does
    /// not bind, or clashes with an existing name, is skipped with a warning.
    /// Returns how many were added.
    pub fn load_dir(&mut self, dir: &Path, registry: &StepRegistry) -> Result<usize, DefinitionError> {
        let mut added = 0;
        for (path, spec) in discover_workflows(dir)? {
            match WorkflowDefinition::bind(spec, registry).and_then(|def| self.insert(def)) {
                Ok(()) => added += 1,
                Err(e) => tracing::warn!(?path, error = %e, "skipping workflow file"),
            }
        }
        Ok(added)
    }

    pub fn get(&self, name: &str) -> Option<Arc<WorkflowDefinition>> {
        self.definitions.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkflowDefinition> {
        self.definitions.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Builtin specs
// ---------------------------------------------------------------------------

pub fn pm_copilot_spec() -> WorkflowSpec {
    WorkflowSpec {
        name: PM_COPILOT.to_string(),
        description: Some(
            "Analyse a work order, draft deliverable alternatives for review, then break the \
             approved work into tasks"
                .to_string(),
        ),
        start: "analyze".to_string(),
        nodes: vec![
            NodeSpec::new("analyze", "work_order_analysis")
                .branch("accumulated_context.step_0.requires_insights == true", "insights")
                .otherwise("draft_deliverables")
                .cost(0.01),
            NodeSpec::new("insights", "project_insights")
                .then("draft_deliverables")
                .cost(0.02),
            NodeSpec::new("draft_deliverables", "deliverable_drafter")
                .checkpoint()
                .then("task_breakdown")
                .cost(0.05),
            NodeSpec::new("task_breakdown", "task_breakdown"),
        ],
    }
}

pub fn work_routing_spec() -> WorkflowSpec {
    WorkflowSpec {
        name: WORK_ROUTING.to_string(),
        description: Some("Score candidates for a piece of work and confirm the assignee".to_string()),
        start: "score_candidates".to_string(),
        nodes: vec![
            NodeSpec::new("score_candidates", "candidate_scoring")
                .checkpoint()
                .then("assign"),
            NodeSpec::new("assign", "assignment_finalizer"),
        ],
    }
}

pub fn client_communication_spec() -> WorkflowSpec {
    WorkflowSpec {
        name: CLIENT_COMMUNICATION.to_string(),
        description: Some("Draft a client message for review".to_string()),
        start: "draft_message".to_string(),
        nodes: vec![
            NodeSpec::new("draft_message", "communication_drafter")
                .checkpoint()
                .param("channel", json!("email"))
                .cost(0.01),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::builtin_registry;
    use crate::workflow::condition::ConditionEvaluator;
    use agentflow_types::chain::ChainContext;
    use serde_json::Map;

    #[test]
    fn test_builtin_catalog_binds() {
        let catalog = WorkflowCatalog::builtin(&builtin_registry(None)).unwrap();
        assert_eq!(
            catalog.names().collect::<Vec<_>>(),
            vec![CLIENT_COMMUNICATION, PM_COPILOT, WORK_ROUTING]
        );
        let pm = catalog.get(PM_COPILOT).unwrap();
        assert_eq!(pm.start(), "analyze");
        assert_eq!(
            pm.checkpoints().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            vec!["draft_deliverables"]
        );
    }

    #[test]
    fn test_pm_copilot_branches_on_insights() {
        let catalog = WorkflowCatalog::builtin(&builtin_registry(None)).unwrap();
        let analyze = catalog.get(PM_COPILOT).unwrap().node("analyze").unwrap().clone();
        let evaluator = ConditionEvaluator::new();

        let mut output = Map::new();
        output.insert("requires_insights".to_string(), json!(true));
        let chain = ChainContext::new().with_step_output(0, output, "analyze");
        assert_eq!(analyze.next_node(&chain, &evaluator), "insights");

        let mut output = Map::new();
        output.insert("requires_insights".to_string(), json!(false));
        let chain = ChainContext::new().with_step_output(0, output, "analyze");
        assert_eq!(analyze.next_node(&chain, &evaluator), "draft_deliverables");
    }

    #[test]
    fn test_builtin_without_handlers_fails() {
        let err = WorkflowCatalog::builtin(&StepRegistry::new()).unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownHandler { .. }));
    }

    #[test]
    fn test_load_dir_adds_and_skips() {
        let registry = builtin_registry(None);
        let mut catalog = WorkflowCatalog::builtin(&registry).unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("quick-note.yaml"),
            "name: quick-note\nstart: draft\nnodes:\n  - id: draft\n    handler: communication_drafter\n",
        )
        .unwrap();
        // same name as a builtin
        std::fs::write(
            dir.path().join("dup.yaml"),
            "name: pm-copilot\nstart: draft\nnodes:\n  - id: draft\n    handler: communication_drafter\n",
        )
        .unwrap();
        // handler nobody registered
        std::fs::write(
            dir.path().join("other.yaml"),
            "name: other\nstart: a\nnodes:\n  - id: a\n    handler: missing\n",
        )
        .unwrap();

        assert_eq!(catalog.load_dir(dir.path(), &registry).unwrap(), 1);
        assert_eq!(catalog.len(), 4);
        assert!(catalog.get("quick-note").is_some());
    }
}
