//! Workflow definition parsing, validation, and handler binding.
//!
//! A `WorkflowSpec` (YAML file or built in code) becomes a runnable
//! `WorkflowDefinition` by `bind`: structural validation, graph checks,
//! condition parsing, and a one-time lookup of every node's step handler.
//! Nothing is dispatched by name at run time.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use agentflow_types::chain::ChainContext;
use agentflow_types::workflow::{END_NODE, NodeSpec, StateData, WorkflowSpec};
use serde_json::Value;
use thiserror::Error;

use super::condition::{Condition, ConditionError, ConditionEvaluator};
use super::dag::validate_graph;
use super::registry::StepRegistry;
use super::step::BoxStepHandler;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that make a workflow spec unusable.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),

    #[error("start node '{0}' does not exist")]
    MissingStart(String),

    #[error("node '{node}' transitions to unknown node '{target}'")]
    UnknownTarget { node: String, target: String },

    #[error("node '{node}' uses unregistered handler '{handler}'")]
    UnknownHandler { node: String, handler: String },

    #[error("node '{node}' has an invalid branch condition: {source}")]
    InvalidCondition {
        node: String,
        #[source]
        source: ConditionError,
    },

    #[error("cycle detected involving node '{0}'")]
    CycleDetected(String),

    #[error("node '{0}' is unreachable from start")]
    Unreachable(String),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `WorkflowSpec`.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowSpec, DefinitionError> {
    let spec: WorkflowSpec =
        serde_yaml_ng::from_str(yaml).map_err(|e| DefinitionError::ParseError(e.to_string()))?;
    validate_spec(&spec)?;
    Ok(spec)
}

/// Serialize a `WorkflowSpec` to a YAML string.
pub fn serialize_workflow_yaml(spec: &WorkflowSpec) -> Result<String, DefinitionError> {
    serde_yaml_ng::to_string(spec).map_err(|e| DefinitionError::ParseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate everything that does not need a registry.
///
/// Checks:
/// - Name is non-empty and contains only alphanumeric characters, `-` and `_`
/// - At least one node; ids unique; no node named `end`
/// - `next` and `branches` are not both set
/// - `on_reject` only on checkpoints
/// - Costs are finite and non-negative
/// - Branch conditions parse
/// - Graph: targets exist, forward edges acyclic, all nodes reachable
pub fn validate_spec(spec: &WorkflowSpec) -> Result<(), DefinitionError> {
    if spec.name.is_empty() {
        return Err(DefinitionError::ValidationError(
            "workflow name must not be empty".to_string(),
        ));
    }
    if !spec
        .name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(DefinitionError::ValidationError(format!(
            "workflow name '{}' contains invalid characters",
            spec.name
        )));
    }
    if spec.nodes.is_empty() {
        return Err(DefinitionError::ValidationError(
            "workflow must have at least one node".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for node in &spec.nodes {
        if node.id == END_NODE {
            return Err(DefinitionError::ValidationError(format!(
                "'{END_NODE}' is reserved and cannot be a node id"
            )));
        }
        if !seen.insert(node.id.as_str()) {
            return Err(DefinitionError::DuplicateNode(node.id.clone()));
        }
        validate_node(node)?;
    }
    if !seen.contains(spec.start.as_str()) {
        return Err(DefinitionError::MissingStart(spec.start.clone()));
    }

    validate_graph(spec)
}

fn validate_node(node: &NodeSpec) -> Result<(), DefinitionError> {
    if node.next.is_some() && !node.branches.is_empty() {
        return Err(DefinitionError::ValidationError(format!(
            "node '{}' sets both 'next' and 'branches'",
            node.id
        )));
    }
    if node.on_reject.is_some() && !node.checkpoint {
        return Err(DefinitionError::ValidationError(format!(
            "node '{}' sets 'on_reject' but is not a checkpoint",
            node.id
        )));
    }
    if !node.estimated_cost.is_finite() || node.estimated_cost < 0.0 {
        return Err(DefinitionError::ValidationError(format!(
            "node '{}' has invalid estimated_cost {}",
            node.id, node.estimated_cost
        )));
    }
    if let Some(key) = node
        .params
        .get("result_key")
        .and_then(Value::as_str)
        .filter(|key| StateData::is_reserved_key(key))
    {
        return Err(DefinitionError::ValidationError(format!(
            "node '{}' uses reserved result_key '{key}'",
            node.id
        )));
    }
    for branch in &node.branches {
        Condition::parse(&branch.when).map_err(|source| DefinitionError::InvalidCondition {
            node: node.id.clone(),
            source,
        })?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Bound definition
// ---------------------------------------------------------------------------

/// A node with its handler resolved and its conditions parsed.
#[derive(Debug, Clone)]
pub struct BoundNode {
    pub spec: NodeSpec,
    pub handler: Arc<BoxStepHandler>,
    branches: Vec<(Condition, String)>,
}

impl BoundNode {
    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn is_checkpoint(&self) -> bool {
        self.spec.checkpoint
    }

    /// Successor after this node ran (or was approved): first matching
    /// branch, else `otherwise`, else `next`, else `end`.
    pub fn next_node(&self, chain: &ChainContext, evaluator: &ConditionEvaluator) -> &str {
        if self.branches.is_empty() {
            return self.spec.next.as_deref().unwrap_or(END_NODE);
        }
        self.branches
            .iter()
            .find(|(condition, _)| evaluator.evaluate_parsed(condition, chain))
            .map(|(_, target)| target.as_str())
            .unwrap_or_else(|| self.spec.otherwise.as_deref().unwrap_or(END_NODE))
    }

    /// Successor when this checkpoint is rejected.
    pub fn reject_target(&self) -> &str {
        self.spec.on_reject.as_deref().unwrap_or(END_NODE)
    }
}

/// A validated workflow graph with handlers bound.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    spec: WorkflowSpec,
    nodes: HashMap<String, BoundNode>,
}

impl WorkflowDefinition {
    /// Validate `spec` and resolve every handler from `registry`.
    pub fn bind(spec: WorkflowSpec, registry: &StepRegistry) -> Result<Self, DefinitionError> {
        validate_spec(&spec)?;

        let mut nodes = HashMap::with_capacity(spec.nodes.len());
        for node in &spec.nodes {
            let handler =
                registry
                    .get(&node.handler)
                    .ok_or_else(|| DefinitionError::UnknownHandler {
                        node: node.id.clone(),
                        handler: node.handler.clone(),
                    })?;
            let branches = node
                .branches
                .iter()
                .map(|b| {
                    Condition::parse(&b.when)
                        .map(|c| (c, b.goto.clone()))
                        .map_err(|source| DefinitionError::InvalidCondition {
                            node: node.id.clone(),
                            source,
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            nodes.insert(
                node.id.clone(),
                BoundNode {
                    spec: node.clone(),
                    handler,
                    branches,
                },
            );
        }

        Ok(Self { spec, nodes })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn description(&self) -> Option<&str> {
        self.spec.description.as_deref()
    }

    pub fn start(&self) -> &str {
        &self.spec.start
    }

    pub fn node(&self, id: &str) -> Option<&BoundNode> {
        self.nodes.get(id)
    }

    pub fn spec(&self) -> &WorkflowSpec {
        &self.spec
    }

    pub fn checkpoints(&self) -> impl Iterator<Item = &NodeSpec> {
        self.spec.nodes.iter().filter(|n| n.checkpoint)
    }
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a workflow spec from a YAML file.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowSpec, DefinitionError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow_yaml(&content)
}

/// Discover all workflow YAML files directly under `base_dir`.
///
/// Files that fail to parse are skipped with a warning.
pub fn discover_workflows(
    base_dir: &Path,
) -> Result<Vec<(PathBuf, WorkflowSpec)>, DefinitionError> {
    let mut results = Vec::new();
    if !base_dir.exists() {
        return Ok(results);
    }
    let mut paths = std::fs::read_dir(base_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.sort();

    for path in paths {
        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if !is_yaml {
            continue;
        }
        match load_workflow_file(&path) {
            Ok(spec) => results.push((path, spec)),
            Err(e) => tracing::warn!(?path, error = %e, "skipping invalid workflow file"),
        }
    }
    Ok(results)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::step::{StepError, StepHandler, StepInput, StepOutput};
    use serde_json::{Map, json};

    struct Noop(&'static str);

    impl StepHandler for Noop {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(&self, _input: &StepInput) -> Result<StepOutput, StepError> {
            Ok(StepOutput::default())
        }
    }

    fn registry() -> StepRegistry {
        let mut registry = StepRegistry::new();
        registry.register(Noop("analyze")).register(Noop("draft"));
        registry
    }

    const YAML: &str = r#"
name: review-flow
start: analyze
nodes:
  - id: analyze
    handler: analyze
    branches:
      - when: "steps.0.output.score > 80"
        goto: fast_track
    otherwise: draft
  - id: fast_track
    handler: draft
  - id: draft
    handler: draft
    checkpoint: true
    on_reject: analyze
"#;

    #[test]
    fn test_parse_and_bind() {
        let spec = parse_workflow_yaml(YAML).unwrap();
        let def = WorkflowDefinition::bind(spec, &registry()).unwrap();
        assert_eq!(def.name(), "review-flow");
        assert_eq!(def.start(), "analyze");
        assert!(def.node("draft").unwrap().is_checkpoint());
        assert_eq!(def.node("draft").unwrap().reject_target(), "analyze");
        assert_eq!(def.checkpoints().count(), 1);
    }

    #[test]
    fn test_branch_selection() {
        let def = WorkflowDefinition::bind(parse_workflow_yaml(YAML).unwrap(), &registry()).unwrap();
        let node = def.node("analyze").unwrap();
        let evaluator = ConditionEvaluator::new();

        let mut high = Map::new();
        high.insert("score".to_string(), json!(91));
        let chain = ChainContext::new().with_step_output(0, high, "analyze");
        assert_eq!(node.next_node(&chain, &evaluator), "fast_track");

        assert_eq!(node.next_node(&ChainContext::new(), &evaluator), "draft");
        assert_eq!(def.node("fast_track").unwrap().next_node(&chain, &evaluator), END_NODE);
    }

    #[test]
    fn test_unknown_handler_rejected() {
        let mut only_analyze = StepRegistry::new();
        only_analyze.register(Noop("analyze"));
        let err = WorkflowDefinition::bind(parse_workflow_yaml(YAML).unwrap(), &only_analyze)
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownHandler { .. }));
    }

    #[test]
    fn test_bad_condition_rejected() {
        let yaml = YAML.replace("steps.0.output.score > 80", "steps.0.output.score");
        assert!(matches!(
            parse_workflow_yaml(&yaml),
            Err(DefinitionError::InvalidCondition { .. })
        ));
    }

    #[test]
    fn test_structural_errors() {
        let base = parse_workflow_yaml(YAML).unwrap();

        let mut dup = base.clone();
        dup.nodes.push(NodeSpec::new("draft", "draft"));
        assert!(matches!(validate_spec(&dup), Err(DefinitionError::DuplicateNode(_))));

        let mut bad_start = base.clone();
        bad_start.start = "nope".to_string();
        assert!(matches!(validate_spec(&bad_start), Err(DefinitionError::MissingStart(_))));

        let mut reserved = base.clone();
        reserved.nodes.push(NodeSpec::new(END_NODE, "draft"));
        assert!(matches!(validate_spec(&reserved), Err(DefinitionError::ValidationError(_))));

        let mut reject_on_plain = base.clone();
        reject_on_plain.nodes[1].on_reject = Some("analyze".to_string());
        assert!(matches!(
            validate_spec(&reject_on_plain),
            Err(DefinitionError::ValidationError(_))
        ));

        let mut negative = base.clone();
        negative.nodes[0].estimated_cost = -1.0;
        assert!(validate_spec(&negative).is_err());

        let mut clobbers_input = base.clone();
        clobbers_input.nodes[0]
            .params
            .insert("result_key".to_string(), json!("input"));
        let err = validate_spec(&clobbers_input).unwrap_err();
        assert!(err.to_string().contains("reserved result_key 'input'"));

        let mut plain_key = base;
        plain_key.nodes[0]
            .params
            .insert("result_key".to_string(), json!("tool_result"));
        assert!(validate_spec(&plain_key).is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let spec = parse_workflow_yaml(YAML).unwrap();
        let yaml = serialize_workflow_yaml(&spec).unwrap();
        assert_eq!(parse_workflow_yaml(&yaml).unwrap(), spec);
    }

    #[test]
    fn test_discover_skips_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.yaml"), YAML).unwrap();
        std::fs::write(dir.path().join("bad.yml"), "name: [").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let found = discover_workflows(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1.name, "review-flow");

        assert!(discover_workflows(&dir.path().join("missing")).unwrap().is_empty());
    }
}
