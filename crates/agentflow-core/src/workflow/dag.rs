//! Graph checks over a workflow spec.
//!
//! Uses `petgraph` to model node transitions as a directed graph. Forward
//! edges (`next`, `branches`, `otherwise`) must be acyclic; `on_reject`
//! edges may point back to an earlier node so a rejected draft can be
//! redone. Every node must be reachable from `start` over any edge kind.

use std::collections::HashMap;

use agentflow_types::workflow::{END_NODE, WorkflowSpec};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use super::definition::DefinitionError;

/// Validate edge targets, forward acyclicity, and reachability.
pub fn validate_graph(spec: &WorkflowSpec) -> Result<(), DefinitionError> {
    let mut forward = DiGraph::<&str, ()>::new();
    let mut all = DiGraph::<&str, ()>::new();
    let mut forward_idx: HashMap<&str, NodeIndex> = HashMap::new();
    let mut all_idx: HashMap<&str, NodeIndex> = HashMap::new();

    for id in spec.nodes.iter().map(|n| n.id.as_str()).chain([END_NODE]) {
        forward_idx.insert(id, forward.add_node(id));
        all_idx.insert(id, all.add_node(id));
    }

    for node in &spec.nodes {
        let from = node.id.as_str();
        let forward_targets = if node.branches.is_empty() {
            vec![node.next.as_deref().unwrap_or(END_NODE)]
        } else {
            node.branches
                .iter()
                .map(|b| b.goto.as_str())
                .chain([node.otherwise.as_deref().unwrap_or(END_NODE)])
                .collect()
        };

        for target in node.targets() {
            let to = *all_idx.get(target).ok_or_else(|| DefinitionError::UnknownTarget {
                node: from.to_string(),
                target: target.to_string(),
            })?;
            all.add_edge(all_idx[from], to, ());
        }
        for target in forward_targets {
            forward.add_edge(forward_idx[from], forward_idx[target], ());
        }
    }

    toposort(&forward, None).map_err(|cycle| {
        DefinitionError::CycleDetected(forward[cycle.node_id()].to_string())
    })?;

    let start = *all_idx
        .get(spec.start.as_str())
        .ok_or_else(|| DefinitionError::MissingStart(spec.start.clone()))?;
    let mut dfs = Dfs::new(&all, start);
    let mut seen = Vec::new();
    while let Some(idx) = dfs.next(&all) {
        seen.push(all[idx]);
    }
    if let Some(orphan) = spec.nodes.iter().find(|n| !seen.contains(&n.id.as_str())) {
        return Err(DefinitionError::Unreachable(orphan.id.clone()));
    }

    Ok(())
}
