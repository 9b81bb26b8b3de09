//! Agent context types.
//!
//! `AgentContext` carries the per-run business context (organization,
//! client, project) that step handlers render into prompts. Like
//! `ChainContext` it is immutable: builder methods return a new value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::prompt::format_section;

/// Per-run business context, scoped from broadest (organization) to
/// narrowest (project).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    #[serde(default)]
    pub org_context: Map<String, Value>,
    #[serde(default)]
    pub client_context: Map<String, Value>,
    #[serde(default)]
    pub project_context: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl AgentContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a trigger payload carrying optional `organization`,
    /// `client`, `project` and `metadata` objects. Non-object values are
    /// ignored.
    pub fn from_value(value: &Value) -> Self {
        let section = |key: &str| match value.get(key) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        Self {
            org_context: section("organization"),
            client_context: section("client"),
            project_context: section("project"),
            metadata: section("metadata"),
        }
    }

    pub fn with_org(&self, org: Map<String, Value>) -> Self {
        Self {
            org_context: org,
            ..self.clone()
        }
    }

    pub fn with_client(&self, client: Map<String, Value>) -> Self {
        Self {
            client_context: client,
            ..self.clone()
        }
    }

    pub fn with_project(&self, project: Map<String, Value>) -> Self {
        Self {
            project_context: project,
            ..self.clone()
        }
    }

    pub fn with_metadata(&self, key: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.metadata.insert(key.into(), value);
        next
    }

    pub fn is_empty(&self) -> bool {
        self.org_context.is_empty()
            && self.client_context.is_empty()
            && self.project_context.is_empty()
            && self.metadata.is_empty()
    }

    /// Render Organization, Client, Project, Metadata in that order,
    /// skipping empty scopes.
    pub fn to_prompt_string(&self) -> String {
        [
            format_section("Organization", &self.org_context),
            format_section("Client", &self.client_context),
            format_section("Project", &self.project_context),
            format_section("Metadata", &self.metadata),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("\n\n")
    }
}
