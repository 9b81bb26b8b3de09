//! Global configuration types for agentflow.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls
//! auto-approval thresholds, spend limits, agent definitions, per-team
//! overrides, and the generation/tool collaborators.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the agentflow engine.
///
/// Loaded from `~/.agentflow/config.toml`. A missing file yields
/// `GlobalConfig::default()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Global automation settings. Absent means "not configured": runs that
    /// rely on it fail with a configuration error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation: Option<AutomationSettings>,

    #[serde(default)]
    pub budget: BudgetLimits,

    #[serde(default)]
    pub agents: Vec<AgentConfig>,

    /// Per-team overrides keyed by team id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub teams: BTreeMap<String, TeamSettings>,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            automation: Some(AutomationSettings::default()),
            budget: BudgetLimits::default(),
            agents: vec![AgentConfig::builtin()],
            teams: BTreeMap::new(),
            generation: GenerationConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl GlobalConfig {
    pub fn agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// Automation settings for a team: the team override wins over the
    /// global section.
    pub fn automation_for(&self, team_id: &str) -> Option<AutomationSettings> {
        self.teams
            .get(team_id)
            .and_then(|t| t.automation.clone())
            .or_else(|| self.automation.clone())
    }

    /// Spend limits for a team. Each limit falls back to the global one.
    pub fn budget_for(&self, team_id: &str) -> BudgetLimits {
        match self.teams.get(team_id).and_then(|t| t.budget.as_ref()) {
            Some(team) => BudgetLimits {
                daily_limit: team.daily_limit.or(self.budget.daily_limit),
                monthly_limit: team.monthly_limit.or(self.budget.monthly_limit),
            },
            None => self.budget.clone(),
        }
    }
}

/// Checkpoint auto-approval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationSettings {
    /// Minimum confidence score in `[0, 1]` for a checkpoint to bypass review.
    #[serde(default = "default_threshold")]
    pub auto_approval_threshold: f64,
}

fn default_threshold() -> f64 {
    0.8
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            auto_approval_threshold: default_threshold(),
        }
    }
}

/// Spend limits in USD. `None` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_limit: Option<f64>,
}

/// Team-scoped overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation: Option<AutomationSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetLimits>,
}

/// An agent that may run workflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Workflow types this agent may run. Empty allows all.
    #[serde(default)]
    pub workflows: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl AgentConfig {
    /// The agent present in a default configuration.
    pub fn builtin() -> Self {
        Self {
            name: "pm-copilot".to_string(),
            enabled: true,
            workflows: Vec::new(),
        }
    }

    pub fn allows(&self, workflow_type: &str) -> bool {
        self.workflows.is_empty() || self.workflows.iter().any(|w| w == workflow_type)
    }
}

/// Text-generation provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key_env: default_api_key_env(),
            base_url: None,
            max_tokens: default_max_tokens(),
        }
    }
}

/// Tool gateway settings. Without a base URL the `tool_call` step is
/// unavailable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}
