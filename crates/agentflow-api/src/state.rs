//! Application state wiring the engine to its SQLite adapters.
//!
//! The engine is generic over its storage, inbox and budget ports; AppState
//! pins them to the concrete infra implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use agentflow_core::steps::{ToolCallStep, builtin_registry};
use agentflow_core::workflow::catalog::WorkflowCatalog;
use agentflow_core::workflow::engine::{RunScope, WorkflowEngine};
use agentflow_core::workflow::registry::StepRegistry;
use agentflow_infra::config::load_global_config;
use agentflow_infra::filesystem::{resolve_data_dir, workflows_dir};
use agentflow_infra::llm::create_provider;
use agentflow_infra::sqlite::approval::SqliteApprovalInbox;
use agentflow_infra::sqlite::budget::SqliteBudgetGuard;
use agentflow_infra::sqlite::pool::DatabasePool;
use agentflow_infra::sqlite::workflow_state::SqliteWorkflowStateRepository;
use agentflow_infra::tools::HttpToolGateway;
use agentflow_types::config::{AgentConfig, GlobalConfig};

/// The engine pinned to the SQLite adapters.
pub type ConcreteEngine =
    WorkflowEngine<SqliteWorkflowStateRepository, SqliteApprovalInbox, SqliteBudgetGuard>;

/// Shared application state used by every CLI command.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConcreteEngine>,
    pub config: Arc<GlobalConfig>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Resolve the data directory, load config, open the database and wire
    /// the engine.
    pub async fn init() -> Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let config = load_global_config(&data_dir).await?;
        let db_pool = DatabasePool::open_in(&data_dir)
            .await
            .context("Failed to open database")?;

        let registry = build_registry(&config)?;
        let catalog = build_catalog(&data_dir, &registry)?;
        tracing::debug!(
            data_dir = %data_dir.display(),
            workflows = catalog.len(),
            "application state initialized"
        );

        let engine = WorkflowEngine::new(
            SqliteWorkflowStateRepository::new(db_pool.clone()),
            SqliteApprovalInbox::new(db_pool.clone()),
            SqliteBudgetGuard::new(db_pool.clone()),
            Arc::new(catalog),
        );

        Ok(Self {
            engine: Arc::new(engine),
            config: Arc::new(config),
            data_dir,
            db_pool,
        })
    }

    /// A configured agent that is enabled.
    pub fn agent(&self, name: &str) -> Result<&AgentConfig> {
        let Some(agent) = self.config.agent(name) else {
            bail!("Agent '{name}' is not configured");
        };
        if !agent.enabled {
            bail!("Agent '{name}' is disabled");
        }
        Ok(agent)
    }

    /// Agent, automation and budget settings for runs of `team_id` under
    /// `agent_name`.
    pub fn scope(&self, team_id: &str, agent_name: &str) -> Result<RunScope> {
        Ok(RunScope::resolve(&self.config, team_id, agent_name)?)
    }

    /// Read-only access to the spend ledger.
    pub fn spend_ledger(&self) -> SqliteBudgetGuard {
        SqliteBudgetGuard::new(self.db_pool.clone())
    }
}

/// Builtin handlers, plus `tool_call` when a tool endpoint is configured.
fn build_registry(config: &GlobalConfig) -> Result<StepRegistry> {
    let provider = create_provider(&config.generation)
        .context("Failed to create text-generation provider")?
        .map(Arc::new);
    let mut registry = builtin_registry(provider);

    if let Some(base_url) = &config.tools.base_url {
        let gateway = HttpToolGateway::new(base_url.as_str())
            .with_context(|| format!("Failed to create tool gateway for {base_url}"))?;
        registry.register(ToolCallStep::new(gateway));
    }
    Ok(registry)
}

/// Builtin workflows, plus any YAML definitions in the workflows directory.
fn build_catalog(data_dir: &Path, registry: &StepRegistry) -> Result<WorkflowCatalog> {
    let mut catalog =
        WorkflowCatalog::builtin(registry).context("Failed to build builtin workflows")?;

    let dir = workflows_dir(data_dir);
    if dir.is_dir() {
        let loaded = catalog
            .load_dir(&dir, registry)
            .with_context(|| format!("Failed to load workflows from {}", dir.display()))?;
        tracing::debug!(dir = %dir.display(), loaded, "loaded user workflows");
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::workflow::catalog::{CLIENT_COMMUNICATION, PM_COPILOT, WORK_ROUTING};
    use tempfile::TempDir;

    #[test]
    fn test_registry_without_tools_endpoint() {
        let registry = build_registry(&GlobalConfig::default()).unwrap();
        assert!(!registry.contains("tool_call"));
    }

    #[test]
    fn test_registry_with_tools_endpoint() {
        let mut config = GlobalConfig::default();
        config.tools.base_url = Some("http://127.0.0.1:9".to_string());
        let registry = build_registry(&config).unwrap();
        assert!(registry.contains("tool_call"));
    }

    #[test]
    fn test_catalog_without_workflows_dir() {
        let tmp = TempDir::new().unwrap();
        let registry = build_registry(&GlobalConfig::default()).unwrap();
        let catalog = build_catalog(tmp.path(), &registry).unwrap();
        for name in [PM_COPILOT, WORK_ROUTING, CLIENT_COMMUNICATION] {
            assert!(catalog.get(name).is_some(), "missing {name}");
        }
    }
}
