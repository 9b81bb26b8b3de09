//! Global configuration loader for agentflow.
//!
//! Reads `config.toml` from the data directory (`~/.agentflow/` by default)
//! into [`GlobalConfig`]. A missing file yields the defaults; a present file
//! that fails to read, parse or validate is an error.

use std::path::{Path, PathBuf};

use agentflow_types::config::{BudgetLimits, GlobalConfig};
use thiserror::Error;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

/// Load and validate `{data_dir}/config.toml`.
pub async fn load_global_config(data_dir: &Path) -> Result<GlobalConfig, ConfigError> {
    let path = config_path(data_dir);

    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", path.display());
            return Ok(GlobalConfig::default());
        }
        Err(source) => return Err(ConfigError::Read { path, source }),
    };

    let config = parse_config(&content).map_err(|e| match e {
        ConfigError::Parse { source, .. } => ConfigError::Parse {
            path: path.clone(),
            source,
        },
        other => other,
    })?;
    tracing::debug!(
        path = %path.display(),
        agents = config.agents.len(),
        teams = config.teams.len(),
        "loaded configuration"
    );
    Ok(config)
}

/// Parse and validate TOML text.
pub fn parse_config(content: &str) -> Result<GlobalConfig, ConfigError> {
    let config: GlobalConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: PathBuf::from(CONFIG_FILE),
        source,
    })?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &GlobalConfig) -> Result<(), ConfigError> {
    let automation = config
        .automation
        .iter()
        .map(|a| ("automation".to_string(), a))
        .chain(config.teams.iter().filter_map(|(team, t)| {
            t.automation
                .as_ref()
                .map(|a| (format!("teams.{team}.automation"), a))
        }));
    for (section, settings) in automation {
        let threshold = settings.auto_approval_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "{section}.auto_approval_threshold must be within 0..=1, got {threshold}"
            )));
        }
    }

    let budgets = std::iter::once(("budget".to_string(), &config.budget)).chain(
        config
            .teams
            .iter()
            .filter_map(|(team, t)| t.budget.as_ref().map(|b| (format!("teams.{team}.budget"), b))),
    );
    for (section, limits) in budgets {
        check_limits(&section, limits)?;
    }

    let mut seen = std::collections::HashSet::new();
    for agent in &config.agents {
        if !seen.insert(agent.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "agent '{}' is defined more than once",
                agent.name
            )));
        }
    }
    Ok(())
}

fn check_limits(section: &str, limits: &BudgetLimits) -> Result<(), ConfigError> {
    for (name, limit) in [("daily_limit", limits.daily_limit), ("monthly_limit", limits.monthly_limit)] {
        if let Some(value) = limit.filter(|v| !v.is_finite() || *v < 0.0) {
            return Err(ConfigError::Invalid(format!(
                "{section}.{name} must be a non-negative amount, got {value}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_global_config(tmp.path()).await.unwrap();
        assert!(config.automation.is_some());
        assert!(config.agent("pm-copilot").is_some());
    }

    #[tokio::test]
    async fn test_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            config_path(tmp.path()),
            r#"
[automation]
auto_approval_threshold = 0.9

[budget]
daily_limit = 25.0

[[agents]]
name = "pm-copilot"
workflows = ["pm-copilot", "client-communication"]

[teams.studio.budget]
monthly_limit = 400.0

[generation]
model = "claude-haiku-4-5"
"#,
        )
        .await
        .unwrap();

        let config = load_global_config(tmp.path()).await.unwrap();
        assert_eq!(config.automation_for("studio").unwrap().auto_approval_threshold, 0.9);
        let studio = config.budget_for("studio");
        assert_eq!(studio.daily_limit, Some(25.0));
        assert_eq!(studio.monthly_limit, Some(400.0));
        assert!(!config.agent("pm-copilot").unwrap().allows("work-routing"));
        assert_eq!(config.generation.model, "claude-haiku-4-5");
    }

    #[tokio::test]
    async fn test_file_without_automation_has_no_settings() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(config_path(tmp.path()), "[budget]\ndaily_limit = 5.0\n")
            .await
            .unwrap();

        let config = load_global_config(tmp.path()).await.unwrap();
        assert!(config.automation_for("any-team").is_none());
        assert!(config.agents.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_toml_is_an_error() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(config_path(tmp.path()), "this is not { valid toml !!!")
            .await
            .unwrap();

        let err = load_global_config(tmp.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let err = parse_config("[teams.studio.automation]\nauto_approval_threshold = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("teams.studio.automation"));
    }

    #[test]
    fn test_negative_limit_rejected() {
        let err = parse_config("[budget]\nmonthly_limit = -3.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_duplicate_agent_rejected() {
        let err = parse_config("[[agents]]\nname = \"a\"\n\n[[agents]]\nname = \"a\"\n").unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
