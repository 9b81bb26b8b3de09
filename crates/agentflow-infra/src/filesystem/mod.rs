//! Data directory layout.
//!
//! ```text
//! ~/.agentflow/
//!   config.toml
//!   agentflow.db
//!   workflows/*.yaml
//! ```

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "AGENTFLOW_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `AGENTFLOW_DATA_DIR` environment variable
/// 2. `~/.agentflow`
/// 3. `.agentflow` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".agentflow");
    }

    PathBuf::from(".agentflow")
}

/// Directory scanned for user workflow definitions.
pub fn workflows_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("workflows")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflows_dir() {
        assert_eq!(
            workflows_dir(Path::new("/home/user/.agentflow")),
            PathBuf::from("/home/user/.agentflow/workflows")
        );
    }

    #[test]
    fn test_resolve_data_dir_from_env() {
        // SAFETY: This test is single-threaded and restores the env var immediately.
        unsafe {
            std::env::set_var(DATA_DIR_ENV, "/tmp/test-agentflow");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-agentflow"));
        unsafe {
            std::env::remove_var(DATA_DIR_ENV);
        }
    }
}
