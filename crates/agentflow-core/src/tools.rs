//! Tool gateway port.
//!
//! Steps that act on the outside world (create a task, post a message) go
//! through a `ToolGateway`, which returns a uniform result envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Uniform result of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Transport-level status (e.g. HTTP status code).
    pub status: u16,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
            status: 200,
        }
    }

    pub fn failed(status: u16, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
            status,
        }
    }
}

/// Executes named tools. A failed tool call is reported in the
/// `ToolResult`, not as an `Err`; `Err` is reserved for transport failures.
pub trait ToolGateway: Send + Sync {
    fn execute(
        &self,
        name: &str,
        params: &Map<String, Value>,
    ) -> impl std::future::Future<Output = Result<ToolResult, ToolError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool gateway unreachable: {0}")]
    Transport(String),

    #[error("malformed tool response: {0}")]
    Decode(String),
}
