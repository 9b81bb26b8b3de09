//! Infrastructure layer for agentflow.
//!
//! Contains implementations of the ports defined in `agentflow-core`:
//! SQLite storage for workflow states, approval tickets and the spend
//! ledger, the Anthropic text-generation provider, the HTTP tool gateway,
//! and configuration/data-directory loading.

pub mod config;
pub mod filesystem;
pub mod llm;
pub mod sqlite;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_server;
