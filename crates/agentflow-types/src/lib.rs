//! Shared domain types for agentflow.
//!
//! This crate contains the types passed between the engine, its storage
//! adapters, and the CLI: workflow state and specs, the chain and agent
//! contexts, approval requests, configuration, and error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod agent;
pub mod approval;
pub mod chain;
pub mod config;
pub mod error;
pub mod prompt;
pub mod workflow;
