//! Business logic and port definitions for agentflow.
//!
//! This crate defines the "ports" (repository and collaborator traits) that
//! the infrastructure layer implements, plus the workflow engine that drives
//! runs through them. It depends only on `agentflow-types` -- never on
//! `agentflow-infra` or any database/IO crate.

pub mod budget;
pub mod llm;
pub mod repository;
pub mod routing;
pub mod steps;
pub mod tools;
pub mod workflow;
