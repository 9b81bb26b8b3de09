//! Workflow engine core: definitions, step handlers, and durable execution.
//!
//! - `condition` -- tokenizer and evaluator for branch conditions
//! - `policy` -- checkpoint auto-approval rule
//! - `step` / `registry` -- step handler trait and name lookup
//! - `definition` / `dag` -- spec parsing, validation, handler binding
//! - `catalog` -- builtin and file-loaded workflow definitions
//! - `checkpoint` -- compare-and-swap persistence of state transitions
//! - `engine` -- invoke / run / resume

pub mod catalog;
pub mod checkpoint;
pub mod condition;
pub mod dag;
pub mod definition;
pub mod engine;
pub mod policy;
pub mod registry;
pub mod step;

#[cfg(test)]
pub(crate) mod testing;
