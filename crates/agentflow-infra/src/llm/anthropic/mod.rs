//! Anthropic Claude text-generation provider.
//!
//! [`AnthropicProvider`] implements
//! [`TextGenerationProvider`](agentflow_core::llm::provider::TextGenerationProvider)
//! over the non-streaming Messages API.

pub mod client;
pub mod types;

pub use client::AnthropicProvider;
