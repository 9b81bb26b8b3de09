//! Text-generation provider abstractions.
//!
//! - `TextGenerationProvider`: RPITIT trait for concrete providers
//! - `BoxTextGenerationProvider`: object-safe wrapper for dynamic dispatch

pub mod box_provider;
pub mod provider;
