//! LLM provider abstractions for Parley.
//!
//! - `LlmProvider`: RPITIT trait for concrete provider implementations
//! - `BoxLlmProvider`: Object-safe wrapper for dynamic dispatch
//! - `mock`: scripted provider used by tests across the workspace

pub mod box_provider;
pub mod mock;
pub mod provider;
