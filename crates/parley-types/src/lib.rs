//! Shared domain types for Parley.
//!
//! This crate contains the types passed between the session store, the turn
//! orchestrator, and the model boundary: messages, session scopes, LLM
//! request/stream shapes, service configuration, and their error types.
//!
//! Zero infrastructure dependencies -- only serde, thiserror, secrecy.

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
