//! Business logic and port definitions for Parley.
//!
//! This crate defines the "ports" (the `SessionStore` and `LlmProvider`
//! traits) that the infrastructure layer implements, plus the turn
//! orchestration built on top of them. It depends only on `parley-types` --
//! never on `parley-infra` or any database/network client crate.

pub mod chat;
pub mod llm;
pub mod session;
