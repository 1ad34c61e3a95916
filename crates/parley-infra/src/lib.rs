//! Infrastructure layer for Parley.
//!
//! Contains implementations of the ports defined in `parley-core`: the Redis
//! session store and its shared connection handle, the OpenAI-compatible
//! generation provider, and the configuration loader.

pub mod config;
pub mod llm;
pub mod redis_store;
pub mod store;
