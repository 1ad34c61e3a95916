//! HTTP API layer for Parley.
//!
//! Axum router exposing `/health`, `/chat` and `/history`, with `X-API-KEY`
//! authentication and a `{ "error": bool, ... }` JSON envelope.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod router;
