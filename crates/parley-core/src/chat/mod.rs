//! Chat turn orchestration for Parley.
//!
//! `TurnOrchestrator` combines the session store and the generation provider
//! per turn; `relay` streams generation output to a response sink; and
//! `BackgroundWrites` owns the detached persistence writes and their failure
//! accounting.

pub mod background;
pub mod orchestrator;
pub mod relay;
