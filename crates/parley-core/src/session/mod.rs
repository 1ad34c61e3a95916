//! Session memory abstractions for Parley.
//!
//! Defines the scoped key format, the `SessionStore` port that the
//! infrastructure layer implements, the stored-entry codec shared by every
//! backend, and a process-local store used for tests and single-node runs.

pub mod box_store;
pub mod codec;
pub mod key;
pub mod memory;
pub mod store;
