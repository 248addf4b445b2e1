//! Job repository for the AdReel engine.
//!
//! Replaces a whole-file-rewrite job document with an explicit repository
//! interface backed by an atomic per-key store, while preserving
//! incremental visibility of progress for concurrent status readers.

pub mod error;
pub mod store;

pub use error::{JobStoreError, JobStoreResult};
pub use store::{JobMutation, JobStore, MemoryJobStore};
