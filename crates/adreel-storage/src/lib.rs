//! Durable storage for generated media.
//!
//! This crate provides:
//! - The `StorageSink` capability the engine depends on (put bytes →
//!   public URL, fetch URL → local file)
//! - An R2/S3-compatible object-store implementation
//! - A filesystem-backed sink for tests and local development

pub mod error;
pub mod s3;
pub mod sink;

pub use error::{StorageError, StorageResult};
pub use s3::{ObjectStoreConfig, ObjectStoreSink};
pub use sink::{LocalSink, StorageSink};
