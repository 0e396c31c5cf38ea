//! Storage abstraction for guildhall.
//!
//! Backend crates (e.g., guildhall-store-sqlite) implement the [`Store`]
//! trait so `guildhall-core` doesn't depend on any specific database engine
//! or schema details.

use thiserror::Error;

mod store;
pub mod types;

pub use store::Store;
pub use types::*;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    /// A transactional invariant check failed (e.g. member capacity).
    #[error("conflict")]
    Conflict,
    #[error("backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "test-support")]
pub use store::MockStore;
