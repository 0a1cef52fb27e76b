//! Error types for Regent core operations.

use thiserror::Error;

/// A specialized `Result` type for Regent core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating cluster state.
#[derive(Debug, Error)]
pub enum Error {
    /// The referenced store does not exist.
    #[error("store {0} not found")]
    StoreNotFound(u64),

    /// The referenced region does not exist.
    #[error("region {0} not found")]
    RegionNotFound(u64),
}
