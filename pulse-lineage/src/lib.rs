//! # Pulse Lineage
//!
//! Lineage closure maintenance and execution ancestry for Pulse.
//!
//! The address-lineage closure is a transitive-reachability index with a
//! witness path per `(source, target)` pair. When a pipeline's edge set is
//! replaced, the engine expands the affected connected component over the
//! committed edges of *all* pipelines, deletes every closure row touching
//! that component and rebuilds it in memory before one bulk insert. The
//! execution ancestry closure keeps `(ancestor, descendant, depth)` rows so
//! arbitrary-depth DAG queries cost only the rows returned.

pub mod ancestry;
pub mod closure;
pub mod component;
pub mod rebuild;
pub mod traversal;

// Re-export commonly used types
pub use ancestry::{ancestry_rows, AncestryEngine};
pub use closure::propagate_closure;
pub use component::ComponentGraph;
pub use rebuild::{ClosureRebuilder, RebuildSummary};
pub use traversal::{expand_component, EdgeSource};

/// Result type for lineage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for lineage operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] pulse_storage::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Storage(e) => e.is_transient(),
            Error::Internal(_) => true,
            Error::NotFound(_) => false,
        }
    }
}
