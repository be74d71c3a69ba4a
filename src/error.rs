//! Error types for csrasm

use crate::layout::GlobalOrdinal;
use thiserror::Error;

/// Result type alias using csrasm's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during linear-system assembly
///
/// Every variant is a caller/configuration error detected eagerly at a call
/// boundary. There is no recoverable-error channel inside the assembly core:
/// a partially assembled distributed system must never reach the solver, so
/// the driver is expected to treat any of these as fatal. Device allocation
/// failure does not appear here at all; it panics inside the backend.
#[derive(Error, Debug)]
pub enum Error {
    /// Row or column interval with lower > upper, or outside the global extent
    #[error("invalid {what} range [{lower}, {upper}]")]
    InvalidRange {
        /// Which range is malformed ("row", "column", ...)
        what: &'static str,
        /// Lower bound (inclusive)
        lower: GlobalOrdinal,
        /// Upper bound (inclusive)
        upper: GlobalOrdinal,
    },

    /// Malformed per-element row layout
    #[error("invalid row layout: {reason}")]
    InvalidLayout {
        /// What the validation found
        reason: String,
    },

    /// Array length does not match the constructor-supplied layout
    #[error("size mismatch for {what}: expected {expected}, got {got}")]
    SizeMismatch {
        /// Which array is mis-sized
        what: &'static str,
        /// Expected element count
        expected: usize,
        /// Actual element count
        got: usize,
    },

    /// A raw contribution references an index outside the global extent
    #[error("{what} index {index} out of bounds [0, {bound}) at contribution {pos}")]
    IndexOutOfBounds {
        /// What kind of index ("row", "column", "rhs vector")
        what: &'static str,
        /// The offending index
        index: GlobalOrdinal,
        /// Exclusive upper bound
        bound: GlobalOrdinal,
        /// Position in the raw contribution stream
        pos: usize,
    },

    /// Configured bogus sentinel collides with the valid index space
    #[error("bogus {what} sentinel {index} lies inside [0, {bound})")]
    InvalidSentinel {
        /// Which sentinel is misconfigured ("row", "column")
        what: &'static str,
        /// The configured sentinel value
        index: GlobalOrdinal,
        /// Exclusive upper bound of the valid index space
        bound: GlobalOrdinal,
    },

    /// Runtime counts exceed the capacity reserved on the first assembly
    ///
    /// Persistent buffers are sized once per assembler lifetime; growth is a
    /// contract violation, never a silent reallocation.
    #[error("capacity exceeded for {what}: need {needed}, reserved {reserved}")]
    CapacityExceeded {
        /// Which structure ran out of room
        what: &'static str,
        /// Count required by the current call
        needed: usize,
        /// Count reserved on first assembly
        reserved: usize,
    },

    /// `assemble()` called before a workspace was bound
    #[error("no workspace bound: call bind_workspace() before assemble()")]
    WorkspaceNotBound,

    /// The bound workspace is too small for this assembly
    #[error("workspace too small: need {needed} elements, pool holds {available}")]
    WorkspaceTooSmall {
        /// Scratch elements required
        needed: usize,
        /// Scratch elements available in the bound workspace
        available: usize,
    },

    /// Host staging requested before any `assemble()` completed
    #[error("nothing assembled: call assemble() before staging to host")]
    NotAssembled,

    /// Backend-specific error
    #[error("backend error: {0}")]
    Backend(String),
}
