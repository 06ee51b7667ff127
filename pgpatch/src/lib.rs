//! # pgpatch
//!
//! Versioned SQL patch scripts for PostgreSQL, applied one transaction at a
//! time with the schema version tracked in the database.

#![deny(missing_docs)]

pub use pgpatch_core::*;

#[cfg(feature = "in-memory")]
/// In-memory patch store and database backend.
pub mod mem {
    //! Contains the in-memory implementations, primarily for testing.
    pub use pgpatch_mem::*;
}

#[cfg(feature = "postgres")]
/// PostgreSQL backend.
pub mod pg {
    //! Contains the `sqlx` based postgres backend.
    pub use pgpatch_pg::*;
}

pub mod prelude {
    //! The prelude module for the `pgpatch` crate.
    pub use pgpatch_core::prelude::*;

    #[cfg(feature = "in-memory")]
    pub use super::mem::*;
    #[cfg(feature = "postgres")]
    pub use super::pg::*;
}
