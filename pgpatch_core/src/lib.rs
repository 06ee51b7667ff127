//! # pgpatch core
//!
//! Applies an ordered set of versioned SQL patch scripts to a database and
//! records the applied version in the database itself.
//!
//! Patch scripts are named `<version>_<name>.up.sql` (and optionally
//! `<version>_<name>.down.sql`), with versions running 1, 2, 3... without
//! gaps. A [`Migrator`] validates the whole set up front, then brings any
//! database forward one script at a time:
//!
//! ```rust,ignore
//! use pgpatch_core::prelude::*;
//!
//! let migrator = Migrator::new(DirPatchStore::new("patches")).await?;
//! let applied = migrator.upgrade(&backend).await?;
//! assert_eq!(migrator.current_version(&backend).await?, migrator.latest_version());
//! ```

#![deny(missing_docs)]

pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod migration;
pub mod migrator;
pub mod patch_store;
pub mod version_store;

pub use backend::{SchemaBackend, SchemaTransaction};
pub use catalog::{Catalog, CatalogError};
pub use config::{DEFAULT_VERSION_TABLE, MigratorConfig};
pub use error::{ApplyError, MigrateError};
pub use migration::{Direction, Migration};
pub use migrator::{Migrator, migrate};
pub use patch_store::{DirPatchStore, PatchStore, PatchStoreError};

pub mod prelude {
    //! The prelude module for the `pgpatch_core` crate.
    pub use super::{
        ApplyError, Catalog, CatalogError, DEFAULT_VERSION_TABLE, Direction, DirPatchStore,
        MigrateError, Migration, Migrator, MigratorConfig, PatchStore, PatchStoreError,
        SchemaBackend, SchemaTransaction, migrate,
    };
}
