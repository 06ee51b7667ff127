//! # pgpatch memory store
//!
//! In-memory implementations of pgpatch's patch store and database backend,
//! primarily for testing.
//!
//! ```ignore
//! use pgpatch_core::prelude::*;
//! use pgpatch_mem::{InMemoryDatabase, InMemoryPatchStore};
//!
//! let store = InMemoryPatchStore::from_iter([
//!     ("1_init.up.sql", "create table t(x int);"),
//!     ("2_seed.up.sql", "insert into t values (1);"),
//! ]);
//! let db = InMemoryDatabase::new();
//!
//! let migrator = Migrator::new(store).await?;
//! migrator.upgrade(&db).await?;
//! assert_eq!(db.executed_scripts().await.len(), 2);
//! ```

#![deny(missing_docs)]

mod database;
mod patch_store;

pub use database::*;
pub use patch_store::*;
