//! # pgpatch postgres backend
//!
//! Runs pgpatch migrations against PostgreSQL through an `sqlx` pool.
//!
//! ```rust,ignore
//! use pgpatch_core::prelude::*;
//! use pgpatch_pg::PgBackend;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://...").await?;
//! let backend = PgBackend::new(pool);
//!
//! let migrator = Migrator::new(DirPatchStore::new("patches")).await?;
//! let applied = migrator.upgrade(&backend).await?;
//! println!("Applied {} patches", applied);
//! ```

#![deny(missing_docs)]

/// The backend and transaction types for postgres
pub mod backend;

pub use backend::*;
