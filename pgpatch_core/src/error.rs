//! Errors returned by migration runs.

use crate::catalog::CatalogError;
use crate::patch_store::PatchStoreError;

/// Errors that can occur while reading or advancing the schema version.
///
/// `E` is the error type of the [`SchemaBackend`](crate::SchemaBackend) in use.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError<E>
where
    E: std::error::Error + 'static,
{
    /// The patch set is invalid.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The version table could not be created or seeded.
    #[error("while creating version table {table}: {source}")]
    Initialize {
        /// The version table.
        table: String,
        /// The database error.
        #[source]
        source: E,
    },

    /// The current version could not be read.
    #[error("failed to retrieve current schema version from {table}: {source}")]
    ReadVersion {
        /// The version table.
        table: String,
        /// The database error.
        #[source]
        source: E,
    },

    /// The version table exists but holds no row.
    #[error("version table {table} has no version row")]
    MissingVersionRow {
        /// The version table.
        table: String,
    },

    /// A single step failed and was rolled back.
    #[error("failed to apply {filename} ({before} -> {after}): {source}")]
    Apply {
        /// The script of the failed step.
        filename: String,
        /// The version the step started from.
        before: i32,
        /// The version the step was moving to.
        after: i32,
        /// What went wrong.
        #[source]
        source: ApplyError<E>,
    },
}

impl<E> MigrateError<E>
where
    E: std::error::Error + 'static,
{
    /// Whether this error is an optimistic concurrency conflict.
    ///
    /// A conflicted run can be retried; it will start from the version that
    /// is now stored.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            MigrateError::Apply {
                source: ApplyError::Conflict { .. },
                ..
            }
        )
    }
}

/// Why a single step failed.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError<E>
where
    E: std::error::Error + 'static,
{
    /// The stored version was not the step's starting version.
    #[error("expected current version {expected}, found {found}")]
    Conflict {
        /// The step's starting version.
        expected: i32,
        /// The stored version.
        found: i32,
    },

    /// The version table holds no row.
    #[error("version table {table} has no version row")]
    MissingVersionRow {
        /// The version table.
        table: String,
    },

    /// The script could not be read from the patch store.
    #[error("while reading patch file: {0}")]
    Read(#[source] PatchStoreError),

    /// The script is not valid UTF-8.
    #[error("patch file is not valid UTF-8: {0}")]
    Encoding(#[source] std::string::FromUtf8Error),

    /// The database rejected the script.
    #[error("while executing patch: {0}")]
    Execution(#[source] E),

    /// Opening the transaction, updating the version or committing failed.
    #[error("Database error: {0}")]
    Database(#[source] E),
}
