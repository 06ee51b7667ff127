//! The persisted schema version.
//!
//! The version lives in a single-row table:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS schema_version (
//!     id INTEGER PRIMARY KEY CONSTRAINT one_version CHECK (id = 1),
//!     version INTEGER NOT NULL
//! )
//! ```
//!
//! Every operation here runs inside a transaction owned by the caller and
//! re-reads the row; nothing is cached in process.

use crate::backend::SchemaTransaction;

/// Errors returned by [`VersionStore`] operations.
#[derive(Debug, thiserror::Error)]
pub enum VersionStoreError<E>
where
    E: std::error::Error + 'static,
{
    /// The database failed.
    #[error("Database error: {0}")]
    Database(#[source] E),
    /// The version table exists but holds no row.
    #[error("version table {table} has no version row")]
    MissingRow {
        /// The version table.
        table: String,
    },
}

/// The outcome of a compare-and-set on the version row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The stored version matched and was replaced.
    Updated,
    /// The stored version did not match; nothing was written.
    Conflict {
        /// The version actually stored.
        found: i32,
    },
}

/// Reads and writes the version row of one version table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStore {
    table: String,
}

impl VersionStore {
    /// Creates a store for `table`, which must already be a validated identifier.
    pub(crate) fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// The version table this store manages.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the version table and seeds it with version 0 when it is empty.
    ///
    /// An existing row is never touched. If a concurrent initializer inserted
    /// the row first, the insert is a no-op and this still succeeds.
    pub async fn ensure_initialized<T>(&self, tx: &mut T) -> Result<(), VersionStoreError<T::Error>>
    where
        T: SchemaTransaction,
    {
        tx.create_version_table(&self.table)
            .await
            .map_err(VersionStoreError::Database)?;

        let existing = tx
            .select_version(&self.table)
            .await
            .map_err(VersionStoreError::Database)?;
        if existing.is_some() {
            // Table is already populated, so has been set up previously
            return Ok(());
        }

        let inserted = tx
            .insert_initial_version(&self.table)
            .await
            .map_err(VersionStoreError::Database)?;
        if inserted {
            log::debug!("Initialized version table {} at version 0", self.table);
        } else {
            log::debug!(
                "Version table {} was initialized concurrently",
                self.table
            );
        }
        Ok(())
    }

    /// Reads the current version.
    pub async fn read_current<T>(&self, tx: &mut T) -> Result<i32, VersionStoreError<T::Error>>
    where
        T: SchemaTransaction,
    {
        tx.select_version(&self.table)
            .await
            .map_err(VersionStoreError::Database)?
            .ok_or_else(|| VersionStoreError::MissingRow {
                table: self.table.clone(),
            })
    }

    /// Moves the version from `expected` to `after`.
    ///
    /// Returns [`CasOutcome::Conflict`] without writing anything when the
    /// stored version is not `expected`. The caller must then drop the
    /// transaction.
    pub async fn cas_update<T>(
        &self,
        tx: &mut T,
        expected: i32,
        after: i32,
    ) -> Result<CasOutcome, VersionStoreError<T::Error>>
    where
        T: SchemaTransaction,
    {
        let found = tx
            .select_version_for_update(&self.table)
            .await
            .map_err(VersionStoreError::Database)?
            .ok_or_else(|| VersionStoreError::MissingRow {
                table: self.table.clone(),
            })?;
        if found != expected {
            return Ok(CasOutcome::Conflict { found });
        }
        tx.update_version(&self.table, after)
            .await
            .map_err(VersionStoreError::Database)?;
        Ok(CasOutcome::Updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Debug, thiserror::Error)]
    #[error("no such table")]
    struct NoTable;

    /// A transaction over one optional table with at most one row.
    #[derive(Default)]
    struct FakeTx {
        table: Option<Option<i32>>,
        writes: Vec<i32>,
        /// A row another initializer commits between our select and insert.
        concurrent_row: Option<i32>,
    }

    #[async_trait]
    impl SchemaTransaction for FakeTx {
        type Error = NoTable;

        async fn create_version_table(&mut self, _table: &str) -> Result<(), NoTable> {
            self.table.get_or_insert(None);
            Ok(())
        }

        async fn insert_initial_version(&mut self, _table: &str) -> Result<bool, NoTable> {
            let row = self.table.as_mut().ok_or(NoTable)?;
            if let Some(version) = self.concurrent_row.take() {
                *row = Some(version);
                return Ok(false);
            }
            if row.is_some() {
                return Ok(false);
            }
            *row = Some(0);
            Ok(true)
        }

        async fn select_version(&mut self, _table: &str) -> Result<Option<i32>, NoTable> {
            self.table.ok_or(NoTable)
        }

        async fn update_version(&mut self, _table: &str, version: i32) -> Result<(), NoTable> {
            let row = self.table.as_mut().ok_or(NoTable)?;
            *row = Some(version);
            self.writes.push(version);
            Ok(())
        }

        async fn execute_script(&mut self, _sql: &str) -> Result<(), NoTable> {
            Ok(())
        }

        async fn commit(self) -> Result<(), NoTable> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn initialization_seeds_version_zero_once() {
        let store = VersionStore::new("schema_version");
        let mut tx = FakeTx::default();

        store.ensure_initialized(&mut tx).await.unwrap();
        assert_eq!(store.read_current(&mut tx).await.unwrap(), 0);

        tx.table = Some(Some(4));
        store.ensure_initialized(&mut tx).await.unwrap();
        assert_eq!(store.read_current(&mut tx).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn lost_initialization_race_proceeds() {
        let store = VersionStore::new("schema_version");
        let mut tx = FakeTx {
            concurrent_row: Some(0),
            ..Default::default()
        };

        store
            .ensure_initialized(&mut tx)
            .await
            .expect("Losing the insert should still succeed");
        assert!(tx.concurrent_row.is_none(), "The insert should have run");
        assert_eq!(store.read_current(&mut tx).await.unwrap(), 0);
        assert!(tx.writes.is_empty());
    }

    #[tokio::test]
    async fn missing_row_is_a_state_error() {
        let store = VersionStore::new("schema_version");
        let mut tx = FakeTx {
            table: Some(None),
            ..Default::default()
        };
        let err = store.read_current(&mut tx).await.unwrap_err();
        assert!(matches!(err, VersionStoreError::MissingRow { ref table } if table == "schema_version"));
    }

    #[tokio::test]
    async fn cas_writes_only_on_match() {
        let store = VersionStore::new("schema_version");
        let mut tx = FakeTx {
            table: Some(Some(2)),
            ..Default::default()
        };

        let outcome = store.cas_update(&mut tx, 1, 2).await.unwrap();
        assert_eq!(outcome, CasOutcome::Conflict { found: 2 });
        assert!(tx.writes.is_empty());

        let outcome = store.cas_update(&mut tx, 2, 3).await.unwrap();
        assert_eq!(outcome, CasOutcome::Updated);
        assert_eq!(tx.writes, vec![3]);
        assert_eq!(store.read_current(&mut tx).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn database_errors_are_propagated() {
        let store = VersionStore::new("schema_version");
        let mut tx = FakeTx::default();
        assert!(matches!(
            store.read_current(&mut tx).await,
            Err(VersionStoreError::Database(NoTable))
        ));
    }
}
