//! Database capability definitions
//!
//! The migrator never talks to a database directly. It opens transactions on a
//! [`SchemaBackend`] and drives them through the narrow [`SchemaTransaction`]
//! interface, which covers the version table and raw script execution.

use async_trait::async_trait;

/// A database the migrator can open transactions on.
#[async_trait]
pub trait SchemaBackend: Send + Sync {
    /// The error returned by every database operation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The transaction type handed out by [`begin`](Self::begin).
    type Transaction: SchemaTransaction<Error = Self::Error>;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Transaction, Self::Error>;
}

/// An open transaction.
///
/// Dropping a transaction without calling [`commit`](Self::commit) must roll
/// it back. The migrator relies on this for every error path, and callers
/// rely on it for cancellation.
///
/// Table names passed to these methods have already been validated as plain
/// SQL identifiers and may be interpolated into statements.
#[async_trait]
pub trait SchemaTransaction: Send {
    /// The error returned by every operation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates the version table if it does not exist. Must be idempotent.
    async fn create_version_table(&mut self, table: &str) -> Result<(), Self::Error>;

    /// Inserts the single version row with version 0.
    ///
    /// Returns `false` without failing when the row already exists, which is
    /// how a lost initialization race shows up.
    async fn insert_initial_version(&mut self, table: &str) -> Result<bool, Self::Error>;

    /// Reads the version row, if there is one.
    async fn select_version(&mut self, table: &str) -> Result<Option<i32>, Self::Error>;

    /// Reads the version row and holds it against concurrent writers until the
    /// transaction ends.
    async fn select_version_for_update(&mut self, table: &str) -> Result<Option<i32>, Self::Error> {
        self.select_version(table).await
    }

    /// Overwrites the version stored in the version row.
    async fn update_version(&mut self, table: &str, version: i32) -> Result<(), Self::Error>;

    /// Executes a script body, which may hold several statements.
    async fn execute_script(&mut self, sql: &str) -> Result<(), Self::Error>;

    /// Commits the transaction.
    async fn commit(self) -> Result<(), Self::Error>;
}
