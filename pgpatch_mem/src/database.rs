use async_trait::async_trait;
use pgpatch_core::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// The in-memory data store.
#[derive(Debug, Clone, Default)]
struct DatabaseState {
    /// Version tables by name; `None` is a table without its row.
    version_tables: HashMap<String, Option<i32>>,
    /// Committed script bodies, in execution order.
    executed: Vec<String>,
    /// Scripts containing any of these fragments fail to execute.
    rejected: Vec<String>,
}

/// An in-memory database backend.
///
/// This backend is useful for testing and development purposes. It does not
/// understand SQL: scripts are recorded, not run. Use
/// [`reject_scripts_containing`](Self::reject_scripts_containing) to make
/// scripts fail the way a real database would reject them.
///
/// Transactions are fully serialized. Each one holds the database lock from
/// [`begin`](SchemaBackend::begin) until it is committed or dropped, works on
/// a private copy, and only publishes that copy on commit.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDatabase {
    state: Arc<Mutex<DatabaseState>>,
}

/// Errors returned by the in-memory database.
#[derive(Debug, thiserror::Error)]
pub enum InMemoryDatabaseError {
    /// The referenced table does not exist.
    #[error("relation \"{0}\" does not exist")]
    MissingTable(String),
    /// The script contains a fragment registered for rejection.
    #[error("script rejected: contains {0:?}")]
    ScriptRejected(String),
}

impl InMemoryDatabase {
    /// Creates a new, empty `InMemoryDatabase`.
    pub fn new() -> Self {
        log::debug!("Creating a new InMemoryDatabase");
        Self::default()
    }

    /// Makes every script containing `fragment` fail to execute.
    pub async fn reject_scripts_containing(&self, fragment: impl Into<String>) {
        self.state.lock().await.rejected.push(fragment.into());
    }

    /// Committed script bodies, in execution order.
    pub async fn executed_scripts(&self) -> Vec<String> {
        self.state.lock().await.executed.clone()
    }

    /// Whether the version table exists.
    pub async fn has_table(&self, table: &str) -> bool {
        self.state.lock().await.version_tables.contains_key(table)
    }

    /// The committed version stored in `table`, if the table and its row exist.
    pub async fn version(&self, table: &str) -> Option<i32> {
        self.state
            .lock()
            .await
            .version_tables
            .get(table)
            .copied()
            .flatten()
    }

    /// Overwrites the stored version outside of any migration, as another
    /// process or an operator would.
    pub async fn set_version(&self, table: &str, version: i32) {
        self.state
            .lock()
            .await
            .version_tables
            .insert(table.to_string(), Some(version));
    }

    /// Deletes the version row, leaving the table in place.
    pub async fn delete_version_row(&self, table: &str) {
        if let Some(row) = self.state.lock().await.version_tables.get_mut(table) {
            *row = None;
        }
    }
}

#[async_trait]
impl SchemaBackend for InMemoryDatabase {
    type Error = InMemoryDatabaseError;
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Transaction, Self::Error> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTransaction { guard, working })
    }
}

/// A transaction on an [`InMemoryDatabase`].
///
/// Dropping it without committing discards every change made through it.
#[derive(Debug)]
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<DatabaseState>,
    working: DatabaseState,
}

impl InMemoryTransaction {
    fn row_mut(&mut self, table: &str) -> Result<&mut Option<i32>, InMemoryDatabaseError> {
        self.working
            .version_tables
            .get_mut(table)
            .ok_or_else(|| InMemoryDatabaseError::MissingTable(table.to_string()))
    }
}

#[async_trait]
impl SchemaTransaction for InMemoryTransaction {
    type Error = InMemoryDatabaseError;

    async fn create_version_table(&mut self, table: &str) -> Result<(), Self::Error> {
        self.working
            .version_tables
            .entry(table.to_string())
            .or_insert(None);
        Ok(())
    }

    async fn insert_initial_version(&mut self, table: &str) -> Result<bool, Self::Error> {
        let row = self.row_mut(table)?;
        if row.is_some() {
            return Ok(false);
        }
        *row = Some(0);
        Ok(true)
    }

    async fn select_version(&mut self, table: &str) -> Result<Option<i32>, Self::Error> {
        Ok(*self.row_mut(table)?)
    }

    async fn update_version(&mut self, table: &str, version: i32) -> Result<(), Self::Error> {
        // Like an UPDATE without a matching row, a missing row is left alone.
        if let Some(current) = self.row_mut(table)? {
            *current = version;
        }
        Ok(())
    }

    async fn execute_script(&mut self, sql: &str) -> Result<(), Self::Error> {
        if let Some(fragment) = self.working.rejected.iter().find(|f| sql.contains(f.as_str())) {
            return Err(InMemoryDatabaseError::ScriptRejected(fragment.clone()));
        }
        self.working.executed.push(sql.to_string());
        Ok(())
    }

    async fn commit(mut self) -> Result<(), Self::Error> {
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }
}
