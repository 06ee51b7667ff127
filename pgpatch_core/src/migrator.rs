//! Applies patch scripts to a database.

use crate::backend::{SchemaBackend, SchemaTransaction};
use crate::catalog::{Catalog, CatalogError};
use crate::config::{MigratorConfig, is_valid_table_name};
use crate::error::{ApplyError, MigrateError};
use crate::migration::Migration;
use crate::patch_store::PatchStore;
use crate::version_store::{CasOutcome, VersionStore, VersionStoreError};

/// Updates `backend` to the newest version found in `store`, using the
/// default configuration.
///
/// Returns the number of scripts applied.
pub async fn migrate<S, B>(store: S, backend: &B) -> Result<usize, MigrateError<B::Error>>
where
    S: PatchStore,
    B: SchemaBackend,
{
    let migrator = Migrator::new(store).await?;
    migrator.upgrade(backend).await
}

/// Brings database schemas up to the latest version of a patch set.
///
/// A migrator is built once from a snapshot of its patch store and never
/// changes afterwards, so it can be reused against any number of databases.
/// The schema version is tracked in a single-row table (by default
/// `schema_version`) which is created on first use.
///
/// Each script runs in its own transaction together with the version bump,
/// so a committed step is final and a failed step leaves no trace. Down
/// scripts are validated and exposed through [`down`](Self::down) but are
/// never executed.
#[derive(Debug, Clone)]
pub struct Migrator<S> {
    store: S,
    versions: VersionStore,
    catalog: Catalog,
}

impl<S> Migrator<S>
where
    S: PatchStore,
{
    /// Builds a migrator, rejecting `*.sql` files that are not patch scripts.
    pub async fn new(store: S) -> Result<Self, CatalogError> {
        Self::with_config(store, MigratorConfig::default()).await
    }

    /// Builds a migrator, ignoring `*.sql` files that are not patch scripts.
    pub async fn new_loose(store: S) -> Result<Self, CatalogError> {
        Self::with_config(store, MigratorConfig::loose()).await
    }

    /// Builds a migrator from an explicit configuration.
    pub async fn with_config(store: S, config: MigratorConfig) -> Result<Self, CatalogError> {
        if !is_valid_table_name(&config.version_table) {
            return Err(CatalogError::InvalidVersionTable(config.version_table));
        }
        let catalog = Catalog::build(&store, config.strict).await?;
        log::debug!(
            "Built catalog with {} up scripts (down scripts: {})",
            catalog.up().len(),
            catalog.down().map_or(0, |down| down.len())
        );
        Ok(Self {
            store,
            versions: VersionStore::new(config.version_table),
            catalog,
        })
    }

    /// Switches to a different version table.
    pub fn with_version_table(mut self, name: impl Into<String>) -> Result<Self, CatalogError> {
        let name = name.into();
        if !is_valid_table_name(&name) {
            return Err(CatalogError::InvalidVersionTable(name));
        }
        self.versions = VersionStore::new(name);
        Ok(self)
    }

    /// The name of the version table.
    pub fn version_table(&self) -> &str {
        self.versions.table()
    }

    /// The validated patch set.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The up scripts, ascending by version.
    pub fn up(&self) -> &[Migration] {
        self.catalog.up()
    }

    /// The down scripts, ascending by version, if the store has any.
    pub fn down(&self) -> Option<&[Migration]> {
        self.catalog.down()
    }

    /// The highest schema version available.
    pub fn latest_version(&self) -> i32 {
        self.catalog.latest_version()
    }

    /// Returns the current schema version of a database, creating the
    /// version table at version 0 if it does not exist yet.
    pub async fn current_version<B>(&self, backend: &B) -> Result<i32, MigrateError<B::Error>>
    where
        B: SchemaBackend,
    {
        let table = self.version_table();
        let mut tx = backend
            .begin()
            .await
            .map_err(|source| MigrateError::Initialize {
                table: table.to_string(),
                source,
            })?;

        self.versions
            .ensure_initialized(&mut tx)
            .await
            .map_err(|e| match e {
                VersionStoreError::Database(source) => MigrateError::Initialize {
                    table: table.to_string(),
                    source,
                },
                VersionStoreError::MissingRow { table } => MigrateError::MissingVersionRow { table },
            })?;

        let version = self
            .versions
            .read_current(&mut tx)
            .await
            .map_err(|e| self.read_error(e))?;

        tx.commit()
            .await
            .map_err(|source| MigrateError::Initialize {
                table: table.to_string(),
                source,
            })?;

        Ok(version)
    }

    /// Returns the up scripts not yet applied to a database.
    pub async fn pending<B>(&self, backend: &B) -> Result<Vec<&Migration>, MigrateError<B::Error>>
    where
        B: SchemaBackend,
    {
        let current = self.current_version(backend).await?;
        Ok(self
            .up()
            .iter()
            .filter(|m| m.version > current)
            .collect())
    }

    /// Runs a single step: moves the version from `before` to `after` and
    /// executes `filename`, in one transaction.
    ///
    /// Fails with a conflict, leaving the database untouched, when the stored
    /// version is not `before` at the time the transaction reads it.
    pub async fn apply<B>(
        &self,
        backend: &B,
        before: i32,
        after: i32,
        filename: &str,
    ) -> Result<(), MigrateError<B::Error>>
    where
        B: SchemaBackend,
    {
        self.apply_step(backend, before, after, filename)
            .await
            .map_err(|source| MigrateError::Apply {
                filename: filename.to_string(),
                before,
                after,
                source,
            })
    }

    async fn apply_step<B>(
        &self,
        backend: &B,
        before: i32,
        after: i32,
        filename: &str,
    ) -> Result<(), ApplyError<B::Error>>
    where
        B: SchemaBackend,
    {
        // Dropping `tx` on any early return rolls the step back.
        let mut tx = backend.begin().await.map_err(ApplyError::Database)?;

        let outcome = self
            .versions
            .cas_update(&mut tx, before, after)
            .await
            .map_err(|e| match e {
                VersionStoreError::Database(e) => ApplyError::Database(e),
                VersionStoreError::MissingRow { table } => ApplyError::MissingVersionRow { table },
            })?;
        if let CasOutcome::Conflict { found } = outcome {
            return Err(ApplyError::Conflict {
                expected: before,
                found,
            });
        }

        let bytes = self
            .store
            .read_bytes(filename)
            .await
            .map_err(ApplyError::Read)?;
        let sql = String::from_utf8(bytes).map_err(ApplyError::Encoding)?;

        tx.execute_script(&sql)
            .await
            .map_err(ApplyError::Execution)?;

        tx.commit().await.map_err(ApplyError::Database)
    }

    /// Updates the database schema to the newest version.
    ///
    /// Scripts at or below the stored version are skipped, so an interrupted
    /// run can simply be repeated. Stops at the first failing script; steps
    /// committed before it stay committed.
    ///
    /// Returns the number of scripts applied.
    pub async fn upgrade<B>(&self, backend: &B) -> Result<usize, MigrateError<B::Error>>
    where
        B: SchemaBackend,
    {
        let mut current = self.current_version(backend).await?;
        let mut count = 0;

        for migration in self.up() {
            if current >= migration.version {
                log::debug!(
                    "Skipping {} (version {}): already applied",
                    migration.filename,
                    migration.version
                );
                continue;
            }

            log::info!(
                "Applying {} ({} -> {})...",
                migration.filename,
                current,
                migration.version
            );

            if let Err(e) = self
                .apply(backend, current, migration.version, &migration.filename)
                .await
            {
                log::warn!("Stopping upgrade at version {}: {}", current, e);
                return Err(e);
            }

            log::info!(
                "{} applied successfully, schema is at version {}",
                migration.filename,
                migration.version
            );
            current = migration.version;
            count += 1;
        }

        Ok(count)
    }

    fn read_error<E>(&self, err: VersionStoreError<E>) -> MigrateError<E>
    where
        E: std::error::Error + 'static,
    {
        match err {
            VersionStoreError::Database(source) => MigrateError::ReadVersion {
                table: self.version_table().to_string(),
                source,
            },
            VersionStoreError::MissingRow { table } => MigrateError::MissingVersionRow { table },
        }
    }
}
