use async_trait::async_trait;
use pgpatch_core::prelude::{SchemaBackend, SchemaTransaction};
use sqlx::{PgPool, Postgres, Transaction};

/// A postgres database the migrator can apply patches to.
///
/// Each migration step runs on its own pooled connection inside a single
/// transaction.
#[derive(Clone, Debug)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    /// Creates a new `PgBackend` over the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        log::debug!("Creating a new PgBackend");
        Self { pool }
    }

    /// Exposes the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<PgPool> for PgBackend {
    fn from(pool: PgPool) -> Self {
        Self::new(pool)
    }
}

#[async_trait]
impl SchemaBackend for PgBackend {
    type Error = sqlx::Error;
    type Transaction = PgSchemaTransaction;

    async fn begin(&self) -> Result<Self::Transaction, Self::Error> {
        Ok(PgSchemaTransaction {
            tx: self.pool.begin().await?,
        })
    }
}

/// An open postgres transaction.
///
/// Dropping it without committing rolls it back, including when the future
/// driving a migration step is cancelled.
#[derive(Debug)]
pub struct PgSchemaTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SchemaTransaction for PgSchemaTransaction {
    type Error = sqlx::Error;

    async fn create_version_table(&mut self, table: &str) -> Result<(), Self::Error> {
        // Concurrent `CREATE TABLE IF NOT EXISTS` can still collide on the
        // catalog's unique index. Initializers of the same table queue on this
        // lock until the winner's transaction ends.
        sqlx::query(
            r#"
            SELECT pg_advisory_xact_lock(
                ('x' || substr(md5($1), 1, 8))::bit(32)::int,
                ('x' || substr(md5($1), 9, 8))::bit(32)::int
            )
            "#,
        )
        .bind(table)
        .execute(&mut *self.tx)
        .await?;

        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY CONSTRAINT one_version CHECK (id = 1),
                version INTEGER NOT NULL
            )
            "#
        );
        sqlx::query(&sql).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn insert_initial_version(&mut self, table: &str) -> Result<bool, Self::Error> {
        // A concurrent initializer holding the id = 1 row makes this a no-op
        // instead of a unique violation that would abort the transaction.
        let sql =
            format!("INSERT INTO {table} (id, version) VALUES (1, 0) ON CONFLICT (id) DO NOTHING");
        let result = sqlx::query(&sql).execute(&mut *self.tx).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn select_version(&mut self, table: &str) -> Result<Option<i32>, Self::Error> {
        let sql = format!("SELECT version FROM {table} WHERE id = 1");
        sqlx::query_scalar(&sql)
            .fetch_optional(&mut *self.tx)
            .await
    }

    async fn select_version_for_update(&mut self, table: &str) -> Result<Option<i32>, Self::Error> {
        // Under READ COMMITTED a plain read would let two racing steps both
        // see the old version. The row lock makes the loser wait and then
        // read the committed value.
        let sql = format!("SELECT version FROM {table} WHERE id = 1 FOR UPDATE");
        sqlx::query_scalar(&sql)
            .fetch_optional(&mut *self.tx)
            .await
    }

    async fn update_version(&mut self, table: &str, version: i32) -> Result<(), Self::Error> {
        let sql = format!("UPDATE {table} SET version = $1 WHERE id = 1");
        sqlx::query(&sql)
            .bind(version)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn execute_script(&mut self, sql: &str) -> Result<(), Self::Error> {
        let conn: &mut sqlx::PgConnection = &mut self.tx;
        sqlx::Executor::execute(conn, sqlx::raw_sql(sql)).await?;
        Ok(())
    }

    async fn commit(self) -> Result<(), Self::Error> {
        self.tx.commit().await
    }
}
