mod common;

use pgpatch_core::prelude::*;
use pgpatch_mem::InMemoryPatchStore;
use pgpatch_pg::PgBackend;
use serial_test::serial;
use sqlx::PgPool;

async fn teardown(pool: &PgPool) {
    sqlx::query("DROP TABLE IF EXISTS pgpatch_t CASCADE")
        .execute(pool)
        .await
        .expect("Failed to drop test table");
    sqlx::query("DROP TABLE IF EXISTS schema_version CASCADE")
        .execute(pool)
        .await
        .expect("Failed to drop version table");
    sqlx::query("DROP TABLE IF EXISTS pgpatch_levels CASCADE")
        .execute(pool)
        .await
        .expect("Failed to drop custom version table");
}

fn init_and_seed() -> InMemoryPatchStore {
    InMemoryPatchStore::from_iter([
        ("1_init.up.sql", "create table pgpatch_t(x int);"),
        ("2_seed.up.sql", "insert into pgpatch_t values (1);"),
    ])
}

async fn count_rows(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM pgpatch_t")
        .fetch_one(pool)
        .await
        .expect("Failed to count rows")
}

#[tokio::test]
#[serial]
async fn test_current_version_creates_version_table() {
    let pool = common::get_pg_pool().await;
    teardown(&pool).await;
    let backend = PgBackend::new(pool.clone());

    let migrator = Migrator::new(init_and_seed()).await.expect("Should build");
    let version = migrator
        .current_version(&backend)
        .await
        .expect("Should get version");
    assert_eq!(version, 0, "Initial version should be 0");

    let result: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM information_schema.tables
        WHERE table_name = 'schema_version'
        "#,
    )
    .fetch_one(&pool)
    .await
    .expect("Failed to query information_schema");
    assert_eq!(result.0, 1, "schema_version table should exist");

    let rows: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schema_version")
        .fetch_one(&pool)
        .await
        .expect("Failed to count version rows");
    assert_eq!(rows.0, 1, "Exactly one version row should exist");

    teardown(&pool).await;
}

#[tokio::test]
#[serial]
async fn test_upgrade_runs_scripts_in_order() {
    let pool = common::get_pg_pool().await;
    teardown(&pool).await;
    let backend = PgBackend::new(pool.clone());

    let migrator = Migrator::new(init_and_seed()).await.expect("Should build");
    assert_eq!(migrator.latest_version(), 2);

    let applied = migrator.upgrade(&backend).await.expect("Should upgrade");
    assert_eq!(applied, 2);
    assert_eq!(migrator.current_version(&backend).await.unwrap(), 2);
    assert_eq!(count_rows(&pool).await, 1);

    teardown(&pool).await;
}

#[tokio::test]
#[serial]
async fn test_upgrade_is_idempotent() {
    let pool = common::get_pg_pool().await;
    teardown(&pool).await;
    let backend = PgBackend::new(pool.clone());
    let migrator = Migrator::new(init_and_seed()).await.unwrap();

    assert_eq!(migrator.upgrade(&backend).await.unwrap(), 2);
    assert_eq!(migrator.upgrade(&backend).await.unwrap(), 0);
    assert_eq!(migrator.upgrade(&backend).await.unwrap(), 0);
    assert_eq!(count_rows(&pool).await, 1, "Seed must run exactly once");

    teardown(&pool).await;
}

#[tokio::test]
#[serial]
async fn test_failing_script_rolls_back_its_step() {
    let pool = common::get_pg_pool().await;
    teardown(&pool).await;
    let backend = PgBackend::new(pool.clone());

    let store = init_and_seed().with_file(
        "3_broken.up.sql",
        "insert into pgpatch_t values (2); insert into no_such_table values (1);",
    );
    let migrator = Migrator::new(store).await.unwrap();

    let err = migrator.upgrade(&backend).await.unwrap_err();
    assert!(matches!(
        err,
        MigrateError::Apply {
            before: 2,
            after: 3,
            source: ApplyError::Execution(_),
            ..
        }
    ));
    assert_eq!(migrator.current_version(&backend).await.unwrap(), 2);
    assert_eq!(
        count_rows(&pool).await,
        1,
        "The first statement of the failed script must be rolled back"
    );

    teardown(&pool).await;
}

#[tokio::test]
#[serial]
async fn test_stale_step_conflicts() {
    let pool = common::get_pg_pool().await;
    teardown(&pool).await;
    let backend = PgBackend::new(pool.clone());
    let migrator = Migrator::new(init_and_seed()).await.unwrap();
    migrator.upgrade(&backend).await.unwrap();

    let err = migrator
        .apply(&backend, 1, 2, "2_seed.up.sql")
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(count_rows(&pool).await, 1);

    teardown(&pool).await;
}

#[tokio::test]
#[serial]
async fn test_racing_upgrades_apply_each_step_once() {
    let pool = common::get_pg_pool().await;
    teardown(&pool).await;
    let backend = PgBackend::new(pool.clone());
    let migrator = Migrator::new(init_and_seed()).await.unwrap();
    migrator.current_version(&backend).await.unwrap();

    let (first, second) = tokio::join!(migrator.upgrade(&backend), migrator.upgrade(&backend));
    for result in [&first, &second] {
        if let Err(e) = result {
            assert!(e.is_conflict(), "Only conflicts are expected, got {e}");
        }
    }
    assert!(first.is_ok() || second.is_ok());

    // Whoever lost can simply run again.
    migrator.upgrade(&backend).await.unwrap();
    assert_eq!(migrator.current_version(&backend).await.unwrap(), 2);
    assert_eq!(count_rows(&pool).await, 1, "Seed must run exactly once");

    teardown(&pool).await;
}

#[tokio::test]
#[serial]
async fn test_racing_first_runs_both_initialize() {
    let pool = common::get_pg_pool().await;
    teardown(&pool).await;
    let backend = PgBackend::new(pool.clone());
    let migrator = Migrator::new(init_and_seed()).await.unwrap();

    let (first, second) = tokio::join!(
        migrator.current_version(&backend),
        migrator.current_version(&backend)
    );
    assert_eq!(first.expect("First initializer should succeed"), 0);
    assert_eq!(second.expect("Second initializer should succeed"), 0);

    let rows: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schema_version")
        .fetch_one(&pool)
        .await
        .expect("Failed to count version rows");
    assert_eq!(rows.0, 1, "Exactly one version row should exist");

    teardown(&pool).await;
}

#[tokio::test]
#[serial]
async fn test_custom_version_table() {
    let pool = common::get_pg_pool().await;
    teardown(&pool).await;
    let backend = PgBackend::new(pool.clone());

    let config = MigratorConfig::default().with_version_table("pgpatch_levels");
    let migrator = Migrator::with_config(init_and_seed(), config)
        .await
        .unwrap();
    migrator.upgrade(&backend).await.unwrap();

    let version: i32 = sqlx::query_scalar("SELECT version FROM pgpatch_levels")
        .fetch_one(&pool)
        .await
        .expect("Failed to read custom version table");
    assert_eq!(version, 2);

    teardown(&pool).await;
}
