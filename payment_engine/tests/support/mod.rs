//! Shared setup for integration tests: a throw-away SQLite database per test, plus small builders.
#![allow(dead_code)]

use std::env;

use log::*;
use payment_engine::{SqliteDatabase, MIGRATOR};
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    create_database(url).await;
    run_migrations(url).await;
}

pub fn random_db_url() -> String {
    format!("sqlite://{}/ppg_test_{}.db", env::temp_dir().display(), rand::random::<u64>())
}

/// Creates a fresh, fully migrated database under a random path in the temp dir.
pub async fn new_test_db() -> SqliteDatabase {
    let url = random_db_url();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

/// A fresh idempotency key of valid length.
pub fn new_key() -> String {
    format!("key_{:032x}", rand::random::<u128>())
}

pub async fn run_migrations(url: &str) {
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    MIGRATOR.run(db.pool()).await.expect("Error running DB migrations");
    info!("🚀️ Migrations complete");
}

pub async fn create_database(url: &str) {
    if let Err(e) = Sqlite::drop_database(url).await {
        warn!("Error dropping database {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    info!("Created Sqlite database {url}");
}
