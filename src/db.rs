//! Database pool bootstrap.
//!
//! Schema automation lives outside this crate (§1); repositories are
//! written against the field contracts of the data model and exercised in
//! tests against ad hoc in-memory pools, so no migration files ship here.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
}
