//! Database bootstrap: pool creation and schema migration.

use anyhow::Result;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;

/// Schema applied by [`run_migrations`].
const INIT_SQL: &str = include_str!("../migrations/0001_init.sql");

/// Open the SQLite pool, creating the database file and its parent
/// directory when they do not exist yet.
pub async fn connect(db_url: &str) -> Result<SqlitePool> {
    // Extract the local file path SQLx will use
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");

    if !db_path.starts_with(":memory:") {
        let db_path_obj = Path::new(db_path);
        tracing::debug!("Interpreted SQLite path => {}", db_path);

        if let Some(parent) = db_path_obj.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }

        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_path)
        {
            Ok(_) => tracing::debug!("Database file can be created/opened."),
            Err(e) => tracing::warn!("Failed to open database file manually: {}", e),
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;
    Ok(pool)
}

/// Run the embedded schema, one statement at a time.
pub async fn run_migrations(db: &SqlitePool) -> Result<()> {
    let statements = INIT_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}
