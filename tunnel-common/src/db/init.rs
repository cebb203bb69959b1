//! Database initialization
//!
//! Creates the inspection schema on first run and opens existing databases
//! without touching their data. All statements are idempotent.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Default max total wait for retried writes under lock contention
pub const DEFAULT_MAX_LOCK_WAIT_MS: &str = "5000";

/// SQLite busy timeout applied to every pooled connection
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // WAL allows concurrent readers alongside the single writer; the short
    // busy timeout hands longer contention to retry_on_lock
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// Limited to one connection: every SQLite `:memory:` connection is its
/// own database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables and default settings on an open pool
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    create_settings_table(pool).await?;
    create_profiles_table(pool).await?;
    create_tunnels_table(pool).await?;
    create_sections_table(pool).await?;
    create_inspections_table(pool).await?;
    create_crack_features_table(pool).await?;
    create_emergency_alerts_table(pool).await?;

    init_default_settings(pool).await?;

    Ok(())
}

/// Create the settings table
///
/// Stores operational key-value pairs (lock wait tuning).
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_profiles_table(pool: &SqlitePool) -> Result<()> {
    // PRIMARY KEY on id is the provisioning race arbiter
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL CHECK (length(trim(full_name)) > 0),
            role TEXT NOT NULL CHECK (role IN ('Admin', 'Inspector')),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tunnels_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tunnels (
            tunnel_id TEXT PRIMARY KEY,
            name TEXT NOT NULL CHECK (length(trim(name)) > 0),
            location TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sections_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sections (
            section_id TEXT PRIMARY KEY,
            tunnel_id TEXT NOT NULL REFERENCES tunnels(tunnel_id),
            name TEXT NOT NULL CHECK (length(trim(name)) > 0),
            description TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sections_name ON sections(name COLLATE NOCASE)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_inspections_table(pool: &SqlitePool) -> Result<()> {
    // Classification columns are all NULL or all set
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inspections (
            inspection_id TEXT PRIMARY KEY,
            section_id TEXT NOT NULL REFERENCES sections(section_id),
            engineer_id TEXT NOT NULL REFERENCES profiles(id),
            inspection_date TEXT NOT NULL,
            notes TEXT,
            image_url TEXT,
            defect_type TEXT CHECK (defect_type IN
                ('Crack', 'Water Seepage', 'Structural Damage', 'No Defects', 'Unclassified')),
            severity TEXT CHECK (severity IN ('Low', 'Medium', 'High', 'Critical')),
            confidence_score REAL CHECK (confidence_score >= 0 AND confidence_score <= 100),
            status TEXT NOT NULL DEFAULT 'Pending'
                CHECK (status IN ('Pending', 'Analyzed', 'Resolved')),
            created_at TEXT NOT NULL,
            CHECK (
                (defect_type IS NULL AND severity IS NULL AND confidence_score IS NULL)
                OR (defect_type IS NOT NULL AND severity IS NOT NULL AND confidence_score IS NOT NULL)
            )
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_inspections_engineer ON inspections(engineer_id, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_crack_features_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crack_features (
            feature_id TEXT PRIMARY KEY,
            inspection_id TEXT NOT NULL UNIQUE REFERENCES inspections(inspection_id),
            crack_density REAL CHECK (crack_density >= 0),
            avg_crack_length REAL CHECK (avg_crack_length >= 0),
            max_crack_width REAL CHECK (max_crack_width >= 0),
            predicted_days_to_fix REAL CHECK (predicted_days_to_fix >= 0),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_emergency_alerts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS emergency_alerts (
            alert_id TEXT PRIMARY KEY,
            inspector_id TEXT NOT NULL REFERENCES profiles(id),
            tunnel_id TEXT REFERENCES tunnels(tunnel_id),
            message TEXT NOT NULL CHECK (length(trim(message)) > 0),
            urgent INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'Active'
                CHECK (status IN ('Active', 'In Progress', 'Resolved')),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_alerts_created ON emergency_alerts(created_at DESC, alert_id DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or repair default settings
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "db_max_lock_wait_ms", DEFAULT_MAX_LOCK_WAIT_MS).await?;
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting exists but has a NULL value, it is reset to the default.
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    match value {
        None => {
            // INSERT OR IGNORE: concurrent initializers may race past the lookup
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;

            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
        Some(None) => {
            sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
                .bind(default_value)
                .bind(key)
                .execute(pool)
                .await?;

            warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
        }
        Some(Some(_)) => {}
    }

    Ok(())
}

/// Read an integer setting, falling back to `default` when missing or unparsable
pub async fn get_setting_i64(pool: &SqlitePool, key: &str, default: i64) -> Result<i64> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    Ok(value
        .flatten()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default))
}
