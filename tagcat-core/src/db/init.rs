//! Database initialization
//!
//! Creates the database on first use and brings the schema and default
//! settings up idempotently; safe to call from every process at startup.

use std::path::Path;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::Result;

/// Fixed identity for automated writes (retirement reports, tag creation
/// from batch jobs). Seeded at init with admin level.
pub const SYSTEM_USER_GUID: &str = "00000000-0000-0000-0000-000000000001";

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Counter updates arrive from many request workers at once; keep the
    // pool wide enough that lock-ordered writers are not also queueing for
    // connections.
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL allows concurrent readers with one writer; count updates and the
    // reconcile scan run alongside live reads.
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    // Initial busy timeout; re-applied below from the settings table once
    // it exists.
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    // Schema creation (idempotent - safe to call multiple times)
    create_settings_table(&pool).await?;
    create_users_table(&pool).await?;
    create_tags_table(&pool).await?;
    create_tag_relationships_table(&pool).await?;
    create_items_table(&pool).await?;
    create_topics_table(&pool).await?;
    create_topic_posts_table(&pool).await?;

    init_default_settings(&pool).await?;

    // Apply configurable busy timeout from settings
    let timeout_ms: i64 = sqlx::query_scalar::<_, Option<i64>>(
        "SELECT CAST(value AS INTEGER) FROM settings WHERE key = 'db_busy_timeout_ms'",
    )
    .fetch_optional(&pool)
    .await?
    .flatten()
    .unwrap_or(5000);

    let pragma_sql = format!("PRAGMA busy_timeout = {}", timeout_ms);
    sqlx::query(&pragma_sql).execute(&pool).await?;

    info!("Database busy timeout set to {} ms", timeout_ms);

    Ok(pool)
}

/// Create the settings table
///
/// Stores operational tunables as key-value pairs.
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

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            level INTEGER NOT NULL DEFAULT 20,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (level > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create the System user if it doesn't exist
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO users (guid, name, level)
        VALUES (?, 'System', 50)
        "#,
    )
    .bind(SYSTEM_USER_GUID)
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the tags table
///
/// `post_count` is the denormalized usage counter; `is_locked` freezes the
/// category against non-admin changes.
pub async fn create_tags_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            name TEXT PRIMARY KEY,
            category INTEGER NOT NULL DEFAULT 0,
            post_count INTEGER NOT NULL DEFAULT 0,
            is_locked INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (length(name) > 0),
            CHECK (category >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tags_post_count ON tags(post_count)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the tag_relationships table
///
/// Aliases and implications share one table; `kind` separates them. Status
/// is free-form text: this core only writes 'retired' and filters on
/// 'active', administrative statuses pass through.
pub async fn create_tag_relationships_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tag_relationships (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL CHECK (kind IN ('alias', 'implication')),
            antecedent_name TEXT NOT NULL,
            consequent_name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (length(antecedent_name) > 0),
            CHECK (length(consequent_name) > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tag_relationships_scan ON tag_relationships(kind, status, created_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tag_relationships_antecedent ON tag_relationships(antecedent_name)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the items table
///
/// The catalog item store, reduced to the columns the tagging core reads:
/// the space-delimited tag string, a status, and the creation time.
pub async fn create_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            guid TEXT PRIMARY KEY,
            tag_string TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'active',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_created_at ON items(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_topics_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS topics (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL UNIQUE,
            creator_guid TEXT NOT NULL REFERENCES users(guid),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_topic_posts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS topic_posts (
            guid TEXT PRIMARY KEY,
            topic_guid TEXT NOT NULL REFERENCES topics(guid) ON DELETE CASCADE,
            creator_guid TEXT NOT NULL REFERENCES users(guid),
            body TEXT NOT NULL,
            is_report INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_topic_posts_topic ON topic_posts(topic_guid)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Ensures all required settings exist with default values and resets NULL
/// values back to their defaults.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // Category cache
    ensure_setting(pool, "category_cache_ttl_seconds", "10800").await?; // 3 hours

    // Relationship retirement
    ensure_setting(pool, "retirement_age_days", "730").await?; // 2 years
    ensure_setting(pool, "retirement_check_timeout_ms", "30000").await?;

    // Category-change policy
    ensure_setting(pool, "large_tag_threshold", "1000").await?;

    // Database
    ensure_setting(pool, "db_busy_timeout_ms", "5000").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if !exists {
        // Use INSERT OR IGNORE to handle concurrent initialization race
        // conditions; multiple processes may pass the exists check at once.
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;

        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;

        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}
