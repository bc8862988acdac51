//! Runtime settings loaded from the settings table

use std::time::Duration;

use sqlx::SqlitePool;

use crate::Result;

/// Operational tunables read once at component construction. Values come
/// from the settings table with compiled-in fallbacks matching the seeded
/// defaults.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// TTL for category cache entries.
    pub category_cache_ttl: Duration,
    /// Relationships older than this, whose consequent saw no item created
    /// within the same window, are retired.
    pub retirement_age_days: i64,
    /// Upper bound on one retirement usage check; a timeout skips the
    /// candidate rather than failing the scan.
    pub retirement_check_timeout: Duration,
    /// Tags at or above this usage count only change category for admins.
    pub large_tag_threshold: i64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        RuntimeSettings {
            category_cache_ttl: Duration::from_secs(10800),
            retirement_age_days: 730,
            retirement_check_timeout: Duration::from_millis(30000),
            large_tag_threshold: 1000,
        }
    }
}

/// Load runtime settings from the settings table.
pub async fn load_runtime_settings(pool: &SqlitePool) -> Result<RuntimeSettings> {
    let defaults = RuntimeSettings::default();

    let cache_ttl_secs =
        setting_i64(pool, "category_cache_ttl_seconds", defaults.category_cache_ttl.as_secs() as i64).await?;
    let age_days = setting_i64(pool, "retirement_age_days", defaults.retirement_age_days).await?;
    let check_timeout_ms = setting_i64(
        pool,
        "retirement_check_timeout_ms",
        defaults.retirement_check_timeout.as_millis() as i64,
    )
    .await?;
    let large_tag_threshold =
        setting_i64(pool, "large_tag_threshold", defaults.large_tag_threshold).await?;

    Ok(RuntimeSettings {
        category_cache_ttl: Duration::from_secs(cache_ttl_secs.max(0) as u64),
        retirement_age_days: age_days.max(0),
        retirement_check_timeout: Duration::from_millis(check_timeout_ms.max(0) as u64),
        large_tag_threshold,
    })
}

async fn setting_i64(pool: &SqlitePool, key: &str, default: i64) -> Result<i64> {
    let value: Option<i64> =
        sqlx::query_scalar::<_, Option<i64>>("SELECT CAST(value AS INTEGER) FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?
            .flatten();

    Ok(value.unwrap_or(default))
}
