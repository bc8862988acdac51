//! Category resolution with a cache-aside layer
//!
//! The `tags.category` column is the source of truth; the cache is a
//! read-through shortcut with TTL expiry and explicit invalidation on
//! category change. Best-effort freshness, not a consistency guarantee.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::info;

use crate::cache::{category_cache_key, Cache};
use crate::category::{self, TagCategory};
use crate::db::models::{Tag, User};
use crate::name;
use crate::policy::CategoryPolicy;
use crate::{time, Error, Result};

const TAG_COLUMNS: &str = "name, category, post_count, is_locked, created_at, updated_at";

/// Maps tag names to categories, creating tags on first reference.
pub struct CategoryResolver {
    pool: SqlitePool,
    cache: Arc<dyn Cache>,
    policy: Arc<dyn CategoryPolicy>,
    cache_ttl: Duration,
}

impl CategoryResolver {
    pub fn new(
        pool: SqlitePool,
        cache: Arc<dyn Cache>,
        policy: Arc<dyn CategoryPolicy>,
        cache_ttl: Duration,
    ) -> Self {
        CategoryResolver {
            pool,
            cache,
            policy,
            cache_ttl,
        }
    }

    /// Category of `name`. Blank names are General without touching
    /// storage or cache. With `bypass_cache` the authoritative store is
    /// read directly and the cache is left alone.
    pub async fn resolve(&self, tag_name: &str, bypass_cache: bool) -> Result<TagCategory> {
        if tag_name.trim().is_empty() {
            return Ok(TagCategory::General);
        }
        if bypass_cache {
            return self.stored_category(tag_name).await;
        }

        let key = category_cache_key(tag_name);
        if let Some(id) = self.cache.get(&key).await {
            return Ok(TagCategory::from_id(id).unwrap_or(TagCategory::General));
        }

        let category = self.stored_category(tag_name).await?;
        self.cache.put(&key, category.id(), self.cache_ttl).await;
        Ok(category)
    }

    /// Read the authoritative category for `tag_name` straight from the
    /// `tags` table, defaulting to General when no such row exists.
    async fn stored_category(&self, tag_name: &str) -> Result<TagCategory> {
        let row = sqlx::query_as::<_, (i64,)>("SELECT category FROM tags WHERE name = ?")
            .bind(tag_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .and_then(|(id,)| TagCategory::from_id(id))
            .unwrap_or(TagCategory::General))
    }

    /// Batch form of `resolve`: one cache multi-get, then one batched
    /// authoritative query covering every miss.
    pub async fn resolve_many(&self, tag_names: &[String]) -> Result<HashMap<String, TagCategory>> {
        let mut resolved = HashMap::with_capacity(tag_names.len());
        let mut lookups: Vec<(String, String)> = Vec::new();
        for tag_name in tag_names {
            if tag_name.trim().is_empty() {
                resolved.insert(tag_name.clone(), TagCategory::General);
            } else {
                lookups.push((tag_name.clone(), category_cache_key(tag_name)));
            }
        }
        if lookups.is_empty() {
            return Ok(resolved);
        }

        let keys: Vec<String> = lookups.iter().map(|(_, key)| key.clone()).collect();
        let hits = self.cache.get_multi(&keys).await;

        let mut misses: Vec<(String, String)> = Vec::new();
        for (tag_name, key) in lookups {
            match hits.get(&key) {
                Some(id) => {
                    resolved.insert(
                        tag_name,
                        TagCategory::from_id(*id).unwrap_or(TagCategory::General),
                    );
                }
                None => misses.push((tag_name, key)),
            }
        }
        if misses.is_empty() {
            return Ok(resolved);
        }

        let placeholders = vec!["?"; misses.len()].join(", ");
        let sql = format!(
            "SELECT name, category FROM tags WHERE name IN ({})",
            placeholders
        );
        let mut query = sqlx::query_as::<_, (String, i64)>(&sql);
        for (tag_name, _) in &misses {
            query = query.bind(tag_name);
        }
        let stored: HashMap<String, i64> = query.fetch_all(&self.pool).await?.into_iter().collect();

        for (tag_name, key) in misses {
            let category = stored
                .get(&tag_name)
                .copied()
                .and_then(TagCategory::from_id)
                .unwrap_or(TagCategory::General);
            self.cache.put(&key, category.id(), self.cache_ttl).await;
            resolved.insert(tag_name, category);
        }
        Ok(resolved)
    }

    /// Write a known category into the cache with the standard TTL. Call
    /// whenever a tag's stored category changes, so readers that have not
    /// yet observed the committed row see a value no older than the write.
    pub async fn invalidate(&self, tag_name: &str, category: TagCategory) {
        self.cache
            .put(&category_cache_key(tag_name), category.id(), self.cache_ttl)
            .await;
    }

    /// Fetch one tag row.
    pub async fn find_tag(&self, tag_name: &str) -> Result<Option<Tag>> {
        let sql = format!("SELECT {} FROM tags WHERE name = ?", TAG_COLUMNS);
        let tag = sqlx::query_as::<_, Tag>(&sql)
            .bind(tag_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tag)
    }

    /// Normalize `raw`, decode an optional `category:name` prefix, and
    /// return the tag, creating it when unknown.
    ///
    /// An existing tag's category changes only when a prefix was given,
    /// the policy allows `creator` to change it, and the decoded category
    /// differs from storage. Before that decision the cache entry is
    /// force-refreshed from storage, covering a category change committed
    /// elsewhere that this process's cache has not seen yet.
    ///
    /// Not transactional against a concurrent create of the same name:
    /// the uniqueness constraint is the backstop, and callers should treat
    /// a unique violation (`Error::is_unique_violation`) as retry by
    /// re-reading.
    pub async fn find_or_create(&self, raw: &str, creator: &User) -> Result<Tag> {
        let normalized = name::normalize(raw);
        let (prefix, tag_name) = match category::split_category_prefix(&normalized) {
            Some((category, rest)) => (Some(category), rest.to_string()),
            None => (None, normalized),
        };
        if tag_name.is_empty() {
            return Err(Error::InvalidInput("blank tag name".to_string()));
        }

        if let Some(tag) = self.find_tag(&tag_name).await? {
            if let Some(category) = prefix {
                // A category change on another server may not have reached
                // this cache yet; refresh from storage before deciding.
                self.invalidate(&tag_name, tag.category()).await;

                if category != tag.category() && self.policy.can_change_category(creator, &tag) {
                    return self.change_category(&tag, category).await;
                }
            }
            return Ok(tag);
        }

        self.create_tag(&tag_name, prefix.unwrap_or(TagCategory::General))
            .await
    }

    /// `find_or_create` over a list of raw names, returning the final
    /// normalized names. Blank entries are skipped.
    pub async fn create_for_list(&self, raws: &[String], creator: &User) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(raws.len());
        for raw in raws {
            if name::normalize(raw).is_empty() {
                continue;
            }
            let tag = self.find_or_create(raw, creator).await?;
            names.push(tag.name);
        }
        Ok(names)
    }

    /// Persist a category change and refresh the cache entry.
    pub async fn change_category(&self, tag: &Tag, category: TagCategory) -> Result<Tag> {
        let sql = format!(
            "UPDATE tags SET category = ?, updated_at = ? WHERE name = ? RETURNING {}",
            TAG_COLUMNS
        );
        let updated = sqlx::query_as::<_, Tag>(&sql)
            .bind(category.id())
            .bind(time::now())
            .bind(&tag.name)
            .fetch_one(&self.pool)
            .await?;

        self.invalidate(&updated.name, updated.category()).await;
        info!(tag = %updated.name, category = category.name(), "tag category changed");
        Ok(updated)
    }

    async fn create_tag(&self, tag_name: &str, category: TagCategory) -> Result<Tag> {
        let now = time::now();
        let sql = format!(
            "INSERT INTO tags (name, category, post_count, is_locked, created_at, updated_at) \
             VALUES (?, ?, 0, 0, ?, ?) RETURNING {}",
            TAG_COLUMNS
        );
        let tag = sqlx::query_as::<_, Tag>(&sql)
            .bind(tag_name)
            .bind(category.id())
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        info!(tag = %tag.name, category = category.name(), "tag created");
        Ok(tag)
    }
}
