//! Catalog items and the tag-delta write path
//!
//! Items own a space-delimited string of normalized tag names. The
//! queries here are the item-store surface the lifecycle core needs;
//! `ItemTagWriter` is the glue that turns a tag-string edit into counter
//! deltas.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::counts::CounterStore;
use crate::db::models::{Item, User};
use crate::relationships;
use crate::resolver::CategoryResolver;
use crate::Result;

/// Snapshot of every item's tag string, for reconciliation.
pub async fn tag_strings(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows: Vec<String> = sqlx::query_scalar("SELECT tag_string FROM items")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// True when any item tagged `name` was created after `since`, at any
/// status: hidden and deleted items count as usage here. Tag strings are
/// space-delimited, so membership pads both ends before searching.
pub async fn exists_recent_item_tagged(
    pool: &SqlitePool,
    name: &str,
    since: DateTime<Utc>,
) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(\
            SELECT 1 FROM items \
            WHERE created_at > ? \
            AND instr(' ' || tag_string || ' ', ' ' || ? || ' ') > 0)",
    )
    .bind(since)
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Fetch one item.
pub async fn find_item(pool: &SqlitePool, guid: &str) -> Result<Option<Item>> {
    let item = sqlx::query_as::<_, Item>(
        "SELECT guid, tag_string, status, created_at FROM items WHERE guid = ?",
    )
    .bind(guid)
    .fetch_optional(pool)
    .await?;
    Ok(item)
}

/// Applies item tag-string edits: normalizes and creates the tags,
/// resolves aliases, then drives `CounterStore` with the set difference
/// between the old and new tag strings.
pub struct ItemTagWriter {
    pool: SqlitePool,
    resolver: Arc<CategoryResolver>,
    counters: CounterStore,
}

impl ItemTagWriter {
    pub fn new(pool: SqlitePool, resolver: Arc<CategoryResolver>, counters: CounterStore) -> Self {
        ItemTagWriter {
            pool,
            resolver,
            counters,
        }
    }

    /// Create an item or replace its tag string, keeping tag usage
    /// counters in step. The raw string may carry `category:name`
    /// prefixes; the stored string holds final normalized names only,
    /// deduplicated and sorted.
    pub async fn upsert_item(
        &self,
        guid: &str,
        raw_tag_string: &str,
        item_status: &str,
        created_at: DateTime<Utc>,
        editor: &User,
    ) -> Result<Item> {
        let raws: Vec<String> = raw_tag_string.split_whitespace().map(str::to_string).collect();

        // Create rows for the incoming names (decoding prefixes), follow
        // cosplay tags onto their aliased base, resolve aliases, then
        // create any alias targets that don't have rows yet.
        let names = self.resolver.create_for_list(&raws, editor).await?;
        let names = relationships::convert_cosplay_tags(&self.pool, names).await?;
        let names = relationships::resolve_aliases(&self.pool, &names).await?;
        let names = self.resolver.create_for_list(&names, editor).await?;

        let new_set: BTreeSet<String> = names.into_iter().collect();
        let old_set: BTreeSet<String> = match find_item(&self.pool, guid).await? {
            Some(item) => item.tag_names().map(str::to_string).collect(),
            None => BTreeSet::new(),
        };

        let added: BTreeSet<String> = new_set.difference(&old_set).cloned().collect();
        let removed: BTreeSet<String> = old_set.difference(&new_set).cloned().collect();

        let tag_string = new_set.iter().cloned().collect::<Vec<_>>().join(" ");
        let item = sqlx::query_as::<_, Item>(
            "INSERT INTO items (guid, tag_string, status, created_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(guid) DO UPDATE SET tag_string = excluded.tag_string, status = excluded.status \
             RETURNING guid, tag_string, status, created_at",
        )
        .bind(guid)
        .bind(&tag_string)
        .bind(item_status)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        // Row first, then deltas; a failure in between leaves drift that
        // the next reconcile pass repairs.
        self.counters.increment(&added).await?;
        self.counters.decrement(&removed).await?;

        debug!(
            item = guid,
            added = added.len(),
            removed = removed.len(),
            "item tag string updated"
        );
        Ok(item)
    }
}
