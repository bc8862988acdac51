//! Per-tag usage counters
//!
//! `post_count` is a denormalized cache of how many items carry each tag.
//! Live traffic keeps it current through `increment`/`decrement`;
//! `reconcile` repairs whatever drift accumulates from missed or
//! double-applied deltas.
//!
//! Lock the tags in alphabetical order before touching their counters:
//! two concurrent updates over overlapping name sets acquiring in
//! arbitrary order can form a wait cycle under exclusive locking, and a
//! single canonical order across all callers makes that cycle impossible.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use sqlx::SqlitePool;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::db::models::Tag;
use crate::{items, time, Result};

/// Exclusive per-tag locks, always acquired in lexicographic name order.
#[derive(Default)]
struct TagLockTable {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl TagLockTable {
    fn handle(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        // TODO: prune entries nothing holds once the table grows past the
        // live tag working set.
        locks.entry(name.to_string()).or_default().clone()
    }

    /// Lock every name, smallest first, and hold all guards until drop.
    /// `BTreeSet` iteration order is the canonical lock order.
    async fn lock_ordered(&self, names: &BTreeSet<String>) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(names.len());
        for name in names {
            let lock = self.handle(name);
            guards.push(lock.lock_owned().await);
        }
        guards
    }
}

/// Atomic increment/decrement of per-tag usage counters, plus full
/// reconciliation against the item store's tag strings.
///
/// Clones share one lock table; every writer that mutates `post_count`
/// must go through the same `CounterStore` family, since updates issued
/// elsewhere bypass the ordering discipline.
#[derive(Clone)]
pub struct CounterStore {
    pool: SqlitePool,
    locks: Arc<TagLockTable>,
}

impl CounterStore {
    pub fn new(pool: SqlitePool) -> Self {
        CounterStore {
            pool,
            locks: Arc::new(TagLockTable::default()),
        }
    }

    /// Add 1 to the usage counter of every named tag, as one batch.
    pub async fn increment(&self, names: &BTreeSet<String>) -> Result<()> {
        self.apply_delta(names, 1).await
    }

    /// Subtract 1 from the usage counter of every named tag, as one batch.
    pub async fn decrement(&self, names: &BTreeSet<String>) -> Result<()> {
        self.apply_delta(names, -1).await
    }

    /// Lock the whole name set in order, then apply the delta in one bulk
    /// update. Blocking on a contended name is the normal serialization
    /// path, not an error; storage failures propagate unretried.
    async fn apply_delta(&self, names: &BTreeSet<String>, delta: i64) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }

        let _guards = self.locks.lock_ordered(names).await;

        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "UPDATE tags SET post_count = post_count + ?, updated_at = ? WHERE name IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql).bind(delta).bind(time::now());
        for name in names {
            query = query.bind(name);
        }
        let result = query.execute(&self.pool).await?;

        debug!(
            delta,
            tags = names.len(),
            updated = result.rows_affected(),
            "applied tag count delta"
        );
        Ok(())
    }

    /// Full-scan repair of drifted counters against the current snapshot
    /// of item tag strings. Two independent phases, both idempotent:
    ///
    /// 1. Zero out tags whose stored count is non-zero but which appear in
    ///    no item's tag string.
    /// 2. Set every tag whose stored count differs from the true count to
    ///    the true count.
    ///
    /// Returns the rows touched, phase 1 first, then phase 2; duplicates
    /// across phases are not removed here. Each correction is its own
    /// short statement, so no locks are held across the scan; tags touched
    /// by live traffic mid-scan may stay briefly stale and self-heal on
    /// the next run.
    pub async fn reconcile(&self) -> Result<Vec<Tag>> {
        let true_counts = self.true_counts().await?;

        let mut corrected = self.zero_orphaned_counts(&true_counts).await?;
        corrected.extend(self.correct_mismatched_counts(&true_counts).await?);

        info!(corrected = corrected.len(), "tag count reconciliation complete");
        Ok(corrected)
    }

    /// Group-by over the current snapshot of all item tag strings.
    async fn true_counts(&self) -> Result<BTreeMap<String, i64>> {
        let tag_strings = items::tag_strings(&self.pool).await?;

        let mut counts = BTreeMap::new();
        for tag_string in tag_strings {
            for name in tag_string.split_whitespace() {
                *counts.entry(name.to_string()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// Phase 1: fix tags where the count is non-zero but the tag isn't
    /// present on any item.
    async fn zero_orphaned_counts(&self, true_counts: &BTreeMap<String, i64>) -> Result<Vec<Tag>> {
        let nonzero: Vec<String> = sqlx::query_scalar("SELECT name FROM tags WHERE post_count != 0")
            .fetch_all(&self.pool)
            .await?;

        let mut corrected = Vec::new();
        for name in nonzero {
            if true_counts.contains_key(&name) {
                continue;
            }
            let tag: Tag = sqlx::query_as(
                "UPDATE tags SET post_count = 0, updated_at = ? WHERE name = ? \
                 RETURNING name, category, post_count, is_locked, created_at, updated_at",
            )
            .bind(time::now())
            .bind(&name)
            .fetch_one(&self.pool)
            .await?;

            info!(tag = %tag.name, "zeroed orphaned tag count");
            corrected.push(tag);
        }
        Ok(corrected)
    }

    /// Phase 2: fix tags where the stored count doesn't match the true
    /// count. Names with no tag row are skipped; creating rows is the
    /// resolver's job.
    async fn correct_mismatched_counts(
        &self,
        true_counts: &BTreeMap<String, i64>,
    ) -> Result<Vec<Tag>> {
        let stored: HashMap<String, i64> =
            sqlx::query_as::<_, (String, i64)>("SELECT name, post_count FROM tags")
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .collect();

        let mut corrected = Vec::new();
        for (name, true_count) in true_counts {
            match stored.get(name) {
                Some(stored_count) if stored_count != true_count => {}
                _ => continue,
            }
            let tag: Tag = sqlx::query_as(
                "UPDATE tags SET post_count = ?, updated_at = ? WHERE name = ? \
                 RETURNING name, category, post_count, is_locked, created_at, updated_at",
            )
            .bind(true_count)
            .bind(time::now())
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

            info!(tag = %tag.name, count = true_count, "corrected mismatched tag count");
            corrected.push(tag);
        }
        Ok(corrected)
    }
}
