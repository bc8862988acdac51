//! Tag relationship queries
//!
//! Aliases ("antecedent should resolve to consequent") and implications
//! ("tagged antecedent implies tagged consequent") share one table. Only
//! `active` rows participate in resolution and retirement scanning.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::SqlitePool;

use crate::db::models::{status, RelationshipKind, TagRelationship};
use crate::Result;

static COSPLAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+)_\(cosplay\)$").unwrap());

const RELATIONSHIP_COLUMNS: &str = "id, kind, antecedent_name, consequent_name, status, created_at";

/// Insert a relationship row. Administrative flows own richer lifecycle
/// transitions; the core only needs creation (and retirement below).
pub async fn create_relationship(
    pool: &SqlitePool,
    kind: RelationshipKind,
    antecedent_name: &str,
    consequent_name: &str,
    rel_status: &str,
    created_at: DateTime<Utc>,
) -> Result<TagRelationship> {
    let sql = format!(
        "INSERT INTO tag_relationships (kind, antecedent_name, consequent_name, status, created_at) \
         VALUES (?, ?, ?, ?, ?) RETURNING {}",
        RELATIONSHIP_COLUMNS
    );
    let relationship = sqlx::query_as::<_, TagRelationship>(&sql)
        .bind(kind)
        .bind(antecedent_name)
        .bind(consequent_name)
        .bind(rel_status)
        .bind(created_at)
        .fetch_one(pool)
        .await?;

    Ok(relationship)
}

/// One page of active relationships of `kind` created before `cutoff`,
/// ordered by id. Paging by `id > after_id` keeps the scan restartable
/// and bounded in memory.
pub async fn active_created_before(
    pool: &SqlitePool,
    kind: RelationshipKind,
    cutoff: DateTime<Utc>,
    after_id: i64,
    limit: i64,
) -> Result<Vec<TagRelationship>> {
    let sql = format!(
        "SELECT {} FROM tag_relationships \
         WHERE kind = ? AND status = ? AND created_at < ? AND id > ? \
         ORDER BY id LIMIT ?",
        RELATIONSHIP_COLUMNS
    );
    let page = sqlx::query_as::<_, TagRelationship>(&sql)
        .bind(kind)
        .bind(status::ACTIVE)
        .bind(cutoff)
        .bind(after_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(page)
}

/// Flip one relationship from active to retired. Single-row atomic
/// update; returns None when the row was already past active (another
/// scan, or an administrative transition, got there first).
pub async fn retire(pool: &SqlitePool, id: i64) -> Result<Option<TagRelationship>> {
    let sql = format!(
        "UPDATE tag_relationships SET status = ? WHERE id = ? AND status = ? RETURNING {}",
        RELATIONSHIP_COLUMNS
    );
    let retired = sqlx::query_as::<_, TagRelationship>(&sql)
        .bind(status::RETIRED)
        .bind(id)
        .bind(status::ACTIVE)
        .fetch_optional(pool)
        .await?;

    Ok(retired)
}

/// Map each name through its active alias consequent when one exists,
/// preserving input order. Names without an active alias pass through.
pub async fn resolve_aliases(pool: &SqlitePool, names: &[String]) -> Result<Vec<String>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; names.len()].join(", ");
    let sql = format!(
        "SELECT antecedent_name, consequent_name FROM tag_relationships \
         WHERE kind = ? AND status = ? AND antecedent_name IN ({})",
        placeholders
    );
    let mut query = sqlx::query_as::<_, (String, String)>(&sql)
        .bind(RelationshipKind::Alias)
        .bind(status::ACTIVE);
    for name in names {
        query = query.bind(name);
    }
    let aliased: HashMap<String, String> = query.fetch_all(pool).await?.into_iter().collect();

    Ok(names
        .iter()
        .map(|name| aliased.get(name).cloned().unwrap_or_else(|| name.clone()))
        .collect())
}

/// Rewrite `base_(cosplay)` tags so the base rides its active alias:
/// cosplay tags must follow the character tag they decorate.
pub async fn convert_cosplay_tags(pool: &SqlitePool, names: Vec<String>) -> Result<Vec<String>> {
    let mut bases = Vec::new();
    for name in &names {
        if let Some(caps) = COSPLAY_RE.captures(name) {
            bases.push(caps[1].to_string());
        }
    }
    if bases.is_empty() {
        return Ok(names);
    }

    let aliased = resolve_aliases(pool, &bases).await?;
    let rewritten: HashMap<String, String> = bases
        .into_iter()
        .zip(aliased)
        .map(|(base, target)| (format!("{}_(cosplay)", base), format!("{}_(cosplay)", target)))
        .collect();

    Ok(names
        .into_iter()
        .map(|name| rewritten.get(&name).cloned().unwrap_or(name))
        .collect())
}
