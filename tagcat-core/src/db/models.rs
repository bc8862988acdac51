//! Database models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::TagCategory;

/// User privilege levels. The numbering leaves room between steps for
/// future intermediate levels.
pub mod level {
    pub const MEMBER: i64 = 20;
    pub const BUILDER: i64 = 32;
    pub const ADMIN: i64 = 50;
}

/// Relationship statuses this core reads or writes. Administrative
/// statuses (pending, queued, deleted, ...) are opaque strings that pass
/// through untouched.
pub mod status {
    pub const ACTIVE: &str = "active";
    pub const RETIRED: &str = "retired";
}

/// A normalized, categorized label. `name` is the identity key;
/// `post_count` is a denormalized usage counter maintained by
/// `CounterStore` and repaired by reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub name: String,
    pub category: i64,
    pub post_count: i64,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tag {
    /// Typed view of the stored category id; unknown ids read as General.
    pub fn category(&self) -> TagCategory {
        TagCategory::from_id(self.category).unwrap_or(TagCategory::General)
    }
}

/// The two relationship kinds subject to automatic retirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum RelationshipKind {
    Alias,
    Implication,
}

impl RelationshipKind {
    pub const ALL: [RelationshipKind; 2] = [RelationshipKind::Alias, RelationshipKind::Implication];

    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipKind::Alias => "alias",
            RelationshipKind::Implication => "implication",
        }
    }

    /// Capitalized form used in report lines.
    pub fn display_name(self) -> &'static str {
        match self {
            RelationshipKind::Alias => "Alias",
            RelationshipKind::Implication => "Implication",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A directed edge between two tag names. Only `active` rows participate
/// in resolution and retirement scanning; rows are never deleted here.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TagRelationship {
    pub id: i64,
    pub kind: RelationshipKind,
    pub antecedent_name: String,
    pub consequent_name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// A catalog item, reduced to what the tagging core needs: its
/// space-delimited tag string, status, and creation time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Item {
    pub guid: String,
    pub tag_string: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Item {
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tag_string.split_whitespace()
    }
}

/// An actor, for authorization checks and audit attribution.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub guid: String,
    pub name: String,
    pub level: i64,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.level >= level::ADMIN
    }
}

/// A discussion topic; the retirement report lives in one of its posts.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Topic {
    pub guid: String,
    pub title: String,
    pub creator_guid: String,
    pub created_at: DateTime<Utc>,
}

/// A post within a discussion topic. `is_report` marks the single
/// updated-in-place report post so updates never clobber the intro post.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TopicPost {
    pub guid: String,
    pub topic_guid: String,
    pub creator_guid: String,
    pub body: String,
    pub is_report: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
