//! Discussion-thread collaborator
//!
//! Batch jobs publish human-readable reports into discussion topics. The
//! trait is the surface the lifecycle core needs; `DbDiscussions` backs it
//! with the topics/topic_posts tables.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::db::models::Topic;
use crate::{time, Result};

#[async_trait]
pub trait Discussions: Send + Sync {
    async fn find_topic_by_title(&self, title: &str) -> Result<Option<Topic>>;

    /// Create a topic with an introductory post authored by `author_guid`.
    async fn create_topic(&self, title: &str, body: &str, author_guid: &str) -> Result<Topic>;

    /// Create or overwrite the running report post of a topic. One report
    /// post per topic per author, updated in place; the introductory post
    /// is never touched.
    async fn post_or_update_report(
        &self,
        topic_guid: &str,
        body: &str,
        author_guid: &str,
    ) -> Result<()>;
}

pub struct DbDiscussions {
    pool: SqlitePool,
}

impl DbDiscussions {
    pub fn new(pool: SqlitePool) -> Self {
        DbDiscussions { pool }
    }
}

#[async_trait]
impl Discussions for DbDiscussions {
    async fn find_topic_by_title(&self, title: &str) -> Result<Option<Topic>> {
        let topic = sqlx::query_as::<_, Topic>(
            "SELECT guid, title, creator_guid, created_at FROM topics WHERE title = ?",
        )
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;
        Ok(topic)
    }

    async fn create_topic(&self, title: &str, body: &str, author_guid: &str) -> Result<Topic> {
        let now = time::now();
        let topic = sqlx::query_as::<_, Topic>(
            "INSERT INTO topics (guid, title, creator_guid, created_at) VALUES (?, ?, ?, ?) \
             RETURNING guid, title, creator_guid, created_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(title)
        .bind(author_guid)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query(
            "INSERT INTO topic_posts (guid, topic_guid, creator_guid, body, is_report, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&topic.guid)
        .bind(author_guid)
        .bind(body)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(title, "discussion topic created");
        Ok(topic)
    }

    async fn post_or_update_report(
        &self,
        topic_guid: &str,
        body: &str,
        author_guid: &str,
    ) -> Result<()> {
        let now = time::now();
        let updated = sqlx::query(
            "UPDATE topic_posts SET body = ?, updated_at = ? \
             WHERE topic_guid = ? AND creator_guid = ? AND is_report = 1",
        )
        .bind(body)
        .bind(now)
        .bind(topic_guid)
        .bind(author_guid)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                "INSERT INTO topic_posts (guid, topic_guid, creator_guid, body, is_report, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, 1, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(topic_guid)
            .bind(author_guid)
            .bind(body)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}
