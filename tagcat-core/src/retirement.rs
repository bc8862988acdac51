//! Automatic retirement of stale, unused tag relationships
//!
//! A relationship older than the age threshold whose consequent tag has
//! seen no item created within the same window is dead weight: resolving
//! through it can only resurrect vocabulary nobody uses. A scheduled scan
//! flips such relationships to `retired` and keeps a running report in a
//! discussion topic.

use std::fmt;
use std::sync::Arc;

use async_stream::try_stream;
use chrono::{DateTime, Utc};
use futures::pin_mut;
use futures::stream::{Stream, StreamExt};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::init::SYSTEM_USER_GUID;
use crate::db::models::RelationshipKind;
use crate::db::settings::RuntimeSettings;
use crate::discussions::Discussions;
use crate::{items, relationships, time, Result};

pub const TOPIC_TITLE: &str = "Retired tag aliases & implications";

pub const TOPIC_BODY: &str = "This topic deals with tag relationships created two or more years \
ago that have not been used since. They will be retired. This topic will be updated as an \
automated system retires expired relationships.";

const SCAN_PAGE_SIZE: i64 = 100;

/// One would-be or applied retirement, rendered as a report line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetirementNotice {
    pub kind: RelationshipKind,
    pub antecedent: String,
    pub consequent: String,
}

impl fmt::Display for RetirementNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} retired",
            self.kind.display_name(),
            self.antecedent,
            self.consequent
        )
    }
}

/// Finds stale, unused relationships, retires them, and publishes the
/// report. Intended to run from an external scheduler; safe to run
/// repeatedly, since retired rows drop out of the `active`-only scan.
pub struct RetirementScanner {
    pool: SqlitePool,
    discussions: Arc<dyn Discussions>,
    age: chrono::Duration,
    check_timeout: std::time::Duration,
}

impl RetirementScanner {
    pub fn new(
        pool: SqlitePool,
        discussions: Arc<dyn Discussions>,
        settings: &RuntimeSettings,
    ) -> Self {
        RetirementScanner {
            pool,
            discussions,
            age: time::days(settings.retirement_age_days),
            check_timeout: settings.retirement_check_timeout,
        }
    }

    /// The candidates that `find_and_retire` would retire, lazily, without
    /// mutating anything. Restartable: each call walks a fresh scan.
    pub fn dry_run(&self) -> impl Stream<Item = Result<RetirementNotice>> + '_ {
        // One cutoff per invocation, shared by the age predicate and the
        // usage predicate, so eligibility cannot drift mid-scan.
        let cutoff = time::now() - self.age;
        try_stream! {
            let candidates = self.candidates(cutoff);
            pin_mut!(candidates);
            while let Some(candidate) = candidates.next().await {
                let (_, notice) = candidate?;
                yield notice;
            }
        }
    }

    /// Retire every stale, unused relationship of both kinds, then publish
    /// the sorted report to the discussion topic (created on first use
    /// with the System identity).
    ///
    /// Retirements commit row by row; a publish failure afterwards leaves
    /// them in place, and the next scheduled run regenerates its report
    /// independently.
    pub async fn find_and_retire(&self) -> Result<()> {
        let cutoff = time::now() - self.age;
        let mut lines = Vec::new();

        {
            let candidates = self.candidates(cutoff);
            pin_mut!(candidates);
            while let Some(candidate) = candidates.next().await {
                let (id, notice) = candidate?;
                if relationships::retire(&self.pool, id).await?.is_some() {
                    info!(line = %notice, "retired relationship");
                    lines.push(notice.to_string());
                }
            }
        }

        // Lexicographic line order makes the published report independent
        // of scan interleaving between the two kinds.
        lines.sort();
        let report = lines.join("\n");
        info!(retired = lines.len(), "relationship retirement scan complete");

        self.publish(&report).await
    }

    /// Stream of `(relationship id, notice)` for every active relationship
    /// of either kind older than `cutoff` whose consequent is confirmed
    /// unused. Pages by id so the walk is bounded in memory and
    /// restartable.
    fn candidates(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Stream<Item = Result<(i64, RetirementNotice)>> + '_ {
        try_stream! {
            for kind in RelationshipKind::ALL {
                let mut after_id = 0i64;
                loop {
                    let page = relationships::active_created_before(
                        &self.pool,
                        kind,
                        cutoff,
                        after_id,
                        SCAN_PAGE_SIZE,
                    )
                    .await?;
                    if page.is_empty() {
                        break;
                    }
                    for relationship in page {
                        after_id = relationship.id;
                        if self.confirmed_unused(&relationship.consequent_name, cutoff).await? {
                            yield (
                                relationship.id,
                                RetirementNotice {
                                    kind,
                                    antecedent: relationship.antecedent_name,
                                    consequent: relationship.consequent_name,
                                },
                            );
                        }
                    }
                }
            }
        }
    }

    /// True only when the usage check completed and found nothing. A check
    /// that times out is not a confirmation: the candidate is skipped, the
    /// scan continues.
    async fn confirmed_unused(&self, consequent: &str, cutoff: DateTime<Utc>) -> Result<bool> {
        let check = items::exists_recent_item_tagged(&self.pool, consequent, cutoff);
        match tokio::time::timeout(self.check_timeout, check).await {
            Ok(exists) => Ok(!exists?),
            Err(_) => {
                warn!(tag = consequent, "usage check timed out; leaving relationship in place");
                Ok(false)
            }
        }
    }

    async fn publish(&self, report: &str) -> Result<()> {
        let topic = match self.discussions.find_topic_by_title(TOPIC_TITLE).await? {
            Some(topic) => topic,
            None => {
                self.discussions
                    .create_topic(TOPIC_TITLE, TOPIC_BODY, SYSTEM_USER_GUID)
                    .await?
            }
        };
        self.discussions
            .post_or_update_report(&topic.guid, report, SYSTEM_USER_GUID)
            .await
    }
}
