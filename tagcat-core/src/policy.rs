//! Category-change authorization
//!
//! Actors are passed explicitly; there is no ambient current-user context.

use crate::db::models::{Tag, User};

/// Decides whether an actor may change a tag's category.
pub trait CategoryPolicy: Send + Sync {
    fn can_change_category(&self, actor: &User, tag: &Tag) -> bool;
}

/// Default policy: admins always; everyone else only on unlocked tags
/// whose usage count is still below the large-tag threshold. Recategorizing
/// a heavily-used tag is an admin decision.
pub struct StandardPolicy {
    pub large_tag_threshold: i64,
}

impl StandardPolicy {
    pub fn new(large_tag_threshold: i64) -> Self {
        StandardPolicy { large_tag_threshold }
    }
}

impl CategoryPolicy for StandardPolicy {
    fn can_change_category(&self, actor: &User, tag: &Tag) -> bool {
        actor.is_admin() || (!tag.is_locked && tag.post_count < self.large_tag_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::level;
    use crate::time;

    fn user(level: i64) -> User {
        User {
            guid: "u-1".to_string(),
            name: "someone".to_string(),
            level,
            created_at: time::now(),
        }
    }

    fn tag(post_count: i64, is_locked: bool) -> Tag {
        Tag {
            name: "apple".to_string(),
            category: 0,
            post_count,
            is_locked,
            created_at: time::now(),
            updated_at: time::now(),
        }
    }

    #[test]
    fn test_member_can_change_small_unlocked_tag() {
        let policy = StandardPolicy::new(1000);
        assert!(policy.can_change_category(&user(level::MEMBER), &tag(5, false)));
    }

    #[test]
    fn test_member_cannot_change_large_tag() {
        let policy = StandardPolicy::new(1000);
        assert!(!policy.can_change_category(&user(level::MEMBER), &tag(1000, false)));
    }

    #[test]
    fn test_member_cannot_change_locked_tag() {
        let policy = StandardPolicy::new(1000);
        assert!(!policy.can_change_category(&user(level::BUILDER), &tag(5, true)));
    }

    #[test]
    fn test_admin_can_change_anything() {
        let policy = StandardPolicy::new(1000);
        assert!(policy.can_change_category(&user(level::ADMIN), &tag(1_000_000, true)));
    }
}
