//! Tests for category resolution, caching, and find_or_create

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tagcat_core::cache::{category_cache_key, Cache, MemoryCache};
use tagcat_core::category::TagCategory;
use tagcat_core::db::init::init_database;
use tagcat_core::db::models::{level, User};
use tagcat_core::policy::StandardPolicy;
use tagcat_core::resolver::CategoryResolver;
use tagcat_core::time;

fn test_db_path(suffix: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/tagcat-test-resolver-{}-{}.db", suffix, std::process::id()))
}

fn user(name: &str, user_level: i64) -> User {
    User {
        guid: format!("u-{}", name),
        name: name.to_string(),
        level: user_level,
        created_at: time::now(),
    }
}

fn resolver(pool: SqlitePool, cache: Arc<MemoryCache>) -> CategoryResolver {
    CategoryResolver::new(
        pool,
        cache,
        Arc::new(StandardPolicy::new(1000)),
        Duration::from_secs(3600),
    )
}

#[tokio::test]
async fn test_resolve_blank_name_is_general_without_storage() {
    let db_path = test_db_path("blank");
    let _ = std::fs::remove_file(&db_path);
    let pool = init_database(&db_path).await.unwrap();

    let cache = Arc::new(MemoryCache::new());
    let resolver = resolver(pool.clone(), cache.clone());

    assert_eq!(resolver.resolve("", false).await.unwrap(), TagCategory::General);
    assert_eq!(resolver.resolve("   ", false).await.unwrap(), TagCategory::General);
    // Nothing was cached for the blank lookups
    assert_eq!(cache.get(&category_cache_key("")).await, None);

    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_resolve_reads_through_and_populates_cache() {
    let db_path = test_db_path("read-through");
    let _ = std::fs::remove_file(&db_path);
    let pool = init_database(&db_path).await.unwrap();

    let cache = Arc::new(MemoryCache::new());
    let resolver = resolver(pool.clone(), cache.clone());

    resolver.find_or_create("artist:painter", &user("admin", level::ADMIN)).await.unwrap();

    assert_eq!(resolver.resolve("painter", false).await.unwrap(), TagCategory::Artist);
    assert_eq!(
        cache.get(&category_cache_key("painter")).await,
        Some(TagCategory::Artist.id()),
        "read-through miss must populate the cache"
    );

    // Once cached, the cache answers: delete the row and resolve again
    sqlx::query("DELETE FROM tags WHERE name = 'painter'")
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(resolver.resolve("painter", false).await.unwrap(), TagCategory::Artist);

    // Bypass skips the cache and sees the authoritative (missing) row
    assert_eq!(resolver.resolve("painter", true).await.unwrap(), TagCategory::General);

    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_resolve_unknown_tag_is_general() {
    let db_path = test_db_path("unknown");
    let _ = std::fs::remove_file(&db_path);
    let pool = init_database(&db_path).await.unwrap();

    let cache = Arc::new(MemoryCache::new());
    let resolver = resolver(pool.clone(), cache);
    assert_eq!(resolver.resolve("no_such_tag", false).await.unwrap(), TagCategory::General);

    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_resolve_many_mixes_hits_misses_and_blanks() {
    let db_path = test_db_path("many");
    let _ = std::fs::remove_file(&db_path);
    let pool = init_database(&db_path).await.unwrap();

    let cache = Arc::new(MemoryCache::new());
    let resolver = resolver(pool.clone(), cache.clone());
    let admin = user("admin", level::ADMIN);

    resolver.find_or_create("character:alice", &admin).await.unwrap();
    resolver.find_or_create("plain", &admin).await.unwrap();

    // Warm one entry so the batch spans cache hits and misses
    resolver.resolve("alice", false).await.unwrap();

    let names = vec![
        "alice".to_string(),
        "plain".to_string(),
        "".to_string(),
        "missing".to_string(),
    ];
    let resolved = resolver.resolve_many(&names).await.unwrap();

    assert_eq!(resolved.get("alice"), Some(&TagCategory::Character));
    assert_eq!(resolved.get("plain"), Some(&TagCategory::General));
    assert_eq!(resolved.get(""), Some(&TagCategory::General));
    assert_eq!(resolved.get("missing"), Some(&TagCategory::General));

    // Misses were written back
    assert_eq!(
        cache.get(&category_cache_key("plain")).await,
        Some(TagCategory::General.id())
    );

    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_find_or_create_with_prefix_creates_categorized_tag() {
    let db_path = test_db_path("prefix-create");
    let _ = std::fs::remove_file(&db_path);
    let pool = init_database(&db_path).await.unwrap();

    let cache = Arc::new(MemoryCache::new());
    let resolver = resolver(pool.clone(), cache);

    let tag = resolver
        .find_or_create("character:Some Hero", &user("member", level::MEMBER))
        .await
        .unwrap();
    assert_eq!(tag.name, "some_hero");
    assert_eq!(tag.category(), TagCategory::Character);
    assert_eq!(tag.post_count, 0);

    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_find_or_create_without_prefix_never_changes_category() {
    let db_path = test_db_path("no-prefix");
    let _ = std::fs::remove_file(&db_path);
    let pool = init_database(&db_path).await.unwrap();

    let cache = Arc::new(MemoryCache::new());
    let resolver = resolver(pool.clone(), cache);
    let admin = user("admin", level::ADMIN);

    resolver.find_or_create("artist:painter", &admin).await.unwrap();
    let again = resolver.find_or_create("painter", &admin).await.unwrap();
    assert_eq!(again.category(), TagCategory::Artist, "bare name must not reset the category");

    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_find_or_create_refreshes_stale_cache_before_deciding() {
    let db_path = test_db_path("stale-cache");
    let _ = std::fs::remove_file(&db_path);
    let pool = init_database(&db_path).await.unwrap();

    let cache = Arc::new(MemoryCache::new());
    let resolver = resolver(pool.clone(), cache.clone());
    let admin = user("admin", level::ADMIN);

    // Storage says Artist; cache still carries a stale General entry, as
    // if the category change was committed by another process.
    resolver.find_or_create("artist:bar", &admin).await.unwrap();
    cache
        .put(&category_cache_key("bar"), TagCategory::General.id(), Duration::from_secs(3600))
        .await;

    let tag = resolver.find_or_create("artist:bar", &admin).await.unwrap();

    assert_eq!(tag.category(), TagCategory::Artist, "stored category must stay Artist");
    assert_eq!(
        cache.get(&category_cache_key("bar")).await,
        Some(TagCategory::Artist.id()),
        "cache must be force-refreshed from storage"
    );

    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_find_or_create_policy_gates_category_change() {
    let db_path = test_db_path("policy");
    let _ = std::fs::remove_file(&db_path);
    let pool = init_database(&db_path).await.unwrap();

    let cache = Arc::new(MemoryCache::new());
    let resolver = resolver(pool.clone(), cache);
    let admin = user("admin", level::ADMIN);
    let member = user("member", level::MEMBER);

    resolver.find_or_create("bigtag", &member).await.unwrap();
    sqlx::query("UPDATE tags SET post_count = 5000 WHERE name = 'bigtag'")
        .execute(&pool)
        .await
        .unwrap();

    // A member cannot recategorize a heavily-used tag
    let denied = resolver.find_or_create("meta:bigtag", &member).await.unwrap();
    assert_eq!(denied.category(), TagCategory::General);

    // An admin can
    let changed = resolver.find_or_create("meta:bigtag", &admin).await.unwrap();
    assert_eq!(changed.category(), TagCategory::Meta);

    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_find_or_create_rejects_blank_names() {
    let db_path = test_db_path("blank-create");
    let _ = std::fs::remove_file(&db_path);
    let pool = init_database(&db_path).await.unwrap();

    let cache = Arc::new(MemoryCache::new());
    let resolver = resolver(pool.clone(), cache);

    let result = resolver.find_or_create("   ", &user("member", level::MEMBER)).await;
    assert!(result.is_err(), "blank names must be rejected before storage");

    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_create_for_list_returns_final_names() {
    let db_path = test_db_path("create-list");
    let _ = std::fs::remove_file(&db_path);
    let pool = init_database(&db_path).await.unwrap();

    let cache = Arc::new(MemoryCache::new());
    let resolver = resolver(pool.clone(), cache);

    let raws = vec![
        "character:Alice".to_string(),
        "RED sky".to_string(),
        "  ".to_string(),
    ];
    let names = resolver
        .create_for_list(&raws, &user("member", level::MEMBER))
        .await
        .unwrap();
    assert_eq!(names, vec!["alice".to_string(), "red_sky".to_string()]);

    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}
