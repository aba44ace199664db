//! Integration Tests for the Cache Layer
//!
//! Exercises the full set/get/invalidate/query lifecycle against a real
//! temp-file SQLite store, across both tiers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tempfile::TempDir;

use tiercache::{
    run_full_optimization, CacheConfig, CacheOperation, CacheOptions, CacheService, Codec,
    MaintenanceScheduler, Priority, QueryAnalyzer, QueryExecutor, QueryOptions,
};

// == Helper Functions ==

fn test_config(dir: &TempDir) -> CacheConfig {
    CacheConfig {
        db_path: dir.path().join("cache.db").to_string_lossy().into_owned(),
        backup_dir: dir.path().join("backups").to_string_lossy().into_owned(),
        ..Default::default()
    }
}

async fn create_test_service(dir: &TempDir) -> CacheService {
    CacheService::init(test_config(dir)).await.unwrap()
}

// == Write-Through Tests ==

#[tokio::test]
async fn test_write_through_consistency() {
    let dir = TempDir::new().unwrap();
    let service = create_test_service(&dir).await;

    let value = json!({"id": 7, "caption": "morning routine", "hashtags": ["#fit"]});
    assert!(service.set("post:7", &value, CacheOptions::default()).await);

    // Clearing the memory tier must not lose the value: the durable
    // store alone satisfies the read
    service.clear_memory().await;

    let got: Value = service.get("post:7", "default").await.unwrap();
    assert_eq!(got, value);
}

#[tokio::test]
async fn test_store_survives_service_restart() {
    let dir = TempDir::new().unwrap();
    let value = json!({"v": 1});

    {
        let service = create_test_service(&dir).await;
        service.set("durable", &value, CacheOptions::default()).await;
        service.shutdown().await;
    }

    let service = create_test_service(&dir).await;
    let got: Value = service.get("durable", "default").await.unwrap();
    assert_eq!(got, value);
}

// == TTL Tests ==

#[tokio::test]
async fn test_ttl_expiry_scenario() {
    let dir = TempDir::new().unwrap();
    let service = create_test_service(&dir).await;

    service
        .set("a", &json!({"v": 1}), CacheOptions::default().ttl_seconds(1))
        .await;
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let got: Option<Value> = service.get("a", "default").await;
    assert!(got.is_none());
}

#[tokio::test]
async fn test_ttl_expiry_applies_to_store_tier_too() {
    let dir = TempDir::new().unwrap();
    let service = create_test_service(&dir).await;

    service
        .set("a", &json!({"v": 1}), CacheOptions::default().ttl_seconds(1))
        .await;
    // Remove the fresh memory copy so the read must hit the store
    service.clear_memory().await;
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let got: Option<Value> = service.get("a", "default").await;
    assert!(got.is_none());
}

// == Tag Invalidation Tests ==

#[tokio::test]
async fn test_tag_invalidation_scenario() {
    let dir = TempDir::new().unwrap();
    let service = create_test_service(&dir).await;

    let tagged = CacheOptions::default().tags(["niche"]);
    service.set("b", &json!({"v": 2}), tagged.clone()).await;
    service.set("c", &json!({"v": 3}), tagged).await;

    let removed = service.invalidate_by_tags(&["niche".to_string()]).await;
    assert!(removed >= 2);

    assert!(service.get::<Value>("b", "default").await.is_none());
    assert!(service.get::<Value>("c", "default").await.is_none());
}

#[tokio::test]
async fn test_tag_invalidation_spares_other_entries() {
    let dir = TempDir::new().unwrap();
    let service = create_test_service(&dir).await;

    service
        .set("tagged", &json!(1), CacheOptions::default().tags(["content"]))
        .await;
    service
        .set("similar", &json!(2), CacheOptions::default().tags(["contentX"]))
        .await;
    service.set("plain", &json!(3), CacheOptions::default()).await;

    service.invalidate_by_tags(&["content".to_string()]).await;

    assert!(service.get::<Value>("tagged", "default").await.is_none());
    // Exact membership: "content" must not match the "contentX" tag
    assert!(service.get::<Value>("similar", "default").await.is_some());
    assert!(service.get::<Value>("plain", "default").await.is_some());
}

#[tokio::test]
async fn test_tag_invalidation_reaches_store_tier() {
    let dir = TempDir::new().unwrap();
    let service = create_test_service(&dir).await;

    service
        .set("b", &json!(1), CacheOptions::default().tags(["batch"]))
        .await;
    // Only the store copy remains
    service.clear_memory().await;

    let removed = service.invalidate_by_tags(&["batch".to_string()]).await;
    assert_eq!(removed, 1);
    assert!(service.get::<Value>("b", "default").await.is_none());
}

// == Eviction Tests ==

#[tokio::test]
async fn test_priority_eviction_scenario() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.max_memory_bytes = 350;
    let service = CacheService::init(config).await.unwrap();

    // Fill the tier with low-priority entries
    let filler = json!("x".repeat(100));
    service
        .set("low1", &filler, CacheOptions::default().priority(Priority::Low))
        .await;
    service
        .set("low2", &filler, CacheOptions::default().priority(Priority::Low))
        .await;
    service
        .set("low3", &filler, CacheOptions::default().priority(Priority::Low))
        .await;

    // A high-priority entry larger than the remaining free space
    service
        .set("vip", &filler, CacheOptions::default().priority(Priority::High))
        .await;

    let stats = service.stats().await;
    assert!(stats.evictions >= 1, "a low-priority entry must have been evicted");

    // The high-priority entry is servable, and evicted low-priority
    // entries still come back from the durable tier
    assert!(service.get::<Value>("vip", "default").await.is_some());
    assert!(service.get::<Value>("low1", "default").await.is_some());
}

// == Compression Tests ==

#[tokio::test]
async fn test_gzip_entries_roundtrip_through_both_tiers() {
    let dir = TempDir::new().unwrap();
    let service = create_test_service(&dir).await;

    let value = json!({"body": "lorem ipsum ".repeat(500)});
    service
        .set("doc", &value, CacheOptions::default().compression(Codec::Gzip))
        .await;

    let from_memory: Value = service.get("doc", "default").await.unwrap();
    assert_eq!(from_memory, value);

    service.clear_memory().await;
    let from_store: Value = service.get("doc", "default").await.unwrap();
    assert_eq!(from_store, value);
}

// == Query Cache Tests ==

#[tokio::test]
async fn test_cached_query_touches_store_once() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(create_test_service(&dir).await);
    let executor = QueryExecutor::new(service.clone());

    service.set("seed", &json!(1), CacheOptions::default()).await;

    let sql = "SELECT key, size_bytes FROM cache_entries";
    let opts = QueryOptions::default().cache_key("report");

    let first_start = Instant::now();
    let first = executor.cached_query(sql, &[], opts.clone()).await.unwrap();
    let first_elapsed = first_start.elapsed();
    assert!(!first.is_empty());

    // Drop every row; a second invocation must come from the cache
    for row in &first {
        let key = row["key"].as_str().unwrap();
        service.store().delete(key).await.unwrap();
    }

    let second_start = Instant::now();
    let second = executor.cached_query(sql, &[], opts).await.unwrap();
    let second_elapsed = second_start.elapsed();

    assert_eq!(second, first);
    // Not a strict latency assertion; cached reads skip store I/O
    // entirely, so allow generous slack for scheduler noise
    assert!(second_elapsed <= first_elapsed + Duration::from_millis(50));
}

// == Analytics Tests ==

#[tokio::test]
async fn test_analytics_rows_cover_each_operation() {
    let dir = TempDir::new().unwrap();
    let service = create_test_service(&dir).await;

    service
        .set("a", &json!(1), CacheOptions::default().ttl_seconds(120).tags(["t"]))
        .await;
    let _: Option<Value> = service.get("a", "default").await;
    let _: Option<Value> = service.get("missing", "default").await;
    service.delete("a", "default").await;

    let records = service.analytics().drain();
    let ops: Vec<CacheOperation> = records.iter().map(|r| r.operation).collect();

    assert_eq!(
        ops,
        vec![
            CacheOperation::Set,
            CacheOperation::Hit,
            CacheOperation::Miss,
            CacheOperation::Delete,
        ]
    );
    assert!(records.iter().all(|r| r.latency_ms >= 0.0));
    assert_eq!(records[0].ttl_seconds, Some(120));
}

// == Maintenance Tests ==

#[tokio::test]
async fn test_full_optimization_sequence() {
    let dir = TempDir::new().unwrap();
    let service = create_test_service(&dir).await;

    service.set("a", &json!(1), CacheOptions::default()).await;
    service
        .set("expired", &json!(2), CacheOptions::default().ttl_seconds(1))
        .await;
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let report = run_full_optimization(&service.store(), service.config()).await;

    assert!(!report.aborted);
    assert!(report.steps.iter().all(|s| s.ok));
    assert!(report.backup_path.unwrap().exists());
    // Cleanup dropped the expired row
    assert_eq!(service.store().entry_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_scheduler_lifecycle() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(create_test_service(&dir).await);
    let analyzer = Arc::new(QueryAnalyzer::new(service.store()));

    let mut scheduler = MaintenanceScheduler::start(service.clone(), analyzer);
    tokio::time::sleep(Duration::from_millis(100)).await;
    scheduler.shutdown();

    // The service remains usable after scheduler shutdown
    service.set("after", &json!(1), CacheOptions::default()).await;
    assert!(service.get::<Value>("after", "default").await.is_some());
}
