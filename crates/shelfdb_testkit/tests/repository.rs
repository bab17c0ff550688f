//! Integration tests for the repository over real and in-memory backends.

use chrono::{TimeDelta, TimeZone, Utc};
use proptest::prelude::*;
use shelfdb_codec::DocumentFormat;
use shelfdb_core::{
    BatchConfig, CacheConfig, CoreError, QueryOptions, Repository, UpsertOutcome,
};
use shelfdb_storage::{DocumentBackend, InMemoryBackend};
use shelfdb_testkit::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn leaderboard_workflow() {
    init_tracing();
    let test = TestRepository::memory().await;
    let scores = test.scores();

    for (id, value) in [("u1", 30), ("u2", 10), ("u3", 50), ("u4", 20)] {
        test.store(&scores, &Score::new("g1", id, value)).await.unwrap();
    }

    let page = test
        .query(
            &scores,
            "g1",
            QueryOptions::new()
                .filter(|s: &Score| s.value >= 20)
                .sort_by(|a, b| b.value.cmp(&a.value))
                .limit(2),
        )
        .unwrap();

    let ids: Vec<&str> = page.entities.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["u3", "u1"]);
    assert_eq!(page.total_count, 3);
    assert!(page.has_more);
    assert!(page.execution_time_ms() >= 0.0);
}

#[tokio::test]
async fn storage_ids_share_a_collection_key() {
    let test = TestRepository::memory().await;
    let scores = test
        .repo
        .register::<Score, _>("scores", |_| GLOBAL_KEY.to_string())
        .unwrap();
    let profiles = test.profiles();

    test.store(&scores, &Score::new("g1", "u1", 1)).await.unwrap();
    test.store(&profiles, &Profile::new("ada")).await.unwrap();

    assert_eq!(test.count(&scores, GLOBAL_KEY).unwrap(), 1);
    assert_eq!(test.count(&profiles, GLOBAL_KEY).unwrap(), 1);

    let storage_ids = test
        .document_store()
        .storage_ids(&GLOBAL_KEY.into());
    assert_eq!(storage_ids.len(), 2);
}

#[tokio::test]
async fn duplicate_storage_id_is_rejected() {
    let test = TestRepository::memory().await;
    test.scores();

    let err = test
        .repo
        .register::<Profile, _>("scores", |_| GLOBAL_KEY.to_string())
        .unwrap_err();
    assert!(matches!(err, CoreError::DuplicateStorageId { .. }));
}

#[tokio::test]
async fn burst_writes_cost_ceil_n_over_batch_size() {
    let test = TestRepository::memory().await;
    assert_eq!(burst_store(&test, "g1", 100).await, 1);
    assert_eq!(burst_store(&test, "g2", 101).await, 2);
    assert_eq!(burst_store(&test, "g3", 250).await, 3);

    let scores = test.repo.entity_type::<Score>().unwrap();
    assert_eq!(test.count(&scores, "g3").unwrap(), 250);
}

#[tokio::test]
async fn small_batch_size_splits_bursts() {
    let config = test_config().batch(BatchConfig::default().with_max_batch_size(10));
    let test = TestRepository::memory_with(config).await;
    assert_eq!(burst_store(&test, "g1", 35).await, 4);
}

#[tokio::test]
async fn cbor_store_round_trips_through_disk() {
    let config = test_config().format(DocumentFormat::Cbor);
    let test = TestRepository::file_with(config.clone()).await;
    let path = test.path().unwrap();
    let scores = test.scores();
    let original = Score::new("g1", "u1", 7);
    test.store(&scores, &original).await.unwrap();

    let _dir = test.close_and_keep().await;

    let bytes = std::fs::read(&path).unwrap();
    assert!(serde_json::from_slice::<serde_json::Value>(&bytes).is_err());

    let repo = Repository::open(&path, config).await.unwrap();
    let scores = register_scores(&repo);
    assert_eq!(repo.get_all(&scores, "g1").unwrap(), vec![original]);
}

#[tokio::test]
async fn second_handle_on_same_file_is_locked_out() {
    let test = TestRepository::file().await;
    let path = test.path().unwrap();

    let err = Repository::open(&path, test_config()).await.unwrap_err();
    assert!(matches!(err, CoreError::Storage(_)));
}

#[tokio::test]
async fn preloaded_backend_is_visible() {
    let document = serde_json::json!({
        "g1": { "scores": [
            { "guild_id": "g1", "id": "u1", "value": 3, "timestamp": "2024-01-01T00:00:00Z" }
        ]}
    });
    let backend = InMemoryBackend::with_document(serde_json::to_vec(&document).unwrap());
    let repo = Repository::open_with_backend(test_config(), Box::new(backend))
        .await
        .unwrap();
    let scores = register_scores(&repo);

    let found = repo.get_by_id(&scores, "g1", "u1").unwrap().unwrap();
    assert_eq!(found.value, 3);
}

#[tokio::test]
async fn upsert_then_purge() {
    let test = TestRepository::memory().await;
    let scores = test.scores();
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

    let old = Score::at("g1", "u1", 1, now - TimeDelta::hours(30));
    assert_eq!(
        test.store_unique(&scores, &old).await.unwrap(),
        UpsertOutcome::Inserted
    );
    let recent = Score::at("g1", "u2", 2, now - TimeDelta::hours(1));
    test.store(&scores, &recent).await.unwrap();

    let removed = test
        .purge_stale_items_at(&scores, "g1", 24.0, now)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(test.get_all(&scores, "g1").unwrap(), vec![recent]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deletes_and_purges_keep_concurrent_appends() {
    let test = TestRepository::file().await;
    let repo = Arc::new(test.repo);
    let scores = register_scores(&repo);
    let now = Utc::now();
    repo.store(&scores, &Score::at("g1", "doomed", 0, now - TimeDelta::hours(48)))
        .await
        .unwrap();

    let writer = {
        let repo = Arc::clone(&repo);
        let scores = scores.clone();
        tokio::spawn(async move {
            for i in 0..60 {
                let score = Score::at("g1", &format!("u{i}"), i, now);
                repo.store(&scores, &score).await.unwrap();
            }
        })
    };
    let remover = {
        let repo = Arc::clone(&repo);
        let scores = scores.clone();
        tokio::spawn(async move {
            let purged = repo
                .purge_stale_items_at(&scores, "g1", 24.0, now)
                .await
                .unwrap();
            let deleted = repo.delete_by_id(&scores, "g1", "nobody").await.unwrap();
            (purged, deleted)
        })
    };
    writer.await.unwrap();
    let (purged, deleted) = remover.await.unwrap();

    assert_eq!(purged, 1);
    assert!(!deleted);
    let all = repo.get_all(&scores, "g1").unwrap();
    let values: Vec<i64> = all.iter().map(|s| s.value).collect();
    assert_eq!(values, (0..60).collect::<Vec<_>>());
}

#[tokio::test]
async fn cache_eviction_is_reported() {
    let config = test_config().cache(CacheConfig::default().with_capacity(5));
    let test = TestRepository::memory_with(config).await;
    let scores = test.scores();

    for guild in 0..6 {
        test.get_all(&scores, format!("g{guild}")).unwrap();
    }

    let stats = test.cache_stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.size, 5);
}

#[tokio::test]
async fn expired_cache_entries_are_pruned() {
    let config = test_config().cache(CacheConfig::default().with_ttl(Duration::ZERO));
    let test = TestRepository::memory_with(config).await;
    let scores = test.scores();

    test.get_all(&scores, "g1").unwrap();
    assert_eq!(test.prune_cache(), 1);

    test.get_all(&scores, "g1").unwrap();
    assert_eq!(test.cache_stats().hits, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_keep_per_task_order() {
    let test = TestRepository::memory().await;
    let repo = Arc::new(test.repo);
    let config = StressConfig {
        operations: 40,
        tasks: 3,
        guilds: 1,
    };

    let result = stress_concurrent_stores(Arc::clone(&repo), &config).await;
    assert_eq!(result.successful_ops, 120);
    assert!(result.coalescing_ratio() >= 1.0);

    let scores = repo.entity_type::<Score>().unwrap();
    let all = repo.get_all(&scores, "g0").unwrap();
    for task in 0..3 {
        let prefix = format!("t{task}-");
        let order: Vec<i64> = all
            .iter()
            .filter(|s| s.id.starts_with(&prefix))
            .map(|s| s.value)
            .collect();
        let expected: Vec<i64> = (0..40).collect();
        assert_eq!(order, expected);
    }
}

#[tokio::test]
async fn closed_repository_rejects_every_mutation() {
    let test = TestRepository::memory().await;
    let scores = test.scores();
    test.close().await.unwrap();

    let score = Score::new("g1", "u1", 1);
    assert!(matches!(
        test.store(&scores, &score).await,
        Err(CoreError::RepositoryClosed)
    ));
    assert!(matches!(
        test.store_unique(&scores, &score).await,
        Err(CoreError::RepositoryClosed)
    ));
    assert!(matches!(
        test.replace_all(&scores, "g1", vec![score]).await,
        Err(CoreError::RepositoryClosed)
    ));
    assert!(matches!(
        test.flush_pending_writes().await,
        Err(CoreError::RepositoryClosed)
    ));
}

#[tokio::test]
async fn flush_forces_pending_writes_out() {
    let config =
        test_config().batch(BatchConfig::default().with_debounce(Duration::from_secs(3600)));
    let backend = InMemoryBackend::new();
    let repo = Repository::open_with_backend(config, Box::new(backend.clone()))
        .await
        .unwrap();
    let scores = register_scores(&repo);

    let score = Score::new("g1", "u1", 1);
    let (stored, flushed) = tokio::join!(repo.store(&scores, &score), async {
        tokio::task::yield_now().await;
        repo.flush_pending_writes().await
    });
    stored.unwrap();
    flushed.unwrap();

    assert_eq!(backend.write_count(), 1);
    assert!(backend.size().unwrap() > 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn purge_keeps_exactly_the_fresh_records(
        records in scores_strategy(
            "g1",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            48,
            30,
        ),
        max_age in 0u32..48,
    ) {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (removed, kept) = runtime.block_on(async {
            let test = TestRepository::memory().await;
            let scores = test.scores();
            test.replace_all(&scores, "g1", records.clone()).await.unwrap();
            let removed = test
                .purge_stale_items_at(&scores, "g1", f64::from(max_age), now)
                .await
                .unwrap();
            (removed, test.get_all(&scores, "g1").unwrap())
        });

        let cutoff = now - TimeDelta::hours(i64::from(max_age));
        let expected: Vec<Score> = records
            .iter()
            .filter(|s| {
                chrono::DateTime::parse_from_rfc3339(&s.timestamp).unwrap() > cutoff
            })
            .cloned()
            .collect();

        prop_assert_eq!(removed, records.len() - expected.len());
        prop_assert_eq!(kept, expected);
    }
}
