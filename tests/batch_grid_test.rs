//! Grid batch tests.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use feedscout::config::DiscoveryConfig;
use feedscout::store::get_json;
use feedscout::{Intent, MemoryStore, PipelineOptions, ScoutError};

use common::{
    explored, test_tuning, FakeBackend, FakeSubscriptions, PipelineBuilder, RecordingPresenter,
};

fn assert_distinct(ids: &[String]) {
    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len(), "duplicate card in {ids:?}");
}

#[tokio::test]
async fn test_open_fills_batch_to_size() {
    let t = PipelineBuilder::new(PipelineOptions::grid(), FakeBackend::uniform(20, 2)).build();

    t.pipeline.open().await.unwrap();

    let batch = t.presenter.last_batch();
    assert_eq!(batch.len(), 6);
    assert_distinct(&batch);
    assert_eq!(t.pipeline.batch().unwrap().cards().len(), 6);
}

#[tokio::test]
async fn test_batch_skips_subscribed_and_empty_sources() {
    let backend = FakeBackend::new(&[
        ("a", 1),
        ("b", 0),
        ("c", 1),
        ("d", 1),
        ("e", 3),
        ("f", 0),
        ("g", 2),
        ("h", 1),
        ("i", 1),
    ]);
    let t = PipelineBuilder::new(PipelineOptions::grid(), backend)
        .subscriptions(FakeSubscriptions::with_ids(&["c", "h"]))
        .build();

    t.pipeline.open().await.unwrap();

    let mut batch = t.presenter.last_batch();
    batch.sort();
    assert_eq!(batch, vec!["a", "d", "e", "g", "i"]);
}

#[tokio::test]
async fn test_explore_cards_fill_before_scanning() {
    let backend = FakeBackend::uniform(10, 1)
        .with_explore(vec![explored("x1", 3), explored("x2", 3), explored("x3", 0)]);
    let t = PipelineBuilder::new(PipelineOptions::grid(), backend).build();

    t.pipeline.open().await.unwrap();

    let batch = t.presenter.last_batch();
    assert_eq!(batch.len(), 6);
    assert_eq!(&batch[..2], &["x1".to_string(), "x2".to_string()]);
    assert!(!batch.contains(&"x3".to_string()));
    assert_eq!(t.backend.previews_of("x1"), 0);
}

#[tokio::test]
async fn test_fill_and_replace_never_duplicate_or_overflow() {
    let options = PipelineOptions {
        batch_size: 4,
        ..PipelineOptions::grid()
    };
    let t = PipelineBuilder::new(options, FakeBackend::uniform(15, 1))
        .tuning(DiscoveryConfig {
            concurrency_limit: 2,
            ..test_tuning()
        })
        .build();
    t.pipeline.open().await.unwrap();
    let batch = t.pipeline.batch().unwrap();

    for round in 0..8 {
        let cards = batch.cards();
        if cards.is_empty() {
            break;
        }
        let victim = cards[round % cards.len()].source_id.clone();
        t.pipeline.dismiss(Some(&victim)).await.unwrap();
        batch.fill_to_size().await.unwrap();

        let ids: Vec<String> = batch.cards().iter().map(|c| c.source_id.clone()).collect();
        assert!(ids.len() <= batch.capacity());
        assert_distinct(&ids);
        assert!(!ids.contains(&victim));
    }
}

#[tokio::test]
async fn test_replace_keeps_position_and_reports_slot() {
    let t = PipelineBuilder::new(PipelineOptions::grid(), FakeBackend::uniform(10, 1)).build();
    t.pipeline.open().await.unwrap();
    let before = t.presenter.last_batch();

    t.pipeline
        .handle(Intent::Dismiss(Some(before[2].clone())))
        .await
        .unwrap();

    let after: Vec<String> = t
        .pipeline
        .batch()
        .unwrap()
        .cards()
        .iter()
        .map(|c| c.source_id.clone())
        .collect();
    assert_eq!(after.len(), 6);
    assert_eq!(after[..2], before[..2]);
    assert_eq!(after[3..], before[3..]);
    assert_ne!(after[2], before[2]);
    assert_eq!(t.presenter.replacements(), vec![(2, Some(after[2].clone()))]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_exit_acknowledgment_is_bounded() {
    let t = PipelineBuilder::new(PipelineOptions::grid(), FakeBackend::uniform(10, 1))
        .presenter(RecordingPresenter::with_exit_delay(Duration::from_secs(3600)))
        .build();
    t.pipeline.open().await.unwrap();
    let victim = t.presenter.last_batch()[0].clone();

    let started = tokio::time::Instant::now();
    t.pipeline.dismiss(Some(&victim)).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(t.presenter.replacements().len(), 1);
}

#[tokio::test]
async fn test_exhausted_catalog_wraps_scan_cursor() {
    let store = Arc::new(MemoryStore::new());
    let t = PipelineBuilder::new(PipelineOptions::grid(), FakeBackend::uniform(8, 1))
        .store(store.clone())
        .build();
    t.pipeline.open().await.unwrap();
    let batch = t.pipeline.batch().unwrap();
    assert_eq!(batch.scan_cursor(), 6);

    // Two replacements use up the catalog, the third forces a wrap.
    for _ in 0..3 {
        let victim = batch.cards()[0].source_id.clone();
        t.pipeline.dismiss(Some(&victim)).await.unwrap();
    }

    assert_eq!(batch.cards().len(), 5);
    let cursor: usize = get_json(store.as_ref(), "grid:cursor").unwrap().unwrap();
    assert_eq!(cursor, 8);
}

#[tokio::test]
async fn test_load_more_appends_without_wrapping() {
    let t = PipelineBuilder::new(PipelineOptions::grid(), FakeBackend::uniform(9, 1)).build();
    t.pipeline.open().await.unwrap();
    let first = t.presenter.last_batch();

    let added = t.pipeline.load_more(6).await.unwrap();

    assert_eq!(added, 3);
    let grown = t.presenter.last_batch();
    assert_eq!(grown.len(), 9);
    assert_eq!(grown[..6], first[..]);
    assert_distinct(&grown);
    assert_eq!(t.pipeline.batch().unwrap().scan_cursor(), 9);
}

#[tokio::test]
async fn test_add_card_to_collection_in_grid() {
    let t = PipelineBuilder::new(PipelineOptions::grid(), FakeBackend::uniform(8, 1)).build();
    t.pipeline.open().await.unwrap();
    let target = t.presenter.last_batch()[1].clone();

    let card = t
        .pipeline
        .add_card_to_collection(&target, "Reading")
        .await
        .unwrap();

    assert!(card.already_added);
    assert!(t.pipeline.batch().unwrap().card(&target).unwrap().already_added);
    assert_eq!(t.subscriptions.ids(), vec![target.clone()]);
    assert_eq!(t.pipeline.newly_added_ids().await.unwrap(), vec![target]);
}

#[tokio::test]
async fn test_batch_dismiss_requires_source_id() {
    let t = PipelineBuilder::new(PipelineOptions::grid(), FakeBackend::uniform(8, 1)).build();
    t.pipeline.open().await.unwrap();

    let err = t.pipeline.dismiss(None).await.unwrap_err();
    assert!(matches!(err, ScoutError::Validation(_)));
    let err = t.pipeline.add_to_collection("Reading").await.unwrap_err();
    assert!(matches!(err, ScoutError::Validation(_)));
}

#[tokio::test]
async fn test_close_persists_batch_seen_set() {
    let store = Arc::new(MemoryStore::new());
    let t = PipelineBuilder::new(PipelineOptions::grid(), FakeBackend::uniform(12, 1))
        .store(store.clone())
        .build();
    t.pipeline.open().await.unwrap();
    let first = t.presenter.last_batch();
    t.pipeline.close().await.unwrap();

    let seen: Vec<String> = get_json(store.as_ref(), "grid:seen").unwrap().unwrap();
    assert_eq!(seen.len(), 6);

    let reopened = PipelineBuilder::new(PipelineOptions::grid(), FakeBackend::uniform(12, 1))
        .store(store)
        .build();
    reopened.pipeline.open().await.unwrap();
    let second = reopened.presenter.last_batch();
    assert_eq!(second.len(), 6);
    assert!(second.iter().all(|id| !first.contains(id)));
}

#[tokio::test]
async fn test_grid_open_reports_catalog_failure() {
    let t = PipelineBuilder::new(PipelineOptions::grid(), FakeBackend::uniform(8, 1)).build();
    t.backend
        .fail_search
        .store(true, std::sync::atomic::Ordering::SeqCst);

    assert!(t.pipeline.open().await.is_err());

    let statuses = t.presenter.statuses();
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].is_error());
    assert!(!t.pipeline.batch().unwrap().is_loading());

    t.backend
        .fail_search
        .store(false, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(t.pipeline.batch().unwrap().fill_to_size().await.unwrap(), 6);
}
