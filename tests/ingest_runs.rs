mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::{BrokenWriteStore, FakeEmbedder, Harness};
use ingest_guard::coordinator::RunRequest;
use ingest_guard::fingerprint::fingerprint;
use ingest_guard::models::RunStatus;

fn finished(status: RunStatus) -> ingest_guard::models::BatchResult {
    match status {
        RunStatus::Finished { results } => results,
        other => panic!("expected finished, got {:?}", other),
    }
}

#[tokio::test]
async fn test_ingest_all_then_rerun_is_all_skipped() {
    let h = Harness::new();
    h.write("alpha.txt", "Alpha document. It talks about Rust.");
    h.write("nested/beta.txt", "Beta document. It talks about Postgres.");
    h.write(".hidden.txt", "never ingested");

    let first = finished(h.coordinator.run_guarded(&RunRequest::all()).await);
    assert_eq!(first.processed.len(), 2);
    assert!(first.skipped.is_empty());
    assert!(first.errors.is_empty());
    assert_eq!(first.processed[0].path, h.root().join("alpha.txt").display().to_string());
    let points = h.index.point_count();
    assert_eq!(points, first.points());

    let second = finished(h.coordinator.run_guarded(&RunRequest::all()).await);
    assert!(second.processed.is_empty());
    assert_eq!(second.skipped.len(), 2);
    assert_eq!(h.index.point_count(), points);
    assert_eq!(h.store.summary().await.unwrap().files, 2);
}

#[tokio::test]
async fn test_identical_bytes_under_two_paths_ingested_once() {
    let h = Harness::new();
    h.write("a/report.txt", "Quarterly report. Revenue went up.");
    h.write("b/report-copy.txt", "Quarterly report. Revenue went up.");

    let result = finished(h.coordinator.run_guarded(&RunRequest::all()).await);
    assert_eq!(result.processed.len(), 1);
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].path, h.root().join("b/report-copy.txt").display().to_string());

    let summary = h.store.summary().await.unwrap();
    assert_eq!(summary.files, 1);
    assert_eq!(summary.points as usize, h.index.point_count());
}

#[tokio::test]
async fn test_blank_document_recorded_with_zero_points() {
    let h = Harness::new();
    h.write("blank.txt", "   \n\n\n  \t ");

    let first = finished(h.coordinator.run_guarded(&RunRequest::all()).await);
    assert_eq!(first.processed.len(), 1);
    assert_eq!(first.processed[0].points, 0);
    assert_eq!(h.embedder.calls(), 0);
    assert_eq!(h.index.point_count(), 0);

    let record = h
        .store
        .fetch(&fingerprint(b"   \n\n\n  \t "))
        .await
        .unwrap()
        .expect("record");
    assert_eq!(record.points_count, 0);
    assert_eq!(record.collection, "test_docs");

    let second = finished(h.coordinator.run_guarded(&RunRequest::all()).await);
    assert_eq!(second.skipped.len(), 1);
    assert!(second.processed.is_empty());
}

#[tokio::test]
async fn test_one_failing_document_does_not_stop_the_batch() {
    let h = Harness::new();
    h.write("1.txt", "First document.");
    h.write("2.txt", "Second document. POISON inside.");
    h.write("3.txt", "Third document.");

    let result = finished(h.coordinator.run_guarded(&RunRequest::all()).await);
    assert_eq!(result.processed.len(), 2);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path, h.root().join("2.txt").display().to_string());
    assert!(result.errors[0].error.contains("500"));

    // The failed document left no record, so the next run retries it.
    let again = finished(h.coordinator.run_guarded(&RunRequest::all()).await);
    assert_eq!(again.skipped.len(), 2);
    assert_eq!(again.errors.len(), 1);
}

#[tokio::test]
async fn test_chunk_index_order_preserved_with_parallel_embedding() {
    let h = Harness::new();
    let sentence = "This sentence is padding for the chunker. ";
    h.write("long.txt", &sentence.repeat(40));

    let result = finished(h.coordinator.run_guarded(&RunRequest::all()).await);
    let points = h.index.points.lock().unwrap();
    assert_eq!(points.len(), result.points());
    assert!(points.len() > 3);
    for (i, point) in points.iter().enumerate() {
        assert_eq!(point.payload.chunk_index, i);
        assert_eq!(point.vector[0], point.payload.text.len() as f32);
        assert_eq!(point.payload.source_hash.len(), 64);
    }
    // batch_size = 2
    assert_eq!(
        h.index.batches.load(std::sync::atomic::Ordering::SeqCst),
        points.len().div_ceil(2)
    );
}

#[tokio::test]
async fn test_explicit_paths_resolve_against_root() {
    let h = Harness::new();
    h.write("wanted.txt", "Wanted document.");
    h.write("other.txt", "Other document.");

    let request = RunRequest::paths(vec![
        PathBuf::from("wanted.txt"),
        PathBuf::from("does-not-exist.txt"),
    ]);
    let result = finished(h.coordinator.run_guarded(&request).await);
    assert_eq!(result.processed.len(), 1);
    assert_eq!(result.processed[0].path, h.root().join("wanted.txt").display().to_string());
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_model_override_applies_to_one_run() {
    let h = Harness::new();
    h.write("a.txt", "Document A.");
    h.write("b.txt", "Document B.");

    let request = RunRequest::paths(vec![PathBuf::from("a.txt")])
        .with_model(Some("mxbai-embed-large".to_string()));
    finished(h.coordinator.run_guarded(&request).await);
    finished(h.coordinator.run_guarded(&RunRequest::all()).await);

    let models = h.embedder.models.lock().unwrap();
    assert_eq!(models.as_slice(), ["mxbai-embed-large", "nomic-embed-text"]);
}

#[tokio::test]
async fn test_unrecorded_points_abort_the_run() {
    let h = Harness::with(Arc::new(BrokenWriteStore::default()), FakeEmbedder::default());
    h.write("a.txt", "First document.");
    h.write("b.txt", "Second document.");

    let status = h.coordinator.run_guarded(&RunRequest::all()).await;
    match status {
        RunStatus::Error { error } => {
            assert!(error.contains("indexed but unrecorded"), "{}", error);
            assert!(error.contains("a.txt"), "{}", error);
        }
        other => panic!("expected error, got {:?}", other),
    }
    // b.txt was never reached.
    assert_eq!(h.embedder.calls(), 1);
    assert!(!h.lock.is_held(common::LOCK_KEY));
}
