//! Integration tests for SnapshotStore lookups, mutations and persistence.

mod common;

use std::fs;
use std::time::Duration;

use common::*;
use solvecache::{
    AgentKind, Config, GeneratedCode, MatchKind, MatchResult, SnapshotStore, SolveCacheError,
    StorageError, SynonymPolicy, EXACT_MATCH_SCORE,
};
use tempfile::tempdir;

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_exact_match_scores_100_regardless_of_threshold() {
    let dir = tempdir().unwrap();
    let (store, _) = open_store(dir.path());
    store.add(snapshot_for(&store, CONCERTS, "primary")).unwrap();

    for threshold in [0.0, 90.0, 100.0] {
        let found = store.resolve(CONCERTS, threshold, 5).unwrap().found().unwrap();
        assert_eq!(found.kind, MatchKind::Exact);
        assert_eq!(found.score, EXACT_MATCH_SCORE);
        assert_eq!(found.snapshot.question, CONCERTS);
    }
}

#[test]
fn test_similar_question_above_threshold_matches() {
    let dir = tempdir().unwrap();
    let (store, _) = open_store(dir.path());
    store.add(snapshot_for(&store, CONCERTS, "primary")).unwrap();

    let found = store
        .resolve(ANY_CONCERTS, 90.0, 5)
        .unwrap()
        .found()
        .unwrap();
    assert_eq!(found.kind, MatchKind::Similar);
    assert!((found.score - 92.0).abs() < 0.01, "score was {}", found.score);

    // 60 is below the threshold
    assert!(store.resolve(GIGS, 90.0, 5).unwrap().is_not_found());
    assert!(store.resolve(RAIN, 90.0, 5).unwrap().is_not_found());
}

#[test]
fn test_synonym_at_threshold_is_accepted() {
    let dir = tempdir().unwrap();
    let (store, _) = open_store(dir.path());
    store.add(snapshot_for(&store, CONCERTS, "primary")).unwrap();

    assert!(store
        .add_synonym(CONCERTS, "got any shows this week", 90.0)
        .unwrap());

    let found = store
        .resolve("got any shows this week", 90.0, 5)
        .unwrap()
        .found()
        .unwrap();
    assert_eq!(found.kind, MatchKind::Synonym);
    assert_eq!(found.score, 90.0);
    assert_eq!(found.snapshot.question, CONCERTS);

    // Just above the recorded score: the synonym no longer applies and the
    // scan finds nothing
    assert!(store
        .resolve("got any shows this week", 90.01, 5)
        .unwrap()
        .is_not_found());
}

#[test]
fn test_synonym_lookup_skips_embedding() {
    let dir = tempdir().unwrap();
    let (store, embedder) = open_store(dir.path());
    store.add(snapshot_for(&store, CONCERTS, "primary")).unwrap();
    store.add_synonym(CONCERTS, "concerts this week", 95.0).unwrap();

    embedder.set_down(true);
    let found = store
        .resolve("concerts this week", 90.0, 5)
        .unwrap()
        .found()
        .unwrap();
    assert_eq!(found.kind, MatchKind::Synonym);

    // A scan needs the provider
    let err = store.resolve("something new", 90.0, 5).unwrap_err();
    assert!(err.is_embedding_unavailable());
}

#[test]
fn test_blacklist_excludes_snapshot_from_scan() {
    let dir = tempdir().unwrap();
    let (store, _) = open_store(dir.path());
    store.add(snapshot_for(&store, CONCERTS, "primary")).unwrap();
    store.add_synonym(CONCERTS, ANY_CONCERTS, 92.0).unwrap();

    assert!(store.blacklist(CONCERTS, ANY_CONCERTS).unwrap());
    assert!(!store.blacklist(CONCERTS, ANY_CONCERTS).unwrap());

    // Not returned at any threshold, not even 0
    assert!(store
        .find_by_similarity(ANY_CONCERTS, 0.0, 10)
        .unwrap()
        .is_empty());
    assert!(store.find_synonym(ANY_CONCERTS).unwrap().is_none());
    assert!(store.resolve(ANY_CONCERTS, 0.0, 10).unwrap().is_not_found());

    // A blacklisted question can't come back as a synonym
    assert!(!store.add_synonym(CONCERTS, ANY_CONCERTS, 99.0).unwrap());
}

#[test]
fn test_blacklist_on_one_snapshot_keeps_synonym_on_another() {
    let dir = tempdir().unwrap();
    let (store, _) = open_store(dir.path());
    store.add(snapshot_for(&store, CONCERTS, "primary")).unwrap();
    store.add(snapshot_for(&store, GIGS, "primary")).unwrap();

    assert!(store.add_synonym(CONCERTS, ANY_CONCERTS, 92.0).unwrap());
    assert!(store.blacklist(GIGS, ANY_CONCERTS).unwrap());

    // The synonym table still answers for the other snapshot
    let found = store.resolve(ANY_CONCERTS, 90.0, 5).unwrap().found().unwrap();
    assert_eq!(found.kind, MatchKind::Synonym);
    assert_eq!(found.snapshot.question, CONCERTS);
    assert_eq!(found.score, 92.0);

    // The scan excludes only the snapshot that blacklists the question
    let hits = store.find_by_similarity(ANY_CONCERTS, 0.0, 10).unwrap();
    assert!(hits.iter().any(|hit| hit.snapshot.question == CONCERTS));
    assert!(hits.iter().all(|hit| hit.snapshot.question != GIGS));

    let gigs = store.find_exact(GIGS).unwrap().unwrap();
    assert!(gigs.is_blacklisted(ANY_CONCERTS));
    assert!(!store
        .find_exact(CONCERTS)
        .unwrap()
        .unwrap()
        .is_blacklisted(ANY_CONCERTS));
}

#[test]
fn test_find_by_similarity_orders_and_limits() {
    let dir = tempdir().unwrap();
    let (store, _) = open_store(dir.path());
    store.add(snapshot_for(&store, CONCERTS, "primary")).unwrap();
    store.add(snapshot_for(&store, GIGS, "primary")).unwrap();
    store.add(snapshot_for(&store, RAIN, "primary")).unwrap();

    let results = store.find_by_similarity(ANY_CONCERTS, 50.0, 10).unwrap();
    let questions: Vec<&str> = results.iter().map(|r| r.snapshot.question.as_str()).collect();
    assert_eq!(questions, vec![CONCERTS, GIGS]);
    assert!(results[0].score > results[1].score);

    let limited = store.find_by_similarity(ANY_CONCERTS, 0.0, 1).unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].snapshot.question, CONCERTS);
}

#[test]
fn test_find_by_code_similarity() {
    let dir = tempdir().unwrap();
    let (store, _) = open_store(dir.path());
    store.add(snapshot_for(&store, CONCERTS, "primary")).unwrap();
    store.add(snapshot_for(&store, RAIN, "primary")).unwrap();

    let exemplar = program(RAIN, "primary").source();
    let results = store.find_by_code_similarity(&exemplar, 99.0).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].snapshot.question, RAIN);
}

// ============================================================================
// Mutations
// ============================================================================

#[test]
fn test_replace_code_invalidates_synonyms_by_default() {
    let dir = tempdir().unwrap();
    let (store, _) = open_store(dir.path());
    store.add(snapshot_for(&store, CONCERTS, "primary")).unwrap();
    store.add_synonym(CONCERTS, ANY_CONCERTS, 92.0).unwrap();
    store.blacklist(CONCERTS, GIGS).unwrap();

    let code = program(CONCERTS, "backup");
    store.replace_code(CONCERTS, code.clone()).unwrap();

    let snapshot = store.find_exact(CONCERTS).unwrap().unwrap();
    assert_eq!(snapshot.code, code);
    assert_eq!(snapshot.code_embedding, store.embed(&code.source()).unwrap());
    assert!(snapshot.synonymous_questions.is_empty());
    assert!(snapshot.non_synonymous_questions.contains(GIGS));
    assert!(store.find_synonym(ANY_CONCERTS).unwrap().is_none());
}

#[test]
fn test_replace_code_retains_synonyms_when_configured() {
    let dir = tempdir().unwrap();
    let config = Config {
        synonym_policy: SynonymPolicy::Retain,
        ..config()
    };
    let (store, _) = open_store_with(dir.path(), config);
    store.add(snapshot_for(&store, CONCERTS, "primary")).unwrap();
    store.add_synonym(CONCERTS, ANY_CONCERTS, 92.0).unwrap();

    store
        .replace_code(CONCERTS, program(CONCERTS, "backup"))
        .unwrap();

    let hit = store.find_synonym(ANY_CONCERTS).unwrap().unwrap();
    assert_eq!(hit.snapshot.question, CONCERTS);
    assert_eq!(hit.score, 92.0);
}

#[test]
fn test_record_run_updates_stats() {
    let dir = tempdir().unwrap();
    let (store, _) = open_store(dir.path());
    store.add(snapshot_for(&store, CONCERTS, "primary")).unwrap();

    store
        .record_run(CONCERTS, true, Duration::from_millis(40), Some("2 concerts".into()))
        .unwrap();
    store
        .record_run(CONCERTS, false, Duration::from_millis(7), None)
        .unwrap();

    let snapshot = store.find_exact(CONCERTS).unwrap().unwrap();
    assert_eq!(snapshot.run_counter, 2);
    assert_eq!(snapshot.runtime_stats.success_count, 1);
    assert_eq!(snapshot.runtime_stats.failure_count, 1);
    assert_eq!(snapshot.runtime_stats.last_latency_ms, 7);
    assert!(!snapshot.runtime_stats.last_success);
    assert_eq!(snapshot.last_answer.as_deref(), Some("2 concerts"));
}

#[test]
fn test_add_replaces_snapshot_with_same_question() {
    let dir = tempdir().unwrap();
    let (store, _) = open_store(dir.path());
    store.add(snapshot_for(&store, CONCERTS, "primary")).unwrap();
    store.add(snapshot_for(&store, CONCERTS, "backup")).unwrap();

    assert_eq!(store.len(), 1);
    let snapshot = store.find_exact(CONCERTS).unwrap().unwrap();
    assert_eq!(snapshot.code, program(CONCERTS, "backup"));
}

#[test]
fn test_add_rejects_overlapping_sets() {
    let dir = tempdir().unwrap();
    let (store, _) = open_store(dir.path());
    let mut snapshot = snapshot_for(&store, CONCERTS, "primary");
    snapshot
        .synonymous_questions
        .insert(ANY_CONCERTS.to_string(), 92.0);
    snapshot
        .non_synonymous_questions
        .insert(ANY_CONCERTS.to_string());

    let err = store.add(snapshot).unwrap_err();
    assert!(err.is_validation());
    assert!(store.is_empty());
}

#[test]
fn test_add_synonym_requires_question() {
    let dir = tempdir().unwrap();
    let (store, _) = open_store(dir.path());
    store.add(snapshot_for(&store, CONCERTS, "primary")).unwrap();
    assert!(store.add_synonym(CONCERTS, "", 95.0).unwrap_err().is_validation());
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_round_trip_across_reopen() {
    let dir = tempdir().unwrap();
    let original = {
        let (store, _) = open_store(dir.path());
        let snapshot = snapshot_for(&store, CONCERTS, "primary");
        store.add(snapshot).unwrap();
        store.add_synonym(CONCERTS, ANY_CONCERTS, 92.0).unwrap();
        store.blacklist(CONCERTS, GIGS).unwrap();
        let stored = store.find_exact(CONCERTS).unwrap().unwrap();
        store.close().unwrap();
        stored
    };

    let (store, embedder) = open_store(dir.path());
    let reloaded = store.find_exact(CONCERTS).unwrap().unwrap();
    assert_eq!(reloaded, original);
    assert_eq!(reloaded.agent, AgentKind::Calendar);

    // Synonym table is rebuilt from the snapshot
    let hit = store.find_synonym(ANY_CONCERTS).unwrap().unwrap();
    assert_eq!(hit.score, 92.0);

    // Embeddings come from the on-disk cache, not the provider
    store.embed(CONCERTS).unwrap();
    assert_eq!(embedder.calls(), 0);
}

#[test]
fn test_corrupt_file_is_skipped_at_open() {
    let dir = tempdir().unwrap();
    {
        let (store, _) = open_store(dir.path());
        store.add(snapshot_for(&store, CONCERTS, "primary")).unwrap();
        store.close().unwrap();
    }
    let bad = dir.path().join("snapshots").join("broken-0.json");
    fs::write(&bad, "{ not json").unwrap();

    let (store, _) = open_store(dir.path());
    assert_eq!(store.len(), 1);
    assert_eq!(store.skipped_files().len(), 1);
    match &store.skipped_files()[0] {
        StorageError::CorruptSnapshotFile { path, .. } => assert_eq!(path, &bad),
        other => panic!("expected CorruptSnapshotFile, got {other:?}"),
    }
    assert!(store.find_exact(CONCERTS).unwrap().is_some());
}

#[test]
fn test_second_open_of_same_directory_is_rejected() {
    let dir = tempdir().unwrap();
    let (store, _) = open_store(dir.path());

    let err = SnapshotStore::open(dir.path(), config(), Box::new(TableEmbedder::new()))
        .unwrap_err();
    assert!(matches!(
        err,
        SolveCacheError::Storage(StorageError::DirectoryLocked(_))
    ));

    store.close().unwrap();
    let (reopened, _) = open_store(dir.path());
    reopened.close().unwrap();
}

#[test]
fn test_questions_are_sorted() {
    let dir = tempdir().unwrap();
    let (store, _) = open_store(dir.path());
    store.add(snapshot_for(&store, RAIN, "primary")).unwrap();
    store.add(snapshot_for(&store, CONCERTS, "primary")).unwrap();

    assert_eq!(store.questions().unwrap(), vec![CONCERTS, RAIN]);
}

#[test]
fn test_empty_code_is_rejected() {
    let dir = tempdir().unwrap();
    let (store, _) = open_store(dir.path());
    store.add(snapshot_for(&store, CONCERTS, "primary")).unwrap();

    let err = store
        .replace_code(CONCERTS, GeneratedCode::default())
        .unwrap_err();
    assert!(err.is_validation());
    let snapshot = store.find_exact(CONCERTS).unwrap().unwrap();
    assert_eq!(snapshot.code, program(CONCERTS, "primary"));
}

#[test]
fn test_resolve_returns_not_found_on_empty_store() {
    let dir = tempdir().unwrap();
    let (store, _) = open_store(dir.path());
    assert_eq!(store.resolve(CONCERTS, 90.0, 5).unwrap(), MatchResult::NotFound);
}
