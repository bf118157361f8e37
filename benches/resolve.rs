//! Benchmarks for snapshot resolution.
//!
//! Run with: `cargo bench`
//!
//! The similarity scan is linear in the number of snapshots. These numbers
//! show where that starts to matter:
//! - exact and synonym hits are O(1) and should stay flat
//! - a full scan miss grows with the snapshot count

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use solvecache::{
    AgentKind, Config, Embedding, EmbeddingDimension, EmbeddingService, GeneratedCode, Result,
    SnapshotStore, SolutionSnapshot,
};
use tempfile::{tempdir, TempDir};

const DIM: usize = 384;

/// Pseudo-random but deterministic embeddings.
struct HashEmbedder;

impl EmbeddingService for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        Ok((0..DIM)
            .map(|i| {
                let mut hasher = DefaultHasher::new();
                (text, i).hash(&mut hasher);
                (hasher.finish() % 2000) as f32 / 1000.0 - 1.0
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

fn question(i: usize) -> String {
    format!("cached question number {i}")
}

/// Opens a store holding `n` snapshots.
fn populated_store(n: usize) -> (TempDir, SnapshotStore) {
    let dir = tempdir().unwrap();
    let config = Config::with_dimension(EmbeddingDimension::D384);
    let store = SnapshotStore::open(dir.path(), config, Box::new(HashEmbedder)).unwrap();

    for i in 0..n {
        let q = question(i);
        let code = GeneratedCode::new(vec![format!("answer = {i}")], "print(answer)", "int");
        let snapshot = SolutionSnapshot::new(
            q.clone(),
            store.embed(&q).unwrap(),
            code.clone(),
            store.embed(&code.source()).unwrap(),
            AgentKind::Receptionist,
        );
        store.add(snapshot).unwrap();
    }
    store
        .add_synonym(&question(0), "a recorded synonym", 95.0)
        .unwrap();
    (dir, store)
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for n in [10, 100, 1000] {
        let (_dir, store) = populated_store(n);
        // Embedded once so the scan benchmark measures scoring only
        store.embed("an unseen question").unwrap();

        group.bench_with_input(BenchmarkId::new("exact", n), &n, |b, _| {
            b.iter(|| store.resolve(&question(n / 2), 90.0, 5).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("synonym", n), &n, |b, _| {
            b.iter(|| store.resolve("a recorded synonym", 90.0, 5).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("scan_miss", n), &n, |b, _| {
            b.iter(|| store.resolve("an unseen question", 90.0, 5).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolve);
criterion_main!(benches);
