//! Shared fixtures for integration tests.
//!
//! Embeddings are 8-dimensional. Known questions live on dims 0..4 with
//! hand-picked cosine scores between them; any other text (including code)
//! gets a hash-derived vector on dims 4..8, orthogonal to every known
//! question.

#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use solvecache::{
    Agent, AgentKind, AgentSet, CodeExecutor, Config, Embedding, EmbeddingDimension,
    EmbeddingService, ExecutionReport, GeneratedCode, Generation, Result, SnapshotStore,
    SolutionSnapshot, SolveCacheError,
};

pub const DIM: usize = 8;

pub const CONCERTS: &str = "what concerts do i have this week";
/// Scores 92 against [`CONCERTS`].
pub const ANY_CONCERTS: &str = "do i have any concerts this week";
/// Scores 60 against [`CONCERTS`].
pub const GIGS: &str = "any gigs this week";
/// Orthogonal to the concert questions.
pub const RAIN: &str = "will it rain tomorrow";

pub fn config() -> Config {
    Config {
        primary_model: "primary".to_string(),
        fallback_models: vec!["backup".to_string(), "last-resort".to_string()],
        ..Config::with_dimension(EmbeddingDimension::Custom(DIM))
    }
}

// ============================================================================
// Embeddings
// ============================================================================

fn axis(values: &[f32]) -> Embedding {
    let mut v = vec![0.0; DIM];
    v[..values.len()].copy_from_slice(values);
    v
}

/// Deterministic provider with a switch to simulate an outage.
#[derive(Clone)]
pub struct TableEmbedder {
    table: HashMap<String, Embedding>,
    down: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl TableEmbedder {
    pub fn new() -> Self {
        let mut table = HashMap::new();
        table.insert(CONCERTS.to_string(), axis(&[1.0]));
        table.insert(
            ANY_CONCERTS.to_string(),
            axis(&[0.92, (1.0f32 - 0.92 * 0.92).sqrt()]),
        );
        table.insert(GIGS.to_string(), axis(&[0.6, 0.0, 0.0, 0.8]));
        table.insert(RAIN.to_string(), axis(&[0.0, 0.0, 1.0]));
        Self {
            table,
            down: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Makes every subsequent provider call fail (or succeed again).
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Number of provider calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingService for TableEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(SolveCacheError::embedding_unavailable("provider offline"));
        }
        if let Some(v) = self.table.get(text) {
            return Ok(v.clone());
        }

        let mut v = vec![0.0; DIM];
        for (i, slot) in v[4..].iter_mut().enumerate() {
            let mut hasher = DefaultHasher::new();
            (text, i).hash(&mut hasher);
            let h = hasher.finish();
            let magnitude = 0.1 + (h % 900) as f32 / 1000.0;
            *slot = if h & (1 << 40) == 0 { magnitude } else { -magnitude };
        }
        Ok(v)
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

pub fn open_store(path: &Path) -> (SnapshotStore, TableEmbedder) {
    open_store_with(path, config())
}

pub fn open_store_with(path: &Path, config: Config) -> (SnapshotStore, TableEmbedder) {
    let embedder = TableEmbedder::new();
    let store = SnapshotStore::open(path, config, Box::new(embedder.clone())).unwrap();
    (store, embedder)
}

/// A snapshot for `question` whose code is tagged with `model`.
pub fn snapshot_for(store: &SnapshotStore, question: &str, model: &str) -> SolutionSnapshot {
    let code = program(question, model);
    SolutionSnapshot::new(
        question,
        store.embed(question).unwrap(),
        code.clone(),
        store.embed(&code.source()).unwrap(),
        AgentKind::Calendar,
    )
}

// ============================================================================
// Agents and executor
// ============================================================================

/// The program [`ScriptAgent`] writes for `question` with `model`.
pub fn program(question: &str, model: &str) -> GeneratedCode {
    GeneratedCode::new(
        vec![format!("model = {model:?}")],
        format!("print({question:?})"),
        "str",
    )
}

/// Writes [`program`]s; models listed as offline return an error.
pub struct ScriptAgent {
    kind: AgentKind,
    offline: HashSet<String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Agent for ScriptAgent {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    fn generate_code(&self, question: &str, model: &str) -> Result<Generation> {
        self.calls.lock().unwrap().push(model.to_string());
        if self.offline.contains(model) {
            return Err(SolveCacheError::agent(format!("{model} is offline")));
        }
        Ok(Generation {
            code: program(question, model),
            prompt: Some(format!("Write a program answering: {question}")),
            response: Some(format!("```\nmodel = {model:?}\n```")),
        })
    }

    fn format_output(&self, _question: &str, raw_output: &str) -> String {
        format!("[{}] {}", self.kind, raw_output.trim())
    }
}

/// Records which models agents were asked, across every kind.
#[derive(Clone, Default)]
pub struct AgentLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl AgentLog {
    pub fn models(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

/// One [`ScriptAgent`] per kind, sharing `log`.
pub fn agents(log: &AgentLog, offline: &[&str]) -> AgentSet {
    let offline: HashSet<String> = offline.iter().map(|m| m.to_string()).collect();
    AgentSet::from_fn(|kind| {
        Box::new(ScriptAgent {
            kind,
            offline: offline.clone(),
            calls: log.calls.clone(),
        })
    })
}

/// "Runs" programs by echoing the printed question; code from a failing
/// model exits with status 1.
#[derive(Clone, Default)]
pub struct ScriptExecutor {
    failing: Arc<Mutex<HashSet<String>>>,
    runs: Arc<AtomicUsize>,
}

impl ScriptExecutor {
    pub fn fail_model(&self, model: &str) {
        self.failing.lock().unwrap().insert(model.to_string());
    }

    pub fn heal_model(&self, model: &str) {
        self.failing.lock().unwrap().remove(model);
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl CodeExecutor for ScriptExecutor {
    fn run(&self, code: &GeneratedCode) -> Result<ExecutionReport> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let model = code
            .statements
            .first()
            .and_then(|s| s.strip_prefix("model = "))
            .map(|m| m.trim_matches('"').to_string())
            .unwrap_or_default();

        if self.failing.lock().unwrap().contains(&model) {
            return Ok(ExecutionReport {
                exit_code: 1,
                output: format!("Traceback: {model} wrote broken code"),
            });
        }

        let printed = code
            .example
            .strip_prefix("print(")
            .and_then(|s| s.strip_suffix(')'))
            .unwrap_or(&code.example)
            .trim_matches('"');
        Ok(ExecutionReport {
            exit_code: 0,
            output: format!("{printed}\n"),
        })
    }
}
