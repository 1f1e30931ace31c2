//! Persistent caches (C6): an ephemeral analysis snapshot (full graph plus
//! content hashes) and a durable verified baseline (symbol to hash map).
//! Both are JSON on disk — the distilled spec's "canonical tagged format"
//! is an artifact of the Clojure/EDN runtime this tool was born in, and
//! fabricating an EDN dependency nobody else in this stack uses would be
//! worse than the honest substitution — written atomically via write-then-
//! rename so a crash mid-write never leaves a torn file behind.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::SymbolGraph;
use crate::symbol::Fqs;

const DEFAULT_SNAPSHOT_PATH: &str = ".aare/snapshot.json";
const DEFAULT_BASELINE_PATH: &str = ".aare/baseline.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub analyzed_at: DateTime<Utc>,
    pub graph: SymbolGraph,
    pub hashes: HashMap<Fqs, String>,
}

fn atomic_write(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

pub struct AnalysisSnapshotCache {
    path: PathBuf,
}

impl AnalysisSnapshotCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        env::var_os("AARE_SNAPSHOT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH))
    }

    /// Loads the snapshot, or `None` if it's missing, unreadable, or
    /// corrupt. A bad snapshot is never a hard error: the caller falls back
    /// to reanalyzing from scratch.
    pub fn load(&self) -> Option<Snapshot> {
        let text = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&text).ok()
    }

    pub fn store(&self, snapshot: &Snapshot) -> io::Result<()> {
        let text = serde_json::to_string_pretty(snapshot)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        atomic_write(&self.path, &text)
    }

    pub fn clear(&self) -> io::Result<()> {
        remove_if_present(&self.path)
    }

    pub fn is_present(&self) -> bool {
        self.path.exists()
    }
}

pub struct VerifiedBaselineCache {
    path: PathBuf,
}

impl VerifiedBaselineCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        env::var_os("AARE_BASELINE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BASELINE_PATH))
    }

    /// Loads the baseline, defaulting to empty (never an error) if it's
    /// missing, unreadable, or corrupt — an empty baseline is exactly the
    /// selector's "run everything once" fast path, so this degrades safely.
    pub fn load(&self) -> HashMap<Fqs, String> {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    pub fn store(&self, baseline: &HashMap<Fqs, String>) -> io::Result<()> {
        let text = serde_json::to_string_pretty(baseline)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        atomic_write(&self.path, &text)
    }

    pub fn clear(&self) -> io::Result<()> {
        remove_if_present(&self.path)
    }

    pub fn is_present(&self) -> bool {
        self.path.exists()
    }
}

#[derive(Clone, Debug)]
pub struct CacheStatus {
    pub snapshot_present: bool,
    pub snapshot_analyzed_at: Option<DateTime<Utc>>,
    pub snapshot_symbol_count: usize,
    pub snapshot_size_bytes: Option<u64>,
    pub snapshot_modified_at: Option<DateTime<Utc>>,
    pub baseline_present: bool,
    pub baseline_test_count: usize,
    pub baseline_size_bytes: Option<u64>,
    pub baseline_modified_at: Option<DateTime<Utc>>,
}

/// `fs::metadata`'s size and modification time for a cache file, or `(None,
/// None)` if the file is missing or its metadata can't be read — status
/// reporting never errors, it just reports less.
fn file_metadata(path: &Path) -> (Option<u64>, Option<DateTime<Utc>>) {
    let Ok(meta) = fs::metadata(path) else {
        return (None, None);
    };
    (Some(meta.len()), meta.modified().ok().map(DateTime::<Utc>::from))
}

pub fn status(snapshot: &AnalysisSnapshotCache, baseline: &VerifiedBaselineCache) -> CacheStatus {
    let loaded_snapshot = snapshot.load();
    let baseline_map = baseline.load();
    let (snapshot_size_bytes, snapshot_modified_at) = file_metadata(&snapshot.path);
    let (baseline_size_bytes, baseline_modified_at) = file_metadata(&baseline.path);
    CacheStatus {
        snapshot_present: snapshot.is_present(),
        snapshot_analyzed_at: loaded_snapshot.as_ref().map(|s| s.analyzed_at),
        snapshot_symbol_count: loaded_snapshot.map(|s| s.graph.nodes.len()).unwrap_or(0),
        snapshot_size_bytes,
        snapshot_modified_at,
        baseline_present: baseline.is_present(),
        baseline_test_count: baseline_map.len(),
        baseline_size_bytes,
        baseline_modified_at,
    }
}

pub fn clear_analysis(snapshot: &AnalysisSnapshotCache) -> io::Result<()> {
    snapshot.clear()
}

pub fn clear_all(snapshot: &AnalysisSnapshotCache, baseline: &VerifiedBaselineCache) -> io::Result<()> {
    snapshot.clear()?;
    baseline.clear()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FileRecord, NodeKind, NodeMetadata, SymbolNode, UsageEdge};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf as Pb;
    use tempfile::tempdir;

    fn sample_snapshot() -> Snapshot {
        let symbol = Fqs::new("a", "f");
        let node = SymbolNode {
            symbol: symbol.clone(),
            kind: NodeKind::Var,
            file: Pb::from("a.clj"),
            line: Some(1),
            end_line: Some(1),
            defined_by: None,
            metadata: NodeMetadata::default(),
        };
        let graph = SymbolGraph {
            nodes: HashMap::from([(symbol.clone(), node)]),
            edges: Vec::<UsageEdge>::new(),
            files: HashMap::from([(Pb::from("a.clj"), FileRecord { symbols: vec![symbol.clone()] })]),
        };
        Snapshot {
            analyzed_at: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            graph,
            hashes: HashMap::from([(symbol, "h1".to_string())]),
        }
    }

    #[test]
    fn snapshot_round_trips_through_store_and_load() {
        let dir = tempdir().unwrap();
        let cache = AnalysisSnapshotCache::new(dir.path().join("snapshot.json"));
        let snapshot = sample_snapshot();
        cache.store(&snapshot).unwrap();
        let loaded = cache.load().unwrap();
        assert_eq!(loaded.hashes, snapshot.hashes);
        assert_eq!(loaded.graph.nodes.len(), 1);
    }

    #[test]
    fn missing_snapshot_loads_as_none() {
        let dir = tempdir().unwrap();
        let cache = AnalysisSnapshotCache::new(dir.path().join("missing.json"));
        assert!(cache.load().is_none());
    }

    #[test]
    fn corrupt_snapshot_loads_as_none_rather_than_erroring() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(&path, "not json").unwrap();
        let cache = AnalysisSnapshotCache::new(path);
        assert!(cache.load().is_none());
    }

    #[test]
    fn baseline_round_trips() {
        let dir = tempdir().unwrap();
        let cache = VerifiedBaselineCache::new(dir.path().join("baseline.json"));
        let baseline = HashMap::from([(Fqs::new("a", "t1"), "h1".to_string())]);
        cache.store(&baseline).unwrap();
        assert_eq!(cache.load(), baseline);
    }

    #[test]
    fn missing_baseline_loads_as_empty() {
        let dir = tempdir().unwrap();
        let cache = VerifiedBaselineCache::new(dir.path().join("missing.json"));
        assert!(cache.load().is_empty());
    }

    #[test]
    fn store_leaves_no_tmp_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let cache = AnalysisSnapshotCache::new(path.clone());
        cache.store(&sample_snapshot()).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn clear_all_removes_both_caches() {
        let dir = tempdir().unwrap();
        let snapshot_cache = AnalysisSnapshotCache::new(dir.path().join("snapshot.json"));
        let baseline_cache = VerifiedBaselineCache::new(dir.path().join("baseline.json"));
        snapshot_cache.store(&sample_snapshot()).unwrap();
        baseline_cache
            .store(&HashMap::from([(Fqs::new("a", "t1"), "h".to_string())]))
            .unwrap();
        clear_all(&snapshot_cache, &baseline_cache).unwrap();
        assert!(!snapshot_cache.is_present());
        assert!(!baseline_cache.is_present());
    }

    #[test]
    fn clearing_a_missing_cache_is_not_an_error() {
        let dir = tempdir().unwrap();
        let cache = AnalysisSnapshotCache::new(dir.path().join("missing.json"));
        assert!(cache.clear().is_ok());
    }

    #[test]
    fn status_reports_presence_and_counts() {
        let dir = tempdir().unwrap();
        let snapshot_cache = AnalysisSnapshotCache::new(dir.path().join("snapshot.json"));
        let baseline_cache = VerifiedBaselineCache::new(dir.path().join("baseline.json"));
        snapshot_cache.store(&sample_snapshot()).unwrap();
        baseline_cache
            .store(&HashMap::from([(Fqs::new("a", "t1"), "h".to_string())]))
            .unwrap();
        let s = status(&snapshot_cache, &baseline_cache);
        assert!(s.snapshot_present);
        assert_eq!(s.snapshot_symbol_count, 1);
        assert!(s.snapshot_size_bytes.unwrap() > 0);
        assert!(s.snapshot_modified_at.is_some());
        assert!(s.baseline_present);
        assert_eq!(s.baseline_test_count, 1);
        assert!(s.baseline_size_bytes.unwrap() > 0);
        assert!(s.baseline_modified_at.is_some());
    }

    #[test]
    fn status_reports_no_size_or_mtime_for_absent_caches() {
        let dir = tempdir().unwrap();
        let snapshot_cache = AnalysisSnapshotCache::new(dir.path().join("snapshot.json"));
        let baseline_cache = VerifiedBaselineCache::new(dir.path().join("baseline.json"));
        let s = status(&snapshot_cache, &baseline_cache);
        assert!(s.snapshot_size_bytes.is_none());
        assert!(s.snapshot_modified_at.is_none());
        assert!(s.baseline_size_bytes.is_none());
        assert!(s.baseline_modified_at.is_none());
    }
}
