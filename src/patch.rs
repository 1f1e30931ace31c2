//! Incremental snapshot updates (C7): rehash only the files that actually
//! changed, carry forward every other symbol's hash untouched, and drop
//! whatever no longer appears in the freshly rebuilt graph — whether
//! because its file was deleted or the symbol itself was removed.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::cache::Snapshot;
use crate::graph::SymbolGraph;
use crate::hash;
use crate::symbol::Fqs;

/// Symbols the previous snapshot knew about that no longer exist in
/// `new_graph`. Informational — callers may want to report this before it
/// gets silently dropped by `apply`.
pub fn orphaned_symbols(previous: &Snapshot, new_graph: &SymbolGraph) -> HashSet<Fqs> {
    previous
        .hashes
        .keys()
        .filter(|sym| !new_graph.nodes.contains_key(*sym))
        .cloned()
        .collect()
}

/// Builds an updated snapshot from a freshly rebuilt graph (ingesting facts
/// is always full-repo; what this avoids is rehashing files nothing
/// touched). `changed_files` is rehashed from disk; every other symbol
/// keeps its previous hash, provided it still exists in `new_graph`.
pub fn apply(
    previous: &Snapshot,
    new_graph: SymbolGraph,
    changed_files: &HashSet<PathBuf>,
    analyzed_at: DateTime<Utc>,
) -> Snapshot {
    let rehashed = hash::rehash_subset(&new_graph, changed_files);

    let mut hashes: HashMap<Fqs, String> = previous
        .hashes
        .iter()
        .filter(|(sym, _)| new_graph.nodes.contains_key(*sym))
        .map(|(sym, h)| (sym.clone(), h.clone()))
        .collect();
    hashes.extend(rehashed);

    Snapshot {
        analyzed_at,
        graph: new_graph,
        hashes,
    }
}
