//! Directed dependency graph over symbols (C4): transitive reachability and
//! a reverse-dependency index, built from the `UsageEdge`s the symbol graph
//! builder (C2) produces.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::graph::SymbolGraph;
use crate::symbol::Fqs;

/// Forward adjacency `from -> {to}`, deduplicated across repeated edges
/// between the same pair.
#[derive(Clone, Debug, Default)]
pub struct DepGraph {
    forward: HashMap<Fqs, HashSet<Fqs>>,
    reverse: HashMap<Fqs, HashSet<Fqs>>,
}

impl DepGraph {
    /// Builds the dependency graph from a symbol graph's usage edges. Nodes
    /// with no outgoing or incoming edges still exist implicitly — callers
    /// query against the symbol graph's node set, not this adjacency alone.
    pub fn from_symbol_graph(graph: &SymbolGraph) -> Self {
        let mut forward: HashMap<Fqs, HashSet<Fqs>> = HashMap::new();
        let mut reverse: HashMap<Fqs, HashSet<Fqs>> = HashMap::new();
        for edge in &graph.edges {
            if edge.from == edge.to {
                continue; // self-loops carry no reachability information
            }
            forward
                .entry(edge.from.clone())
                .or_default()
                .insert(edge.to.clone());
            reverse
                .entry(edge.to.clone())
                .or_default()
                .insert(edge.from.clone());
        }
        Self { forward, reverse }
    }

    pub fn direct_dependencies(&self, symbol: &Fqs) -> HashSet<Fqs> {
        self.forward.get(symbol).cloned().unwrap_or_default()
    }

    pub fn direct_dependents(&self, symbol: &Fqs) -> HashSet<Fqs> {
        self.reverse.get(symbol).cloned().unwrap_or_default()
    }

    /// All symbols reachable from `symbol` by following edges forward,
    /// *including* `symbol` itself (a node is always reachable from
    /// itself by the zero-length path). O(V+E) via BFS.
    pub fn reachable(&self, symbol: &Fqs) -> HashSet<Fqs> {
        let mut reached = bfs(&self.forward, symbol);
        reached.insert(symbol.clone());
        reached
    }

    /// All symbols that transitively depend on `symbol` (i.e. `symbol` is
    /// reachable from them), *excluding* `symbol` itself. Tolerant of
    /// cycles: a symbol that depends on itself transitively is visited once.
    pub fn transitive_dependents(&self, symbol: &Fqs) -> HashSet<Fqs> {
        bfs(&self.reverse, symbol)
    }

    /// Computes, for every node named in `universe`, the set of symbols
    /// that transitively depend on it — i.e. the full reverse-reachability
    /// index. Built as a two-phase DP over the whole graph rather than one
    /// BFS per universe member: phase one computes each vertex's full
    /// forward transitive closure exactly once, seeded from its direct
    /// successors and folded with its successors' already-computed
    /// closures; phase two inverts that map so `rev[d]` collects every
    /// vertex that can reach `d`. Symbols with no dependents map to an
    /// empty set.
    pub fn reverse_index(&self, universe: &HashSet<Fqs>) -> HashMap<Fqs, HashSet<Fqs>> {
        let closure = transitive_closures(&self.forward);
        let mut rev: HashMap<Fqs, HashSet<Fqs>> = HashMap::new();
        for (from, reachable) in &closure {
            for to in reachable {
                rev.entry(to.clone()).or_default().insert(from.clone());
            }
        }
        // A cycle can make a vertex its own transitive successor; `rev[x]`
        // answers "who depends on x", which excludes x itself.
        for (symbol, dependents) in rev.iter_mut() {
            dependents.remove(symbol);
        }

        universe
            .iter()
            .map(|symbol| (symbol.clone(), rev.get(symbol).cloned().unwrap_or_default()))
            .collect()
    }

    /// A shortest path (by edge count) from `from` to `to` following forward
    /// edges, inclusive of both endpoints, or `None` if `to` isn't reachable
    /// from `from`. Computed lazily — callers ask for this only when they
    /// need a human-readable witness for why a test was selected.
    pub fn shortest_path(&self, from: &Fqs, to: &Fqs) -> Option<Vec<Fqs>> {
        if from == to {
            return Some(vec![from.clone()]);
        }
        let mut queue = VecDeque::new();
        let mut came_from: HashMap<Fqs, Fqs> = HashMap::new();
        let mut visited: HashSet<Fqs> = HashSet::new();
        visited.insert(from.clone());
        queue.push_back(from.clone());
        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = self.forward.get(&current) {
                let mut sorted: Vec<&Fqs> = neighbors.iter().collect();
                sorted.sort();
                for next in sorted {
                    if visited.insert(next.clone()) {
                        came_from.insert(next.clone(), current.clone());
                        if next == to {
                            return Some(reconstruct(&came_from, from, to));
                        }
                        queue.push_back(next.clone());
                    }
                }
            }
        }
        None
    }
}

fn reconstruct(came_from: &HashMap<Fqs, Fqs>, from: &Fqs, to: &Fqs) -> Vec<Fqs> {
    let mut path = vec![to.clone()];
    let mut current = to;
    while current != from {
        let prev = &came_from[current];
        path.push(prev.clone());
        current = prev;
    }
    path.reverse();
    path
}

/// Computes `T[v] = direct_successors(v) ∪ ⋃_{s ∈ direct_successors(v)} T[s]`
/// for every vertex appearing in `adjacency`, in a single DP pass rather than
/// an independent traversal per vertex. Vertices are folded in a stable total
/// order (descending by `Fqs`) so an acyclic graph converges in one sweep;
/// a cycle can leave a successor's closure incomplete on the first visit, so
/// the sweep repeats until a full pass makes no further change. Correctness
/// never depends on the graph being acyclic, only the number of sweeps needed
/// to reach a fixed point does.
fn transitive_closures(adjacency: &HashMap<Fqs, HashSet<Fqs>>) -> HashMap<Fqs, HashSet<Fqs>> {
    let mut vertices: Vec<&Fqs> = adjacency.keys().chain(adjacency.values().flatten()).collect();
    vertices.sort();
    vertices.dedup();

    let mut closure: HashMap<Fqs, HashSet<Fqs>> = HashMap::with_capacity(vertices.len());
    let mut changed = true;
    while changed {
        changed = false;
        for &v in vertices.iter().rev() {
            let Some(successors) = adjacency.get(v) else {
                continue;
            };
            let mut next = successors.clone();
            for s in successors {
                if let Some(t) = closure.get(s) {
                    next.extend(t.iter().cloned());
                }
            }
            if closure.get(v) != Some(&next) {
                closure.insert(v.clone(), next);
                changed = true;
            }
        }
    }
    closure
}

fn bfs(adjacency: &HashMap<Fqs, HashSet<Fqs>>, start: &Fqs) -> HashSet<Fqs> {
    let mut visited: HashSet<Fqs> = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(start.clone());
    while let Some(current) = queue.pop_front() {
        if let Some(neighbors) = adjacency.get(&current) {
            for next in neighbors {
                if next != start && visited.insert(next.clone()) {
                    queue.push_back(next.clone());
                }
            }
        }
    }
    visited
}
