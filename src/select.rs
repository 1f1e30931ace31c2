//! Test selection (C5): decides which tests to run given a verified
//! baseline and the current content hashes, classifying each test as
//! *targeted*, *unselective integration*, or *regular* and selecting it
//! according to that classification.

use std::collections::{HashMap, HashSet};

use crate::dag::DepGraph;
use crate::error::EngineError;
use crate::graph::{NodeKind, SymbolGraph};
use crate::symbol::Fqs;

/// Why a given test was selected. Carried per-test so a caller (the CLI's
/// `select` subcommand) can explain a selection instead of just listing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionReason {
    /// No verified baseline exists yet; every test runs once to establish one.
    NoBaseline,
    /// The caller explicitly asked for the full suite.
    AllTestsRequested,
    /// A targeted test's declared target changed.
    TargetChanged(Fqs),
    /// An unselective integration test runs whenever anything changed.
    UnselectiveIntegration,
    /// A regular test's transitive dependency changed; carries the changed
    /// symbol that triggered selection (not necessarily the closest one
    /// until `Selector::witness_path` computes a full trace).
    DependencyChanged(Fqs),
    /// The test's own definition changed.
    SelfChanged,
}

#[derive(Clone, Debug, Default)]
pub struct Selection {
    pub selected: HashSet<Fqs>,
    pub all_tests: bool,
    pub changed: HashSet<Fqs>,
    /// Symbols present in the baseline but absent from the current hash
    /// map. Reported for visibility only — deletions never drive selection;
    /// a test is selected because something it depends on still exists and
    /// changed, not because a dependency vanished.
    pub deleted: HashSet<Fqs>,
    /// For each changed symbol, the direct dependents that are neither
    /// tests nor namespaces and that no test transitively reaches — a
    /// coverage gap, reported but never itself a reason to select anything.
    pub untested_usages: HashMap<Fqs, HashSet<Fqs>>,
    pub(crate) reasons: HashMap<Fqs, SelectionReason>,
}

impl Selection {
    pub fn reason(&self, test: &Fqs) -> Option<&SelectionReason> {
        self.reasons.get(test)
    }

    pub fn insert_reason(&mut self, test: Fqs, reason: SelectionReason) {
        self.reasons.insert(test, reason);
    }

    fn all(tests: HashSet<Fqs>, reason: SelectionReason) -> Self {
        let reasons = tests.iter().map(|t| (t.clone(), reason.clone())).collect();
        Self {
            selected: tests,
            all_tests: true,
            reasons,
            ..Default::default()
        }
    }

    pub fn stats(&self, total_tests: usize) -> SelectionStats {
        let selection_rate = if total_tests == 0 {
            0.0
        } else {
            self.selected.len() as f64 / total_tests as f64 * 100.0
        };
        SelectionStats {
            total_tests,
            selected_tests: self.selected.len(),
            changed_symbols: self.changed.len(),
            untested_usages_total: self.untested_usages.values().map(HashSet::len).sum(),
            selection_rate,
        }
    }
}

/// Summary counters for a selection, surfaced by the CLI's `status`/`select`
/// output rather than computed ad hoc by each caller.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionStats {
    pub total_tests: usize,
    pub selected_tests: usize,
    pub changed_symbols: usize,
    pub untested_usages_total: usize,
    pub selection_rate: f64,
}

/// What `mark_verified` actually did: how many changed symbols got folded
/// into the baseline, and which ones were left unverified because no
/// executed test covered them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MarkVerifiedReport {
    pub updated: usize,
    pub skipped: HashSet<Fqs>,
}

pub struct Selector<'g> {
    graph: &'g SymbolGraph,
    dag: DepGraph,
}

impl<'g> Selector<'g> {
    pub fn new(graph: &'g SymbolGraph) -> Self {
        let dag = DepGraph::from_symbol_graph(graph);
        Self { graph, dag }
    }

    fn all_test_symbols(&self) -> HashSet<Fqs> {
        self.graph.test_nodes().map(|n| n.symbol.clone()).collect()
    }

    /// Runs the selection algorithm. `baseline` maps previously verified
    /// symbols to their hash at verification time; `current` is the
    /// freshly computed hash of every hashable symbol in `self.graph`
    /// (typically `hash::hash_all(self.graph)`). `force_all` implements the
    /// caller-requested all-tests path.
    pub fn select(
        &self,
        baseline: &HashMap<Fqs, String>,
        current: &HashMap<Fqs, String>,
        force_all: bool,
    ) -> Selection {
        let all_tests = self.all_test_symbols();

        if baseline.is_empty() {
            return Selection::all(all_tests, SelectionReason::NoBaseline);
        }
        if force_all {
            return Selection::all(all_tests, SelectionReason::AllTestsRequested);
        }

        let changed: HashSet<Fqs> = current
            .iter()
            .filter(|(sym, hash)| baseline.get(*sym) != Some(*hash))
            .map(|(sym, _)| sym.clone())
            .collect();
        let deleted: HashSet<Fqs> = baseline
            .keys()
            .filter(|sym| !current.contains_key(*sym))
            .cloned()
            .collect();

        // Shared across the regular-test branch and the coverage-gap
        // report: one reverse-dependency pass over the changed set rather
        // than a BFS per test (see the complexity note on `DepGraph`).
        let rev_of_changed = self.dag.reverse_index(&changed);

        let mut selected = HashSet::new();
        let mut reasons = HashMap::new();

        for test in &all_tests {
            let Some(node) = self.graph.node(test) else {
                continue;
            };
            if let Some(targets) = &node.metadata.test_targets {
                if let Some(hit) = targets.iter().find(|t| changed.contains(*t)) {
                    selected.insert(test.clone());
                    reasons.insert(test.clone(), SelectionReason::TargetChanged(hit.clone()));
                }
            } else if node.metadata.is_integration {
                if !changed.is_empty() {
                    selected.insert(test.clone());
                    reasons.insert(test.clone(), SelectionReason::UnselectiveIntegration);
                }
            } else if changed.contains(test) {
                selected.insert(test.clone());
                reasons.insert(test.clone(), SelectionReason::SelfChanged);
            } else if let Some(cause) = rev_of_changed
                .iter()
                .find(|(_, dependents)| dependents.contains(test))
                .map(|(cause, _)| cause.clone())
            {
                selected.insert(test.clone());
                reasons.insert(test.clone(), SelectionReason::DependencyChanged(cause));
            }
        }

        let untested_usages = self.untested_usages(&changed, &all_tests, &rev_of_changed);

        Selection {
            selected,
            all_tests: false,
            changed,
            deleted,
            untested_usages,
            reasons,
        }
    }

    /// For each changed symbol, the set of its direct dependents that are
    /// neither tests nor namespaces and that no test transitively reaches
    /// (per the already-computed `rev_of_changed` index) — code that uses
    /// what changed but that nothing in the suite would exercise.
    fn untested_usages(
        &self,
        changed: &HashSet<Fqs>,
        all_tests: &HashSet<Fqs>,
        rev_of_changed: &HashMap<Fqs, HashSet<Fqs>>,
    ) -> HashMap<Fqs, HashSet<Fqs>> {
        let mut result = HashMap::new();
        for symbol in changed {
            let covered = rev_of_changed
                .get(symbol)
                .map(|dependents| !dependents.is_disjoint(all_tests))
                .unwrap_or(false);
            if covered {
                continue;
            }
            let gaps: HashSet<Fqs> = self
                .dag
                .direct_dependents(symbol)
                .into_iter()
                .filter(|dep| {
                    self.graph
                        .node(dep)
                        .map(|n| !n.metadata.is_test && n.kind != NodeKind::Namespace)
                        .unwrap_or(false)
                })
                .filter(|dep| {
                    self.dag
                        .transitive_dependents(dep)
                        .is_disjoint(all_tests)
                        && !all_tests.contains(dep)
                })
                .collect();
            if !gaps.is_empty() {
                result.insert(symbol.clone(), gaps);
            }
        }
        result
    }

    /// A human-readable dependency trace from `test` to `target`, computed
    /// lazily (only when a caller wants to explain a `DependencyChanged`
    /// reason, e.g. for CLI output).
    pub fn witness_path(&self, test: &Fqs, target: &Fqs) -> Option<Vec<Fqs>> {
        self.dag.shortest_path(test, target)
    }

    /// Folds the hashes of changed symbols actually covered by executed
    /// tests into `baseline`. `tests_run` is the set of tests that really
    /// ran; `None` means every test in `selection.selected` ran (the
    /// common case when a caller runs the full selection and nothing
    /// failed to execute). A changed symbol counts as verified only if some
    /// executed test's reachable set (including the test itself) contains
    /// it; anything else changed stays unverified and is reported in
    /// `skipped` so it gets reselected next run.
    pub fn mark_verified(
        &self,
        baseline: &mut HashMap<Fqs, String>,
        current: &HashMap<Fqs, String>,
        selection: &Selection,
        tests_run: Option<&HashSet<Fqs>>,
    ) -> Result<MarkVerifiedReport, EngineError> {
        let tests_run = tests_run.unwrap_or(&selection.selected);
        for test in tests_run {
            match self.graph.node(test) {
                None => return Err(EngineError::UnknownTest(test.clone())),
                Some(node) if !node.metadata.is_test => {
                    return Err(EngineError::NotATest(test.clone()))
                }
                Some(_) => {}
            }
        }

        let mut covered: HashSet<Fqs> = HashSet::new();
        for test in tests_run {
            covered.extend(self.dag.reachable(test));
        }

        let verified: HashSet<Fqs> = selection.changed.intersection(&covered).cloned().collect();
        let skipped: HashSet<Fqs> = selection.changed.difference(&verified).cloned().collect();

        let mut updated = 0;
        for symbol in &verified {
            if let Some(hash) = current.get(symbol) {
                baseline.insert(symbol.clone(), hash.clone());
                updated += 1;
            }
        }

        Ok(MarkVerifiedReport { updated, skipped })
    }

    /// Marks every currently known symbol as verified, replacing the whole
    /// baseline with the current hash map. Used to adopt a legacy codebase
    /// with no prior verified state, not for the normal "tests ran" path.
    pub fn mark_all_verified(&self, current: &HashMap<Fqs, String>) -> HashMap<Fqs, String> {
        current.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FileRecord, NodeKind, NodeMetadata, SymbolNode, UsageEdge};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn test_node(sym: Fqs, is_integration: bool, targets: Option<HashSet<Fqs>>) -> SymbolNode {
        SymbolNode {
            symbol: sym,
            kind: NodeKind::Var,
            file: PathBuf::from("a.clj"),
            line: Some(1),
            end_line: Some(1),
            defined_by: None,
            metadata: NodeMetadata {
                is_test: true,
                is_integration,
                test_targets: targets,
                ..Default::default()
            },
        }
    }

    fn plain_node(sym: Fqs) -> SymbolNode {
        SymbolNode {
            symbol: sym,
            kind: NodeKind::Var,
            file: PathBuf::from("a.clj"),
            line: Some(1),
            end_line: Some(1),
            defined_by: None,
            metadata: NodeMetadata::default(),
        }
    }

    fn f(ns: &str, name: &str) -> Fqs {
        Fqs::new(ns, name)
    }

    fn graph(nodes: Vec<SymbolNode>, edges: Vec<(Fqs, Fqs)>) -> SymbolGraph {
        let mut map = HashMap::new();
        for n in nodes {
            map.insert(n.symbol.clone(), n);
        }
        let edges = edges
            .into_iter()
            .map(|(from, to)| UsageEdge {
                from,
                to,
                file: PathBuf::from("a.clj"),
                line: 1,
            })
            .collect();
        SymbolGraph {
            nodes: map,
            edges,
            files: HashMap::from([(PathBuf::from("a.clj"), FileRecord::default())]),
        }
    }

    #[test]
    fn empty_baseline_selects_everything() {
        let g = graph(vec![test_node(f("a", "t1"), false, None)], vec![]);
        let selector = Selector::new(&g);
        let sel = selector.select(&HashMap::new(), &HashMap::from([(f("a", "t1"), "h1".into())]), false);
        assert!(sel.all_tests);
        assert_eq!(sel.selected, HashSet::from([f("a", "t1")]));
        assert_eq!(sel.reason(&f("a", "t1")), Some(&SelectionReason::NoBaseline));
    }

    #[test]
    fn forced_all_selects_everything_even_with_a_baseline() {
        let g = graph(vec![test_node(f("a", "t1"), false, None)], vec![]);
        let selector = Selector::new(&g);
        let baseline = HashMap::from([(f("a", "t1"), "h1".into())]);
        let current = HashMap::from([(f("a", "t1"), "h1".into())]);
        let sel = selector.select(&baseline, &current, true);
        assert!(sel.all_tests);
        assert_eq!(sel.selected, HashSet::from([f("a", "t1")]));
    }

    #[test]
    fn regular_test_selected_when_transitive_dependency_changes() {
        let g = graph(
            vec![test_node(f("a", "t1"), false, None), plain_node(f("a", "impl"))],
            vec![(f("a", "t1"), f("a", "impl"))],
        );
        let selector = Selector::new(&g);
        let baseline = HashMap::from([(f("a", "t1"), "ht".into()), (f("a", "impl"), "old".into())]);
        let current = HashMap::from([(f("a", "t1"), "ht".into()), (f("a", "impl"), "new".into())]);
        let sel = selector.select(&baseline, &current, false);
        assert_eq!(sel.selected, HashSet::from([f("a", "t1")]));
        assert_eq!(
            sel.reason(&f("a", "t1")),
            Some(&SelectionReason::DependencyChanged(f("a", "impl")))
        );
    }

    #[test]
    fn regular_test_not_selected_when_nothing_it_depends_on_changed() {
        let g = graph(
            vec![
                test_node(f("a", "t1"), false, None),
                plain_node(f("a", "impl")),
                plain_node(f("a", "unrelated")),
            ],
            vec![(f("a", "t1"), f("a", "impl"))],
        );
        let selector = Selector::new(&g);
        let baseline = HashMap::from([
            (f("a", "t1"), "ht".into()),
            (f("a", "impl"), "hi".into()),
            (f("a", "unrelated"), "old".into()),
        ]);
        let current = HashMap::from([
            (f("a", "t1"), "ht".into()),
            (f("a", "impl"), "hi".into()),
            (f("a", "unrelated"), "new".into()),
        ]);
        let sel = selector.select(&baseline, &current, false);
        assert!(sel.selected.is_empty());
    }

    #[test]
    fn test_selected_when_its_own_definition_changes() {
        let g = graph(vec![test_node(f("a", "t1"), false, None)], vec![]);
        let selector = Selector::new(&g);
        let baseline = HashMap::from([(f("a", "t1"), "old".into())]);
        let current = HashMap::from([(f("a", "t1"), "new".into())]);
        let sel = selector.select(&baseline, &current, false);
        assert_eq!(sel.selected, HashSet::from([f("a", "t1")]));
        assert_eq!(sel.reason(&f("a", "t1")), Some(&SelectionReason::SelfChanged));
    }

    #[test]
    fn targeted_test_selected_only_when_its_target_changes() {
        let g = graph(
            vec![
                test_node(f("a", "t1"), false, Some(HashSet::from([f("api", "create")]))),
                plain_node(f("api", "create")),
                plain_node(f("api", "delete")),
            ],
            vec![],
        );
        let selector = Selector::new(&g);
        let baseline = HashMap::from([
            (f("a", "t1"), "ht".into()),
            (f("api", "create"), "old".into()),
            (f("api", "delete"), "same".into()),
        ]);
        let current = HashMap::from([
            (f("a", "t1"), "ht".into()),
            (f("api", "create"), "old".into()),
            (f("api", "delete"), "same".into()),
        ]);
        let sel = selector.select(&baseline, &current, false);
        assert!(sel.selected.is_empty());

        let mut current_changed = current.clone();
        current_changed.insert(f("api", "create"), "new".into());
        let sel2 = selector.select(&baseline, &current_changed, false);
        assert_eq!(sel2.selected, HashSet::from([f("a", "t1")]));
    }

    #[test]
    fn targeted_test_is_not_selected_by_its_own_change_alone() {
        let g = graph(
            vec![
                test_node(f("a", "t1"), false, Some(HashSet::from([f("api", "create")]))),
                plain_node(f("api", "create")),
            ],
            vec![],
        );
        let selector = Selector::new(&g);
        let baseline = HashMap::from([(f("a", "t1"), "old".into()), (f("api", "create"), "same".into())]);
        let current = HashMap::from([(f("a", "t1"), "new".into()), (f("api", "create"), "same".into())]);
        let sel = selector.select(&baseline, &current, false);
        assert!(sel.selected.is_empty());
    }

    #[test]
    fn unselective_integration_test_runs_on_any_change() {
        let g = graph(
            vec![
                test_node(f("a", "it1"), true, None),
                plain_node(f("a", "unrelated")),
            ],
            vec![],
        );
        let selector = Selector::new(&g);
        let baseline = HashMap::from([
            (f("a", "it1"), "hi".into()),
            (f("a", "unrelated"), "old".into()),
        ]);
        let current = HashMap::from([
            (f("a", "it1"), "hi".into()),
            (f("a", "unrelated"), "new".into()),
        ]);
        let sel = selector.select(&baseline, &current, false);
        assert_eq!(sel.selected, HashSet::from([f("a", "it1")]));
        assert_eq!(sel.reason(&f("a", "it1")), Some(&SelectionReason::UnselectiveIntegration));
    }

    #[test]
    fn deletion_alone_does_not_select_anything() {
        let g = graph(
            vec![test_node(f("a", "t1"), false, None)],
            vec![(f("a", "t1"), f("a", "impl"))],
        );
        let selector = Selector::new(&g);
        let baseline = HashMap::from([(f("a", "t1"), "ht".into()), (f("a", "impl"), "hi".into())]);
        let current = HashMap::from([(f("a", "t1"), "ht".into())]);
        let sel = selector.select(&baseline, &current, false);
        assert!(sel.deleted.contains(&f("a", "impl")));
        assert!(sel.selected.is_empty());
    }

    #[test]
    fn untested_usages_reports_non_test_dependents_no_test_reaches() {
        let g = graph(
            vec![
                test_node(f("a", "t1"), false, None),
                plain_node(f("a", "reached")),
                plain_node(f("a", "orphan")),
                plain_node(f("a", "orphan_user")),
            ],
            vec![
                (f("a", "t1"), f("a", "reached")),
                (f("a", "orphan_user"), f("a", "orphan")),
            ],
        );
        let selector = Selector::new(&g);
        let baseline = HashMap::from([
            (f("a", "t1"), "ht".into()),
            (f("a", "reached"), "old".into()),
            (f("a", "orphan"), "old".into()),
            (f("a", "orphan_user"), "old".into()),
        ]);
        let current = HashMap::from([
            (f("a", "t1"), "ht".into()),
            (f("a", "reached"), "old".into()),
            (f("a", "orphan"), "new".into()),
            (f("a", "orphan_user"), "old".into()),
        ]);
        let sel = selector.select(&baseline, &current, false);
        assert_eq!(
            sel.untested_usages.get(&f("a", "orphan")),
            Some(&HashSet::from([f("a", "orphan_user")]))
        );
        assert!(!sel.untested_usages.contains_key(&f("a", "reached")));
    }

    #[test]
    fn mark_verified_rejects_unknown_symbol() {
        let g = graph(vec![test_node(f("a", "t1"), false, None)], vec![]);
        let selector = Selector::new(&g);
        let mut baseline = HashMap::new();
        let current = HashMap::from([(f("a", "t1"), "h".into())]);
        let selection = Selection::default();
        let err = selector
            .mark_verified(&mut baseline, &current, &selection, Some(&HashSet::from([f("a", "ghost")])))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownTest(_)));
        assert!(baseline.is_empty());
    }

    #[test]
    fn mark_verified_rejects_non_test_symbol() {
        let g = graph(
            vec![test_node(f("a", "t1"), false, None), plain_node(f("a", "impl"))],
            vec![],
        );
        let selector = Selector::new(&g);
        let mut baseline = HashMap::new();
        let current = HashMap::from([(f("a", "impl"), "h".into())]);
        let selection = Selection::default();
        let err = selector
            .mark_verified(&mut baseline, &current, &selection, Some(&HashSet::from([f("a", "impl")])))
            .unwrap_err();
        assert!(matches!(err, EngineError::NotATest(_)));
    }

    #[test]
    fn mark_verified_updates_only_changed_symbols_covered_by_executed_tests() {
        let g = graph(
            vec![
                test_node(f("a", "t1"), false, None),
                plain_node(f("a", "impl")),
                plain_node(f("a", "unreached")),
            ],
            vec![(f("a", "t1"), f("a", "impl"))],
        );
        let selector = Selector::new(&g);
        let mut baseline = HashMap::from([
            (f("a", "t1"), "ht".into()),
            (f("a", "impl"), "old".into()),
            (f("a", "unreached"), "old".into()),
        ]);
        let current = HashMap::from([
            (f("a", "t1"), "ht".into()),
            (f("a", "impl"), "new".into()),
            (f("a", "unreached"), "new".into()),
        ]);
        let selection = selector.select(&baseline, &current, false);
        assert_eq!(selection.selected, HashSet::from([f("a", "t1")]));

        let report = selector
            .mark_verified(&mut baseline, &current, &selection, None)
            .unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, HashSet::from([f("a", "unreached")]));
        assert_eq!(baseline[&f("a", "impl")], "new");
        assert_eq!(baseline[&f("a", "unreached")], "old");
    }

    #[test]
    fn mark_all_verified_replaces_baseline_wholesale() {
        let g = graph(vec![test_node(f("a", "t1"), false, None)], vec![]);
        let selector = Selector::new(&g);
        let current = HashMap::from([(f("a", "t1"), "new".into())]);
        let replaced = selector.mark_all_verified(&current);
        assert_eq!(replaced, current);
    }
}
