//! Symbol graph construction (C2): turns filtered analyzer facts into
//! `{nodes, edges, files}`, resolving macro-declared tests from usages of
//! configured test-declaring macros.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::fact::{DialectFilter, Facts, NamespaceDefinitionFact, UsageFact, VarDefinitionFact};
use crate::lexer::{matching_close, read_token_end, skip_ws, string_literal_end};
use crate::symbol::Fqs;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum NodeKind {
    Var,
    Namespace,
    Test,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub is_test: bool,
    pub is_integration: bool,
    pub test_targets: Option<HashSet<Fqs>>,
    pub test_name: Option<String>,
    pub private: bool,
    pub is_macro: bool,
    pub deprecated: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SymbolNode {
    pub symbol: Fqs,
    pub kind: NodeKind,
    pub file: PathBuf,
    pub line: Option<usize>,
    pub end_line: Option<usize>,
    pub defined_by: Option<Fqs>,
    pub metadata: NodeMetadata,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UsageEdge {
    pub from: Fqs,
    pub to: Fqs,
    pub file: PathBuf,
    pub line: usize,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileRecord {
    pub symbols: Vec<Fqs>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SymbolGraph {
    pub nodes: HashMap<Fqs, SymbolNode>,
    pub edges: Vec<UsageEdge>,
    pub files: HashMap<PathBuf, FileRecord>,
}

impl SymbolGraph {
    /// Every node flagged as a test, whether it's a `deftest`-style var
    /// (`kind=Var`, `metadata.is_test=true`) or a macro-call synthesized
    /// node (`kind=Test`). `kind` alone is not enough to answer "is this a
    /// test" — it only distinguishes source-level definitions from
    /// synthesized ones.
    pub fn test_nodes(&self) -> impl Iterator<Item = &SymbolNode> {
        self.nodes.values().filter(|n| n.metadata.is_test)
    }

    pub fn node(&self, symbol: &Fqs) -> Option<&SymbolNode> {
        self.nodes.get(symbol)
    }
}

/// Which test-declaring macros are handled which way: `definitions`
/// macros are expected to also emit a definition fact (rule 1 in
/// SPEC_FULL.md §4.2 already picks them up via `defined_by`/`is_test`);
/// `calls` macros take a string test-name literal as their first argument
/// and produce no definition fact of their own, so the builder must scan
/// the source to synthesize a node (rule 3).
#[derive(Clone, Debug)]
pub struct GraphBuilderConfig {
    pub primary_dialect: String,
    pub excluded_extension: String,
    pub definition_test_macros: HashSet<Fqs>,
    pub call_test_macros: HashSet<Fqs>,
}

impl Default for GraphBuilderConfig {
    fn default() -> Self {
        Self {
            primary_dialect: "clj".to_string(),
            excluded_extension: "cljs".to_string(),
            definition_test_macros: HashSet::from([Fqs::new("clojure.test", "deftest")]),
            call_test_macros: HashSet::from([Fqs::new("speclj.core", "it")]),
        }
    }
}

/// Deterministic mangling rule for macro-declared test names (§6): given
/// the enclosing namespace and the literal test name, produces a stable
/// synthetic FQS.
pub fn mangle_test_name(namespace: &str, literal: &str) -> Fqs {
    let re = Regex::new(r"[^A-Za-z0-9_\-!#$%&*<>:?|]").expect("static regex");
    let mangled = re.replace_all(literal, "-");
    Fqs::new(namespace, format!("__{mangled}__"))
}

/// A macro-declared test call found by scanning source text.
struct MacroTestCall {
    macro_fqs: Fqs,
    name_literal: String,
    start_line: usize,
    end_line: usize,
}

fn byte_offset_of_line(contents: &str, line: usize) -> usize {
    let mut offset = 0;
    for (i, l) in contents.split('\n').enumerate() {
        if i + 1 == line {
            return offset;
        }
        offset += l.len() + 1;
    }
    contents.len()
}

fn char_line_starts(chars: &[char]) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, c) in chars.iter().enumerate() {
        if *c == '\n' {
            starts.push(i + 1);
        }
    }
    starts
}

fn line_of_char(line_starts: &[usize], idx: usize) -> usize {
    line_starts.partition_point(|&s| s <= idx)
}

fn read_string_literal_content(chars: &[char], quote_idx: usize) -> (String, usize) {
    let end = string_literal_end(chars, quote_idx);
    let inner_end = end.saturating_sub(1).max(quote_idx + 1).min(chars.len());
    let inner = &chars[(quote_idx + 1).min(inner_end)..inner_end];
    let mut s = String::new();
    let mut i = 0;
    while i < inner.len() {
        if inner[i] == '\\' && i + 1 < inner.len() {
            s.push(inner[i + 1]);
            i += 2;
        } else {
            s.push(inner[i]);
            i += 1;
        }
    }
    (s, end)
}

/// Scans `contents` for calls to the macros named in `usages` (each paired
/// with the 1-indexed line its usage fact reports), extracting the test
/// name string literal and the call's full line extent. A call that
/// doesn't fit the expected `(macro "name" ...)` shape (e.g. no string
/// literal where one is expected) is skipped — isolated per call, per §4.2
/// "Failure".
fn scan_file_macro_tests(contents: &str, usages: &[(usize, Fqs)]) -> Vec<MacroTestCall> {
    let chars: Vec<char> = contents.chars().collect();
    let char_offsets: Vec<usize> = contents.char_indices().map(|(b, _)| b).collect();
    let line_starts = char_line_starts(&chars);

    let mut out = Vec::new();
    for (line, macro_fqs) in usages {
        let bare = macro_fqs.name();
        let pattern = format!(r"\(\s*(?:[A-Za-z0-9_.\-]+/)?{}\b", regex::escape(bare));
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        let byte_start = byte_offset_of_line(contents, *line);
        let Some(m) = re.find_at(contents, byte_start) else {
            continue;
        };
        let Ok(open_char) = char_offsets.binary_search(&m.start()) else {
            continue;
        };
        let name_end_char = char_offsets.binary_search(&m.end()).unwrap_or(open_char);

        let after_ws = skip_ws(&chars, name_end_char);
        if after_ws >= chars.len() || chars[after_ws] != '"' {
            continue;
        }
        let (name_literal, _) = read_string_literal_content(&chars, after_ws);

        let close_char = matching_close(&chars, open_char);
        let start_line = line_of_char(&line_starts, open_char);
        let end_line = line_of_char(&line_starts, close_char.saturating_sub(1).max(open_char));

        out.push(MacroTestCall {
            macro_fqs: macro_fqs.clone(),
            name_literal,
            start_line,
            end_line,
        });
    }
    out
}

fn is_integration_namespace(namespace: &str) -> bool {
    namespace.contains(".integration.")
}

/// Builds a symbol graph from filtered analyzer facts. Facts are stably
/// sorted before processing so iteration order never affects the emitted
/// graph's observable nodes/edges/files.
pub fn build(facts: Facts, config: &GraphBuilderConfig) -> SymbolGraph {
    let filter = DialectFilter {
        primary_dialect: &config.primary_dialect,
        excluded_extension: &config.excluded_extension,
    };
    let facts = filter.apply(facts);

    let mut definitions = facts.definitions;
    definitions.sort_by(|a, b| (&a.file, a.start_line, a.symbol().to_string()).cmp(&(&b.file, b.start_line, b.symbol().to_string())));

    let mut namespaces = facts.namespaces;
    namespaces.sort_by(|a, b| (&a.file, a.start_line, a.namespace.clone()).cmp(&(&b.file, b.start_line, b.namespace.clone())));

    let mut usages = facts.usages;
    usages.sort_by(|a, b| (&a.file, a.line, a.target().to_string()).cmp(&(&b.file, b.line, b.target().to_string())));

    let mut nodes: HashMap<Fqs, SymbolNode> = HashMap::new();

    for ns in &namespaces {
        nodes.insert(
            ns.symbol(),
            namespace_node(ns),
        );
    }
    for def in &definitions {
        nodes.insert(def.symbol(), var_node(def, config));
    }

    // Macro-test synthesis (rule 3): group qualifying usages by file, scan
    // each file once, synthesize one node per call.
    let mut by_file: HashMap<&PathBuf, Vec<&UsageFact>> = HashMap::new();
    for usage in &usages {
        if config.call_test_macros.contains(&usage.target()) {
            by_file.entry(&usage.file).or_default().push(usage);
        }
    }
    // macro_ranges[file] = [(start_line, end_line, synthesized_fqs)], used
    // below to resolve edges whose usage falls inside a macro-test body.
    let mut macro_ranges: HashMap<PathBuf, Vec<(usize, usize, Fqs)>> = HashMap::new();

    for (file, file_usages) in by_file {
        let Ok(contents) = std::fs::read_to_string(file) else {
            continue; // kind 4: unreadable file during macro-test scanning
        };
        let scan_input: Vec<(usize, Fqs)> = file_usages
            .iter()
            .map(|u| (u.line, u.target()))
            .collect();
        for call in scan_file_macro_tests(&contents, &scan_input) {
            // Find the usage fact that produced this call, to inherit its
            // enclosing namespace and metadata.
            let Some(usage) = file_usages
                .iter()
                .find(|u| u.line == call.start_line || (u.line >= call.start_line && u.line <= call.end_line))
            else {
                continue;
            };
            let synthesized = mangle_test_name(&usage.from_namespace, &call.name_literal);
            let mut metadata = NodeMetadata {
                is_test: true,
                test_name: Some(call.name_literal.clone()),
                ..Default::default()
            };
            metadata.is_integration =
                is_integration_namespace(&usage.from_namespace) || usage.metadata.integration;
            metadata.test_targets = usage
                .metadata
                .test_targets
                .clone()
                .map(|t| t.into_set());

            nodes.insert(
                synthesized.clone(),
                SymbolNode {
                    symbol: synthesized.clone(),
                    kind: NodeKind::Test,
                    file: file.clone(),
                    line: Some(call.start_line),
                    end_line: Some(call.end_line),
                    defined_by: Some(call.macro_fqs.clone()),
                    metadata,
                },
            );
            macro_ranges
                .entry(file.clone())
                .or_default()
                .push((call.start_line, call.end_line, synthesized));
        }
    }

    let mut edges = Vec::with_capacity(usages.len());
    for usage in &usages {
        let from = if let Some(enclosing) = usage.enclosing_symbol() {
            enclosing
        } else if let Some(ranges) = macro_ranges.get(&usage.file) {
            match ranges
                .iter()
                .find(|(start, end, _)| usage.line >= *start && usage.line <= *end)
            {
                Some((_, _, test_fqs)) => test_fqs.clone(),
                None => Fqs::namespace(usage.from_namespace.clone()),
            }
        } else {
            Fqs::namespace(usage.from_namespace.clone())
        };
        edges.push(UsageEdge {
            from,
            to: usage.target(),
            file: usage.file.clone(),
            line: usage.line,
        });
    }
    // Drop edges whose endpoints aren't known nodes (forward references
    // are legal during construction, but a genuinely unknown target or
    // source is dropped rather than inventing a node for it — §4.2 rule 6,
    // I3).
    edges.retain(|e| nodes.contains_key(&e.from) && nodes.contains_key(&e.to));

    let mut files: HashMap<PathBuf, FileRecord> = HashMap::new();
    let mut file_order: Vec<&PathBuf> = nodes.values().map(|n| &n.file).collect();
    file_order.sort();
    file_order.dedup();
    for file in file_order {
        let mut symbols: Vec<Fqs> = nodes
            .values()
            .filter(|n| &n.file == file)
            .map(|n| n.symbol.clone())
            .collect();
        symbols.sort();
        files.insert(file.clone(), FileRecord { symbols });
    }

    SymbolGraph {
        nodes,
        edges,
        files,
    }
}

fn namespace_node(ns: &NamespaceDefinitionFact) -> SymbolNode {
    SymbolNode {
        symbol: ns.symbol(),
        kind: NodeKind::Namespace,
        file: ns.file.clone(),
        line: Some(ns.start_line),
        end_line: Some(ns.end_line),
        defined_by: None,
        metadata: NodeMetadata {
            is_integration: is_integration_namespace(&ns.namespace) || ns.metadata.integration,
            private: ns.metadata.private,
            deprecated: ns.metadata.deprecated,
            ..Default::default()
        },
    }
}

fn var_node(def: &VarDefinitionFact, config: &GraphBuilderConfig) -> SymbolNode {
    let defined_by_is_test_macro = def
        .metadata
        .defined_by
        .as_ref()
        .is_some_and(|m| config.definition_test_macros.contains(m));
    let has_test_targets = def.metadata.test_targets.is_some();
    let is_test = def.metadata.is_test || defined_by_is_test_macro || has_test_targets;

    let mut metadata = NodeMetadata {
        is_test,
        private: def.metadata.private,
        is_macro: def.metadata.is_macro,
        deprecated: def.metadata.deprecated,
        ..Default::default()
    };
    if is_test {
        metadata.is_integration =
            is_integration_namespace(&def.namespace) || def.metadata.integration;
        metadata.test_targets = def.metadata.test_targets.clone().map(|t| t.into_set());
    }

    SymbolNode {
        symbol: def.symbol(),
        kind: NodeKind::Var,
        file: def.file.clone(),
        line: Some(def.start_line),
        end_line: Some(def.end_line),
        defined_by: def.metadata.defined_by.clone(),
        metadata,
    }
}
