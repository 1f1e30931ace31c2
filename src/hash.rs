//! Content-addressed fingerprints for symbol definitions (C3).
//!
//! Maps `(file, start_line, end_line)` to a 64-hex-character SHA-256 of a
//! *normalized* source fragment: docstrings are stripped and whitespace is
//! collapsed, so cosmetic edits never change the hash, while any other
//! textual change does.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::graph::SymbolGraph;
use crate::lexer::{matching_close, read_token_end, skip_ws, string_literal_end};
use crate::symbol::Fqs;

/// A fragment's hash, or `Absent` when extraction/normalization failed.
/// Never an error: per §4.3/§7, a missing hash biases the selector toward
/// over-selection, it is never propagated as a failure.
pub type HashResult = Option<String>;

/// Extracts the lines `[start_line, end_line]` (1-indexed, inclusive) from
/// an already-split file, or `None` if the range is out of bounds.
fn extract<'a>(lines: &'a [&'a str], start_line: usize, end_line: usize) -> Option<&'a [&'a str]> {
    if start_line == 0 || start_line > end_line || end_line > lines.len() {
        return None;
    }
    Some(&lines[start_line - 1..end_line])
}

/// Strips docstrings from a definition fragment per the normative algorithm
/// in SPEC_FULL.md §4.3 step 2: whenever `(` is followed by an identifier
/// starting with `def`, look past the name token (and an optional arg
/// vector) for a string literal and elide it.
fn strip_docstrings(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '"' {
            let end = string_literal_end(&chars, i);
            out.extend(&chars[i..end]);
            i = end;
            continue;
        }
        if c == '(' {
            out.push(c);
            i += 1;
            if let Some(next_i) = try_strip_def_form(&chars, i, &mut out) {
                i = next_i;
                continue;
            }
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Called right after an opening `(` has already been copied to `out` and
/// `i` points just past it. If what follows is a `def*` identifier, copies
/// through the name (and arg vector, if present) and elides a following
/// docstring, returning the new scan position. Returns `None` (doing
/// nothing) if the next token isn't a `def*` identifier, leaving the caller
/// to fall through to the normal char-by-char copy.
fn try_strip_def_form(chars: &[char], i: usize, out: &mut String) -> Option<usize> {
    let ident_start = skip_ws(chars, i);
    let ident_end = read_token_end(chars, ident_start);
    if ident_end == ident_start {
        return None;
    }
    let ident: String = chars[ident_start..ident_end].iter().collect();
    if !ident.starts_with("def") {
        return None;
    }
    // Definition head: whitespace + identifier.
    out.extend(&chars[i..ident_end]);
    let mut pos = ident_end;

    // Name token.
    let ws_start = pos;
    let name_start = skip_ws(chars, pos);
    let name_end = read_token_end(chars, name_start);
    out.extend(&chars[ws_start..name_end]);
    pos = name_end;

    // Whitespace after the name.
    let ws2_start = pos;
    pos = skip_ws(chars, pos);
    out.extend(&chars[ws2_start..pos]);

    if pos < chars.len() && chars[pos] == '"' {
        // Docstring directly after the name: elide it.
        pos = string_literal_end(chars, pos);
    } else if pos < chars.len() && chars[pos] == '[' {
        let vec_end = matching_close(chars, pos);
        out.extend(&chars[pos..vec_end]);
        pos = vec_end;
        let ws3_start = pos;
        pos = skip_ws(chars, pos);
        out.extend(&chars[ws3_start..pos]);
        if pos < chars.len() && chars[pos] == '"' {
            pos = string_literal_end(chars, pos);
        }
    }
    Some(pos)
}

/// Collapses any maximal run of whitespace to a single space and trims the
/// ends (step 3).
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_ws = false;
    for c in text.chars() {
        if c.is_whitespace() {
            in_ws = true;
        } else {
            if in_ws && !out.is_empty() {
                out.push(' ');
            }
            in_ws = false;
            out.push(c);
        }
    }
    out
}

/// The full normalization pipeline: extract, strip docstrings, collapse
/// whitespace.
pub fn normalize(lines: &[&str], start_line: usize, end_line: usize) -> Option<String> {
    let fragment = extract(lines, start_line, end_line)?;
    let joined = fragment.join("\n");
    let stripped = strip_docstrings(&joined);
    Some(collapse_whitespace(&stripped))
}

/// SHA-256 over the UTF-8 bytes of `normalized`, hex-encoded lowercase.
pub fn hash_normalized(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hashes a single fragment given an already-split file.
pub fn hash_fragment(lines: &[&str], start_line: usize, end_line: usize) -> HashResult {
    normalize(lines, start_line, end_line).map(|n| hash_normalized(&n))
}

/// Reads a file and splits it into lines, or returns `None` if it can't be
/// read (kind 3: unreadable file during hashing).
fn read_lines(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok()
}

/// Bulk-hashes every symbol in `graph` defined in `file`, given each
/// symbol's `(start_line, end_line)`. The file is read once and the lines
/// reused for every symbol. Returns an empty map if the file is unreadable.
pub fn hash_file(file: &Path, symbols: &[(Fqs, usize, usize)]) -> HashMap<Fqs, String> {
    let Some(contents) = read_lines(file) else {
        return HashMap::new();
    };
    let lines: Vec<&str> = contents.lines().collect();
    symbols
        .iter()
        .filter_map(|(sym, start, end)| {
            hash_fragment(&lines, *start, *end).map(|h| (sym.clone(), h))
        })
        .collect()
}

/// Hashes every hashable symbol in the graph (any node with a
/// `line`/`end_line`, including namespace nodes), grouping by file and
/// parallelizing across files. Independent files' contributions are merged
/// into a single map; this merge is commutative, so completion order never
/// affects the result.
pub fn hash_all(graph: &SymbolGraph) -> HashMap<Fqs, String> {
    let by_file = group_hashable_by_file(graph);
    by_file
        .into_par_iter()
        .map(|(file, symbols)| hash_file(&file, &symbols))
        .reduce(HashMap::new, |mut acc, part| {
            acc.extend(part);
            acc
        })
}

/// Hashes only the symbols defined in `files`, recomputed from current
/// on-disk content. Used by the incremental patch path (C7).
pub fn rehash_subset(graph: &SymbolGraph, files: &std::collections::HashSet<PathBuf>) -> HashMap<Fqs, String> {
    let by_file = group_hashable_by_file(graph);
    by_file
        .into_par_iter()
        .filter(|(file, _)| files.contains(file))
        .map(|(file, symbols)| hash_file(&file, &symbols))
        .reduce(HashMap::new, |mut acc, part| {
            acc.extend(part);
            acc
        })
}

fn group_hashable_by_file(graph: &SymbolGraph) -> HashMap<PathBuf, Vec<(Fqs, usize, usize)>> {
    let mut by_file: HashMap<PathBuf, Vec<(Fqs, usize, usize)>> = HashMap::new();
    for node in graph.nodes.values() {
        if let (Some(start), Some(end)) = (node.line, node.end_line) {
            by_file
                .entry(node.file.clone())
                .or_default()
                .push((node.symbol.clone(), start, end));
        }
    }
    by_file
}
