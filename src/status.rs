//! CLI-facing presentation for cache status and selection results (used by
//! the `status` and `select` subcommands in `bin/aare.rs`). Simple
//! print-to-writer functions rather than a live tracker — there is no
//! running test output to stream, this engine only ever decides what
//! *would* run.

use std::io::{self, Write};

use colored::Colorize;

use crate::cache::CacheStatus;
use crate::select::{Selection, SelectionReason};
use crate::symbol::Fqs;

pub fn print_cache_status(out: &mut impl Write, status: &CacheStatus) -> io::Result<()> {
    if status.snapshot_present {
        writeln!(
            out,
            "{} analysis snapshot: {} symbols, analyzed {}, {} bytes, modified {}",
            "ok".green(),
            status.snapshot_symbol_count,
            status
                .snapshot_analyzed_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string()),
            format_size(status.snapshot_size_bytes),
            format_mtime(status.snapshot_modified_at)
        )?;
    } else {
        writeln!(out, "{} no analysis snapshot", "--".yellow())?;
    }

    if status.baseline_present {
        writeln!(
            out,
            "{} verified baseline: {} tests, {} bytes, modified {}",
            "ok".green(),
            status.baseline_test_count,
            format_size(status.baseline_size_bytes),
            format_mtime(status.baseline_modified_at)
        )?;
    } else {
        writeln!(out, "{} no verified baseline (next run selects everything)", "--".yellow())?;
    }
    Ok(())
}

pub fn print_selection(out: &mut impl Write, selection: &Selection, total_tests: usize) -> io::Result<()> {
    if selection.all_tests {
        writeln!(out, "{} ({} tests)", "selecting everything".bold(), selection.selected.len())?;
    } else {
        let stats = selection.stats(total_tests);
        writeln!(
            out,
            "{} of {} tests selected ({:.1}%), {} symbols changed",
            stats.selected_tests, stats.total_tests, stats.selection_rate, stats.changed_symbols
        )?;
    }

    let mut tests: Vec<&Fqs> = selection.selected.iter().collect();
    tests.sort();
    for test in tests {
        let reason = selection
            .reason(test)
            .map(describe_reason)
            .unwrap_or_default();
        writeln!(out, "  {} {}", test.to_string().cyan(), reason.dimmed())?;
    }

    if !selection.untested_usages.is_empty() {
        writeln!(out, "{}", "changed symbols with uncovered usages:".yellow())?;
        let mut changed: Vec<&Fqs> = selection.untested_usages.keys().collect();
        changed.sort();
        for sym in changed {
            let mut usages: Vec<&Fqs> = selection.untested_usages[sym].iter().collect();
            usages.sort();
            let usages = usages
                .iter()
                .map(|u| u.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(out, "  {} {} {}", sym.to_string().yellow(), "used by".dimmed(), usages)?;
        }
    }
    Ok(())
}

fn format_size(bytes: Option<u64>) -> String {
    bytes.map(|b| b.to_string()).unwrap_or_else(|| "unknown".to_string())
}

fn format_mtime(modified_at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    modified_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "unknown".to_string())
}

fn describe_reason(reason: &SelectionReason) -> String {
    match reason {
        SelectionReason::NoBaseline => "no verified baseline yet".to_string(),
        SelectionReason::AllTestsRequested => "full suite requested".to_string(),
        SelectionReason::TargetChanged(target) => format!("target {target} changed"),
        SelectionReason::UnselectiveIntegration => "integration test, runs on any change".to_string(),
        SelectionReason::DependencyChanged(dep) => format!("depends on {dep}, which changed"),
        SelectionReason::SelfChanged => "its own definition changed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::Selection;
    use chrono::{DateTime, Utc};
    use std::collections::HashSet;

    #[test]
    fn prints_cache_status_lines() {
        let status = CacheStatus {
            snapshot_present: true,
            snapshot_analyzed_at: Some(
                DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            ),
            snapshot_symbol_count: 3,
            snapshot_size_bytes: Some(512),
            snapshot_modified_at: Some(
                DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            ),
            baseline_present: false,
            baseline_test_count: 0,
            baseline_size_bytes: None,
            baseline_modified_at: None,
        };
        let mut buf = Vec::new();
        print_cache_status(&mut buf, &status).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("3 symbols"));
        assert!(text.contains("512 bytes"));
        assert!(text.contains("no verified baseline"));
    }

    #[test]
    fn prints_selection_with_reasons() {
        let mut selection = Selection {
            selected: HashSet::from([Fqs::new("a", "t1")]),
            ..Default::default()
        };
        selection.insert_reason(Fqs::new("a", "t1"), SelectionReason::SelfChanged);
        let mut buf = Vec::new();
        print_selection(&mut buf, &selection, 4).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("a/t1"));
        assert!(text.contains("of 4 tests selected"));
    }
}
