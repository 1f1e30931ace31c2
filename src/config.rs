//! Engine configuration (C8): the handful of knobs that change how facts
//! are filtered and how macro-declared tests are recognized. Loaded from a
//! TOML file the way the teacher's test-runner config was, down to the
//! `deny_unknown_fields` + doc-comment-as-description convention.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::symbol::Fqs;

/// A macro identified by its fully-qualified name, as it would appear as a
/// usage target (e.g. `clojure.test/deftest`).
#[derive(Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(try_from = "String")]
pub struct MacroName(pub Fqs);

impl TryFrom<String> for MacroName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .parse()
            .map(MacroName)
            .map_err(|e: crate::symbol::FqsParseError| e.to_string())
    }
}

#[derive(Deserialize, JsonSchema, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The dialect facts must declare (or omit) to be kept; facts tagged
    /// with any other dialect are dropped.
    #[serde(default = "default_primary_dialect")]
    pub primary_dialect: String,

    /// A file extension that's always excluded, even for untagged facts
    /// (e.g. a ClojureScript-only source file with no dialect tag).
    #[serde(default = "default_excluded_extension")]
    pub excluded_extension: String,

    /// Macros that, like `clojure.test/deftest`, define a var and whose
    /// definition fact is expected to already carry `is_test`/`defined_by`.
    /// Listed here only so the builder can double-check `defined_by`
    /// against a known set rather than trusting the analyzer blindly.
    #[serde(default = "default_definition_test_macros")]
    pub definition_test_macros: HashSet<MacroName>,

    /// Macros that, like `speclj.core/it`, take a string test-name literal
    /// as their first argument and define no var of their own — the
    /// builder scans source for calls to these to synthesize test nodes.
    #[serde(default = "default_call_test_macros")]
    pub call_test_macros: HashSet<MacroName>,

    /// Where the analysis snapshot is stored, relative to the project root.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Where the verified baseline is stored, relative to the project root.
    #[serde(default = "default_baseline_path")]
    pub baseline_path: PathBuf,
}

fn default_primary_dialect() -> String {
    "clj".to_string()
}

fn default_excluded_extension() -> String {
    "cljs".to_string()
}

fn default_definition_test_macros() -> HashSet<MacroName> {
    HashSet::from([MacroName(Fqs::new("clojure.test", "deftest"))])
}

fn default_call_test_macros() -> HashSet<MacroName> {
    HashSet::from([MacroName(Fqs::new("speclj.core", "it"))])
}

fn default_snapshot_path() -> PathBuf {
    crate::cache::AnalysisSnapshotCache::default_path()
}

fn default_baseline_path() -> PathBuf {
    crate::cache::VerifiedBaselineCache::default_path()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primary_dialect: default_primary_dialect(),
            excluded_extension: default_excluded_extension(),
            definition_test_macros: default_definition_test_macros(),
            call_test_macros: default_call_test_macros(),
            snapshot_path: default_snapshot_path(),
            baseline_path: default_baseline_path(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn graph_builder_config(&self) -> crate::graph::GraphBuilderConfig {
        crate::graph::GraphBuilderConfig {
            primary_dialect: self.primary_dialect.clone(),
            excluded_extension: self.excluded_extension.clone(),
            definition_test_macros: self
                .definition_test_macros
                .iter()
                .map(|m| m.0.clone())
                .collect(),
            call_test_macros: self.call_test_macros.iter().map(|m| m.0.clone()).collect(),
        }
    }
}
