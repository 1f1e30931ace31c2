//! Typed representation of analyzer output: definitions, usages, namespace
//! declarations, and the open metadata map attached to each.
//!
//! The distilled specification describes facts generically as all sharing
//! "declaring namespace, name, file, lines, dialect, enclosing-function,
//! metadata". A *usage* fact actually needs two such pairs — where it
//! occurs, and what it refers to — so this module gives usages their own
//! shape instead of overloading a single namespace/name pair (see
//! SPEC_FULL.md §3).

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::symbol::Fqs;

/// A test-target value before normalization: either a single symbol or a
/// sequence of them (the distilled spec also allows a set, which collapses
/// to the same `Many` representation once parsed). Untagged in the facts
/// file: a bare string is `One`, an array is `Many`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestTargets {
    One(Fqs),
    Many(Vec<Fqs>),
}

impl TestTargets {
    pub fn into_set(self) -> HashSet<Fqs> {
        match self {
            TestTargets::One(f) => HashSet::from([f]),
            TestTargets::Many(v) => v.into_iter().collect(),
        }
    }
}

/// The open metadata map attached to a definition, usage, or namespace
/// fact. Reserved keys are pulled out into typed fields; anything else the
/// analyzer attaches lands in `extra` untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FactMetadata {
    pub is_test: bool,
    pub defined_by: Option<Fqs>,
    pub integration: bool,
    #[serde(alias = "test_target")]
    pub test_targets: Option<TestTargets>,
    pub private: bool,
    pub is_macro: bool,
    pub deprecated: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FactMetadata {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VarDefinitionFact {
    pub namespace: String,
    pub name: String,
    pub file: PathBuf,
    pub start_line: usize,
    pub end_line: usize,
    pub dialect: Option<String>,
    pub metadata: FactMetadata,
}

impl VarDefinitionFact {
    pub fn symbol(&self) -> Fqs {
        Fqs::new(self.namespace.clone(), self.name.clone())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamespaceDefinitionFact {
    pub namespace: String,
    pub file: PathBuf,
    pub start_line: usize,
    pub end_line: usize,
    pub dialect: Option<String>,
    pub metadata: FactMetadata,
}

impl NamespaceDefinitionFact {
    pub fn symbol(&self) -> Fqs {
        Fqs::namespace(self.namespace.clone())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UsageFact {
    /// Namespace in which the usage textually occurs.
    pub from_namespace: String,
    /// Name of the enclosing definition, if the usage is nested inside one.
    /// Absent for a top-level usage (the edge's `from` is then the
    /// namespace itself, or a synthesized macro-test, per the builder).
    pub enclosing_fn: Option<String>,
    /// Namespace of the symbol being used.
    pub to_namespace: String,
    /// Name of the symbol being used.
    pub to_name: String,
    pub file: PathBuf,
    pub line: usize,
    pub dialect: Option<String>,
    pub metadata: FactMetadata,
}

impl UsageFact {
    pub fn target(&self) -> Fqs {
        Fqs::new(self.to_namespace.clone(), self.to_name.clone())
    }

    pub fn enclosing_symbol(&self) -> Option<Fqs> {
        self.enclosing_fn
            .as_ref()
            .map(|name| Fqs::new(self.from_namespace.clone(), name.clone()))
    }
}

/// The three fact streams the external analyzer produces. Represented as
/// plain `Vec`s: the distilled spec's "lazy sequences" are an artifact of
/// the Clojure runtime this was distilled from, not a requirement anything
/// downstream depends on.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Facts {
    pub definitions: Vec<VarDefinitionFact>,
    pub usages: Vec<UsageFact>,
    pub namespaces: Vec<NamespaceDefinitionFact>,
}

/// Dialect filter configuration (single-dialect rule, §4.1).
#[derive(Clone, Debug)]
pub struct DialectFilter<'a> {
    pub primary_dialect: &'a str,
    pub excluded_extension: &'a str,
}

impl DialectFilter<'_> {
    fn retains(&self, dialect: Option<&str>, file: &std::path::Path) -> bool {
        let dialect_ok = match dialect {
            None => true,
            Some(d) => d == self.primary_dialect,
        };
        let ext_ok = file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e != self.excluded_extension)
            .unwrap_or(true);
        dialect_ok && ext_ok
    }

    /// Applies the single-dialect rule uniformly across all three streams.
    /// Facts that don't pass are dropped silently — this never errors.
    pub fn apply(&self, facts: Facts) -> Facts {
        Facts {
            definitions: facts
                .definitions
                .into_iter()
                .filter(|d| self.retains(d.dialect.as_deref(), &d.file))
                .collect(),
            usages: facts
                .usages
                .into_iter()
                .filter(|u| self.retains(u.dialect.as_deref(), &u.file))
                .collect(),
            namespaces: facts
                .namespaces
                .into_iter()
                .filter(|n| self.retains(n.dialect.as_deref(), &n.file))
                .collect(),
        }
    }
}
