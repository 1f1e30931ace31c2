//! The external analyzer boundary (C9): the engine never parses source
//! itself to produce facts — that's the analyzer's job, out of scope for
//! this crate. This module only defines the seam and a test double.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::fact::Facts;

/// Ingests facts from a project root. A real implementation would shell out
/// to (or embed) the language tooling that actually walks source files;
/// this crate only consumes whatever it returns.
pub trait Analyzer {
    fn analyze(&self, root: &Path) -> Result<Facts, EngineError>;
}

/// Reads a JSON facts dump produced by an external analyzer. `root` is
/// ignored — the dump is already bound to the project it was produced for.
pub struct FileAnalyzer {
    facts_path: PathBuf,
}

impl FileAnalyzer {
    pub fn new(facts_path: impl Into<PathBuf>) -> Self {
        Self {
            facts_path: facts_path.into(),
        }
    }
}

impl Analyzer for FileAnalyzer {
    fn analyze(&self, _root: &Path) -> Result<Facts, EngineError> {
        let text = fs::read_to_string(&self.facts_path)
            .map_err(|e| EngineError::AnalyzerFailed(format!("reading {}: {e}", self.facts_path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| EngineError::AnalyzerFailed(format!("parsing {}: {e}", self.facts_path.display())))
    }
}

/// A test double that returns a fixed `Facts` value (or a fixed error),
/// regardless of `root`.
pub struct FixedAnalyzer {
    result: Result<Facts, String>,
}

impl FixedAnalyzer {
    pub fn ok(facts: Facts) -> Self {
        Self { result: Ok(facts) }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            result: Err(message.into()),
        }
    }
}

impl Analyzer for FixedAnalyzer {
    fn analyze(&self, _root: &Path) -> Result<Facts, EngineError> {
        self.result
            .clone()
            .map_err(EngineError::AnalyzerFailed)
    }
}
