//! Structured errors for the operations the core is not allowed to recover
//! from silently (kinds 5-6 in the error handling design: analyzer failure
//! and programming errors). Everything else — unreadable files, corrupt
//! caches, missing snapshots — is recovered locally and never surfaces as
//! an `EngineError`; see the module docs on `hash`, `cache`, and `graph`.

use crate::symbol::Fqs;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The external analyzer did not produce a facts object. Carries the
    /// analyzer's own error detail verbatim.
    #[error("analyzer failed: {0}")]
    AnalyzerFailed(String),

    /// `mark_verified` was called with a test name that isn't a test node
    /// in the graph the selection was produced from.
    #[error("{0} is not a test in this graph")]
    UnknownTest(Fqs),

    /// `mark_verified` was called with a non-test FQS in the explicit list.
    #[error("{0} is not a test")]
    NotATest(Fqs),
}
