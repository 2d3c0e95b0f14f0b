//! # actionlens - Server action call-site correlation
//!
//! Finds the functions a source file marks as server actions (async functions
//! under a `"use server"` directive) and the call sites that genuinely reach
//! one, possibly across files.
//!
//! actionlens provides:
//! - Tree-sitter based extractors for action definitions, call candidates and
//!   the import/declaration name sets used to pre-filter them
//! - A correlator that filters, orders and verifies candidates against an
//!   external resolution oracle under concurrency, time and count budgets
//! - A bounded multi-hop oracle and a file-system navigator for offline use
//! - Regex based file exclusion and TOML configuration

pub mod range;
pub mod extract;
pub mod correlate;
pub mod workspace;
pub mod exclude;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use range::{LineIndex, OffsetRange};
pub use extract::{
    ActionDefinitionSpan, CallCandidate, CandidateKind, DefinitionName, FileExtraction, NameSets,
    SourceDialect,
};
pub use correlate::{
    correlate, correlate_extracted, CorrelationResult, PassStats, ResolutionOracle,
    ResolutionOutcome, RuntimeControls, ResolutionBounds,
};

/// Result type alias for actionlens operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for actionlens operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Language error: {0}")]
    Language(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Oracle error: {0}")]
    Oracle(String),
}
