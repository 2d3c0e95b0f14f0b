//! Parser front-end
//!
//! Maps file identifiers to a tree-sitter grammar and produces syntax trees.
//! The TSX grammar is a superset of the others for every construct the
//! extractors inspect, so it is the default for unknown extensions.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tree_sitter::{Language, Parser, Tree};

/// Source dialect, one per supported grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceDialect {
    #[default]
    Tsx,
    TypeScript,
    JavaScript,
}

impl SourceDialect {
    /// Dialect for a known extension, `None` for anything else
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "tsx" => Some(SourceDialect::Tsx),
            "ts" | "mts" | "cts" => Some(SourceDialect::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(SourceDialect::JavaScript),
            _ => None,
        }
    }

    /// Pick a dialect for a file path or URI, falling back to TSX
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceDialect::Tsx => "tsx",
            SourceDialect::TypeScript => "typescript",
            SourceDialect::JavaScript => "javascript",
        }
    }

    /// The tree-sitter grammar for this dialect
    pub fn language(&self) -> Language {
        match self {
            SourceDialect::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            SourceDialect::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            SourceDialect::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        }
    }
}

impl std::fmt::Display for SourceDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether the extractors understand files with this path's extension
pub fn is_supported_path(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .and_then(SourceDialect::from_extension)
        .is_some()
}

/// Parse `source` with the grammar for `dialect`.
///
/// Syntax errors do not fail the parse; tree-sitter recovers and marks them
/// with ERROR nodes. Only a grammar mismatch or an aborted parse is an error.
pub fn parse_source(source: &str, dialect: SourceDialect) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&dialect.language())
        .map_err(|e| Error::Language(format!("Failed to set language {}: {}", dialect, e)))?;

    parser
        .parse(source, None)
        .ok_or_else(|| Error::Parse(format!("Failed to parse {} source", dialect)))
}
