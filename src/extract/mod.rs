//! Extractors
//!
//! Pure functions of source text: definitions, call candidates and the name
//! sets used to pre-filter candidates. A parse that cannot be produced yields
//! empty results, never an error, because files are routinely half-edited.

pub mod parser;
pub mod syntax;
pub mod definitions;
pub mod calls;
pub mod names;

pub use parser::{is_supported_path, parse_source, SourceDialect};
pub use definitions::{extract_definitions, extract_definitions_in, ActionDefinitionSpan, DefinitionName};
pub use calls::{extract_call_sites, extract_call_sites_in, CallCandidate, Callee, CandidateKind, EntryAttribute};
pub use names::{ImportBinding, ImportedSymbol, NameSets, ReExport};

/// All extraction outputs for one file, produced from a single parse
#[derive(Debug, Clone, Default)]
pub struct FileExtraction {
    pub dialect: SourceDialect,
    pub definitions: Vec<ActionDefinitionSpan>,
    pub candidates: Vec<CallCandidate>,
    pub names: NameSets,
}

impl FileExtraction {
    /// Parse once and run every extractor over the tree
    pub fn from_source(source: &str, dialect: SourceDialect) -> Self {
        let tree = match parse_source(source, dialect) {
            Ok(tree) => tree,
            Err(e) => {
                tracing::debug!("Extraction skipped: {}", e);
                return Self { dialect, ..Self::default() };
            }
        };

        Self {
            dialect,
            definitions: definitions::definitions_in_tree(&tree, source),
            candidates: calls::call_sites_in_tree(&tree, source),
            names: NameSets::collect(&tree, source),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty() && self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_parse_matches_individual_passes() {
        let source = r#""use server";
import { helper } from './helper';
export async function save() { helper(); }
"#;
        let extraction = FileExtraction::from_source(source, SourceDialect::Tsx);
        assert_eq!(extraction.definitions, extract_definitions(source));
        assert_eq!(extraction.candidates, extract_call_sites(source));
        assert!(extraction.names.imported.contains("helper"));
        assert!(extraction.names.local_callables.contains("save"));
    }
}
