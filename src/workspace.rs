//! File-system navigation
//!
//! `WorkspaceNavigator` answers definition lookups for documents on disk
//! without a language server. Documents are file paths. One lookup moves a
//! single step: a local reference to its declaration, an import to the
//! exporting module, or a re-export to the module it forwards from. The
//! chasing oracle strings the steps together.
//!
//! Module specifiers resolve when they are relative (`./x`, `../x`) or match
//! a configured alias prefix (`@/` → `src/`). Bare package names are not
//! followed. Extensions and `index.*` files are probed in order.

use crate::correlate::{Location, NavigationProvider, Relation};
use crate::extract::names::{declaration_sites, export_anchors, import_bindings, re_exports};
use crate::extract::{
    definitions::definitions_in_tree, is_supported_path, parse_source, ActionDefinitionSpan,
    ImportBinding, ImportedSymbol, ReExport, SourceDialect,
};
use crate::range::OffsetRange;
use crate::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tree_sitter::Tree;

/// Extensions tried, in order, for extensionless specifiers
pub const MODULE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "mts", "cts"];

/// Nesting limit for `export *` lookups
const MAX_STAR_DEPTH: usize = 4;

/// What one module declares, imports and exports
#[derive(Debug, Default)]
struct ModuleFacts {
    source: String,
    /// Kept for identifier lookups; `None` when the grammar failed to load
    tree: Option<Tree>,
    definitions: Vec<ActionDefinitionSpan>,
    bindings: Vec<ImportBinding>,
    re_exports: Vec<ReExport>,
    sites: HashMap<String, OffsetRange>,
    exports: HashMap<String, OffsetRange>,
}

impl ModuleFacts {
    fn from_source(source: String, dialect: SourceDialect) -> Self {
        let tree = match parse_source(&source, dialect) {
            Ok(tree) => tree,
            Err(e) => {
                tracing::debug!("Navigation facts unavailable: {}", e);
                return Self { source, ..Self::default() };
            }
        };
        Self {
            definitions: definitions_in_tree(&tree, &source),
            bindings: import_bindings(&tree, &source),
            re_exports: re_exports(&tree, &source),
            sites: declaration_sites(&tree, &source),
            exports: export_anchors(&tree, &source),
            tree: Some(tree),
            source,
        }
    }

    fn binding(&self, local: &str) -> Option<&ImportBinding> {
        self.bindings.iter().find(|b| b.local == local)
    }

    /// The identifier touching `offset`, looking one byte back so a probe
    /// at the end of a name still finds it
    fn reference_at(&self, offset: usize) -> Option<Reference> {
        let root = self.tree.as_ref()?.root_node();

        let mut probes = vec![offset];
        if offset > 0 {
            probes.push(offset - 1);
        }
        for probe in probes {
            let Some(node) = root.descendant_for_byte_range(probe, probe) else {
                continue;
            };
            let text = || self.source.get(node.byte_range()).unwrap_or_default().to_string();
            match node.kind() {
                "identifier" | "shorthand_property_identifier" | "type_identifier" => {
                    return Some(Reference::Plain(text()));
                }
                "property_identifier" => {
                    let object = node
                        .parent()
                        .filter(|p| p.kind() == "member_expression")
                        .and_then(|p| p.child_by_field_name("object"));
                    let Some(object) = object else {
                        return Some(Reference::Plain(text()));
                    };
                    let qualifier = (object.kind() == "identifier")
                        .then(|| self.source.get(object.byte_range()).unwrap_or_default().to_string());
                    return Some(Reference::Member {
                        qualifier,
                        property: text(),
                    });
                }
                _ => {}
            }
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Reference {
    Plain(String),
    /// `object.property`; `qualifier` is `None` unless the object is a bare identifier
    Member {
        qualifier: Option<String>,
        property: String,
    },
}

/// Navigation over source files under one root
pub struct WorkspaceNavigator {
    root: PathBuf,
    aliases: BTreeMap<String, String>,
    modules: Mutex<HashMap<PathBuf, Arc<ModuleFacts>>>,
}

impl WorkspaceNavigator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            aliases: BTreeMap::new(),
            modules: Mutex::new(HashMap::new()),
        }
    }

    /// Specifier prefixes rewritten relative to the root, e.g. `@/` → `src/`
    pub fn with_aliases(mut self, aliases: BTreeMap<String, String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of modules read so far
    pub fn cached_modules(&self) -> usize {
        self.modules.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Resolve an import specifier as written in `from`
    pub fn resolve_module(&self, from: &Path, specifier: &str) -> Option<PathBuf> {
        let base = if specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." {
            from.parent()?.join(specifier)
        } else {
            // Longest alias wins
            let (prefix, target) = self
                .aliases
                .iter()
                .filter(|(prefix, _)| specifier.starts_with(prefix.as_str()))
                .max_by_key(|(prefix, _)| prefix.len())?;
            self.root.join(target).join(&specifier[prefix.len()..])
        };
        probe_module(&normalize(&base))
    }

    async fn facts(&self, path: &Path) -> Result<Arc<ModuleFacts>> {
        let cached = self.modules.lock().ok().and_then(|m| m.get(path).cloned());
        if let Some(facts) = cached {
            return Ok(facts);
        }

        let source = tokio::fs::read_to_string(path).await?;
        let facts = Arc::new(ModuleFacts::from_source(source, SourceDialect::from_path(path)));
        if let Ok(mut modules) = self.modules.lock() {
            modules.insert(path.to_path_buf(), facts.clone());
        }
        Ok(facts)
    }

    /// Where `module` defines what it exports as `name`
    async fn find_export(&self, module: &Path, name: &str) -> Result<Vec<Location>> {
        let mut pending = vec![(module.to_path_buf(), 0usize)];
        let mut found = Vec::new();

        while let Some((module, depth)) = pending.pop() {
            let facts = match self.facts(&module).await {
                Ok(facts) => facts,
                Err(e) => {
                    tracing::debug!("Cannot read {}: {}", module.display(), e);
                    continue;
                }
            };
            if let Some(anchor) = facts.exports.get(name) {
                found.push(Location::new(document_of(&module), anchor.start));
                continue;
            }
            if name == "default" || depth >= MAX_STAR_DEPTH {
                continue;
            }
            for forward in &facts.re_exports {
                if let ReExport::All { specifier } = forward {
                    if let Some(target) = self.resolve_module(&module, specifier) {
                        pending.push((target, depth + 1));
                    }
                }
            }
        }

        Ok(found)
    }

    /// Follow an import (or forwarded export) of `symbol` from `specifier`
    async fn follow(&self, from: &Path, specifier: &str, symbol: &ImportedSymbol) -> Result<Vec<Location>> {
        let Some(module) = self.resolve_module(from, specifier) else {
            tracing::debug!("Unresolved module {} from {}", specifier, from.display());
            return Ok(Vec::new());
        };
        match symbol {
            ImportedSymbol::Default => self.find_export(&module, "default").await,
            ImportedSymbol::Named(name) => self.find_export(&module, name).await,
            ImportedSymbol::Namespace => Ok(Vec::new()),
        }
    }

    async fn definition(&self, location: &Location) -> Result<Vec<Location>> {
        let path = PathBuf::from(&location.document);
        let facts = self.facts(&path).await?;
        let offset = location.offset;

        for forward in &facts.re_exports {
            if let ReExport::Named { imported, specifier, range, .. } = forward {
                if range.contains(offset) {
                    return self.follow(&path, specifier, &imported_symbol(imported)).await;
                }
            }
        }

        match facts.reference_at(offset) {
            Some(Reference::Plain(name)) => {
                if let Some(binding) = facts.binding(&name) {
                    return self.follow(&path, &binding.specifier, &binding.imported).await;
                }
                Ok(facts
                    .sites
                    .get(&name)
                    .filter(|site| !site.contains(offset))
                    .map(|site| vec![Location::new(location.document.clone(), site.start)])
                    .unwrap_or_default())
            }
            Some(Reference::Member {
                qualifier: Some(qualifier),
                property,
            }) => match facts.binding(&qualifier) {
                Some(binding) if binding.imported == ImportedSymbol::Namespace => {
                    let Some(module) = self.resolve_module(&path, &binding.specifier) else {
                        return Ok(Vec::new());
                    };
                    self.find_export(&module, &property).await
                }
                _ => Ok(Vec::new()),
            },
            Some(Reference::Member { qualifier: None, .. }) | None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl NavigationProvider for WorkspaceNavigator {
    async fn locate(&self, relation: Relation, location: &Location) -> Result<Vec<Location>> {
        match relation {
            Relation::Definition => self.definition(location).await,
            // Type and implementation links need a type checker
            Relation::TypeDefinition | Relation::Implementation => Ok(Vec::new()),
        }
    }

    async fn action_definitions(&self, document: &str) -> Result<Vec<ActionDefinitionSpan>> {
        Ok(self.facts(Path::new(document)).await?.definitions.clone())
    }
}

/// Document identifier used for a path
pub fn document_of(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn imported_symbol(name: &str) -> ImportedSymbol {
    match name {
        "default" => ImportedSymbol::Default,
        other => ImportedSymbol::Named(other.to_string()),
    }
}

/// Try `base` itself, `base.<ext>` and `base/index.<ext>`. A specifier
/// written with a `.js` family extension also matches its `.ts` sibling.
fn probe_module(base: &Path) -> Option<PathBuf> {
    if base.is_file() && is_supported_path(base) {
        return Some(base.to_path_buf());
    }

    let has_module_extension = base
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| MODULE_EXTENSIONS.contains(&e));
    let stem = if has_module_extension {
        base.with_extension("")
    } else {
        base.to_path_buf()
    };

    let with_extension = MODULE_EXTENSIONS.iter().map(|ext| {
        let mut candidate = stem.clone().into_os_string();
        candidate.push(".");
        candidate.push(ext);
        PathBuf::from(candidate)
    });
    let index = MODULE_EXTENSIONS
        .iter()
        .map(|ext| stem.join(format!("index.{}", ext)));

    with_extension.chain(index).find(|candidate| candidate.is_file())
}

/// Lexically remove `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}
