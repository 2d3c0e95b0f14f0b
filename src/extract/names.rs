//! Name collectors
//!
//! Three independent passes used to pre-filter call candidates:
//! - `imported_names`: value imports (default + named, alias-aware)
//! - `local_callable_names`: functions and function-holding variables
//! - `namespace_import_names`: `import * as ns` bindings
//!
//! Type-only imports (`import type ...`, `import { type X }`) never count.
//! The import binding table behind the two import passes is also used by the
//! workspace navigator to follow imports across files.

use super::syntax::{
    contains_function_literal, has_token, is_function_declaration, node_text, string_value,
    unwrap_expression, visit, Visit,
};
use crate::range::OffsetRange;
use std::collections::{HashMap, HashSet};
use tree_sitter::{Node, Tree};

/// The three name sets for one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameSets {
    pub imported: HashSet<String>,
    pub local_callables: HashSet<String>,
    pub namespace_imports: HashSet<String>,
}

impl NameSets {
    /// Run all three collectors over a parsed tree
    pub fn collect(tree: &Tree, source: &str) -> Self {
        Self {
            imported: imported_names(tree, source),
            local_callables: local_callable_names(tree, source),
            namespace_imports: namespace_import_names(tree, source),
        }
    }

    /// Whether a plain callee name is known to this file
    pub fn knows_callee(&self, name: &str) -> bool {
        self.imported.contains(name) || self.local_callables.contains(name)
    }
}

/// What an import binding refers to in the source module
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportedSymbol {
    Default,
    Named(String),
    Namespace,
}

/// One local name introduced by an import statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// Local binding name
    pub local: String,
    pub imported: ImportedSymbol,
    /// Module specifier, e.g. `./actions`
    pub specifier: String,
    pub type_only: bool,
    /// Span of the local binding identifier
    pub local_range: OffsetRange,
}

/// `export ... from` forwarding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReExport {
    /// `export { imported as exported } from 'specifier'`
    Named {
        exported: String,
        imported: String,
        specifier: String,
        /// Span of the whole `imported as exported` specifier
        range: OffsetRange,
    },
    /// `export * from 'specifier'`
    All { specifier: String },
}

/// Default-import and named-import local names, excluding type-only and
/// namespace imports
pub fn imported_names(tree: &Tree, source: &str) -> HashSet<String> {
    import_bindings(tree, source)
        .into_iter()
        .filter(|b| !b.type_only && b.imported != ImportedSymbol::Namespace)
        .map(|b| b.local)
        .collect()
}

/// Local binding names of namespace imports, excluding type-only
pub fn namespace_import_names(tree: &Tree, source: &str) -> HashSet<String> {
    import_bindings(tree, source)
        .into_iter()
        .filter(|b| !b.type_only && b.imported == ImportedSymbol::Namespace)
        .map(|b| b.local)
        .collect()
}

/// Names of function declarations and of variables whose initializer is, or
/// contains, a function/arrow literal
pub fn local_callable_names(tree: &Tree, source: &str) -> HashSet<String> {
    let mut names = HashSet::new();
    visit(tree.root_node(), |node| {
        if is_function_declaration(node) {
            if let Some(name) = node.child_by_field_name("name") {
                names.insert(node_text(name, source).to_string());
            }
        } else if node.kind() == "variable_declarator" {
            let name = node.child_by_field_name("name").filter(|n| n.kind() == "identifier");
            let value = node.child_by_field_name("value");
            if let (Some(name), Some(value)) = (name, value) {
                if contains_function_literal(value) {
                    names.insert(node_text(name, source).to_string());
                }
            }
        }
        Visit::Descend
    });
    names
}

/// Every binding introduced by the file's import statements
pub fn import_bindings(tree: &Tree, source: &str) -> Vec<ImportBinding> {
    let root = tree.root_node();
    let mut bindings = Vec::new();
    let mut cursor = root.walk();

    for statement in root.named_children(&mut cursor) {
        if statement.kind() != "import_statement" {
            continue;
        }
        let Some(specifier) = statement.child_by_field_name("source") else {
            continue;
        };
        let specifier = string_value(specifier, source).to_string();
        let statement_type_only = has_token(statement, "type") || has_token(statement, "typeof");

        let mut inner = statement.walk();
        for clause in statement.named_children(&mut inner) {
            if clause.kind() == "import_clause" {
                collect_clause(clause, source, &specifier, statement_type_only, &mut bindings);
            }
        }
    }

    bindings
}

fn collect_clause(
    clause: Node<'_>,
    source: &str,
    specifier: &str,
    type_only: bool,
    bindings: &mut Vec<ImportBinding>,
) {
    let mut binding = |local: Node<'_>, imported: ImportedSymbol, type_only: bool| {
        bindings.push(ImportBinding {
            local: node_text(local, source).to_string(),
            imported,
            specifier: specifier.to_string(),
            type_only,
            local_range: OffsetRange::new(local.start_byte(), local.end_byte()),
        });
    };

    let mut cursor = clause.walk();
    for part in clause.named_children(&mut cursor) {
        match part.kind() {
            "identifier" => binding(part, ImportedSymbol::Default, type_only),
            "namespace_import" => {
                let mut inner = part.walk();
                let local = part.named_children(&mut inner).find(|n| n.kind() == "identifier");
                if let Some(local) = local {
                    binding(local, ImportedSymbol::Namespace, type_only);
                }
            }
            "named_imports" => {
                let mut inner = part.walk();
                for specifier in part.named_children(&mut inner) {
                    if specifier.kind() != "import_specifier" {
                        continue;
                    }
                    let Some(name) = specifier.child_by_field_name("name") else {
                        continue;
                    };
                    let local = specifier.child_by_field_name("alias").unwrap_or(name);
                    let imported = if name.kind() == "string" {
                        string_value(name, source)
                    } else {
                        node_text(name, source)
                    };
                    let imported = match imported {
                        "default" => ImportedSymbol::Default,
                        other => ImportedSymbol::Named(other.to_string()),
                    };
                    let specifier_type_only =
                        type_only || has_token(specifier, "type") || has_token(specifier, "typeof");
                    binding(local, imported, specifier_type_only);
                }
            }
            _ => {}
        }
    }
}

/// `export ... from` statements of the file
pub fn re_exports(tree: &Tree, source: &str) -> Vec<ReExport> {
    let root = tree.root_node();
    let mut forwards = Vec::new();
    let mut cursor = root.walk();

    for statement in root.named_children(&mut cursor) {
        if statement.kind() != "export_statement" {
            continue;
        }
        let Some(specifier) = statement.child_by_field_name("source") else {
            continue;
        };
        let specifier = string_value(specifier, source).to_string();

        let mut inner = statement.walk();
        let clause = statement
            .named_children(&mut inner)
            .find(|n| n.kind() == "export_clause");
        match clause {
            Some(clause) => {
                let mut specifiers = clause.walk();
                for item in clause.named_children(&mut specifiers) {
                    let Some(name) = item.child_by_field_name("name") else {
                        continue;
                    };
                    let imported = node_text(name, source).to_string();
                    let exported = item
                        .child_by_field_name("alias")
                        .map(|alias| node_text(alias, source).to_string())
                        .unwrap_or_else(|| imported.clone());
                    forwards.push(ReExport::Named {
                        exported,
                        imported,
                        specifier: specifier.clone(),
                        range: OffsetRange::new(item.start_byte(), item.end_byte()),
                    });
                }
            }
            // `export * as ns from` nests its `*` in a namespace_export node
            None if has_token(statement, "*") => {
                forwards.push(ReExport::All { specifier });
            }
            None => {}
        }
    }

    forwards
}

/// Names the module exports, each mapped to the span a lookup continues
/// from: the declared identifier, the local name inside an `export { }`
/// clause (with or without `from`), or the default-exported value. For an
/// anonymous default function that is its body. The first export of a name
/// wins; `export *` is not included.
pub fn export_anchors(tree: &Tree, source: &str) -> HashMap<String, OffsetRange> {
    let root = tree.root_node();
    let mut anchors = HashMap::new();
    let mut cursor = root.walk();
    let span = |node: Node<'_>| OffsetRange::new(node.start_byte(), node.end_byte());

    for statement in root.named_children(&mut cursor) {
        if statement.kind() != "export_statement" {
            continue;
        }
        let is_default = has_token(statement, "default");

        if let Some(declaration) = statement.child_by_field_name("declaration") {
            match declaration.kind() {
                "lexical_declaration" | "variable_declaration" => {
                    let mut inner = declaration.walk();
                    for declarator in declaration.named_children(&mut inner) {
                        let name = declarator
                            .child_by_field_name("name")
                            .filter(|n| n.kind() == "identifier");
                        if let Some(name) = name {
                            anchors.entry(node_text(name, source).to_string()).or_insert(span(name));
                        }
                    }
                }
                _ => {
                    let Some(name) = declaration.child_by_field_name("name") else {
                        continue;
                    };
                    let exported = if is_default { "default" } else { node_text(name, source) };
                    anchors.entry(exported.to_string()).or_insert(span(name));
                }
            }
            continue;
        }

        if let Some(value) = statement.child_by_field_name("value") {
            let value = unwrap_expression(value);
            let anchor = value
                .child_by_field_name("name")
                .or_else(|| value.child_by_field_name("body"))
                .unwrap_or(value);
            anchors.entry("default".to_string()).or_insert(span(anchor));
            continue;
        }

        let mut inner = statement.walk();
        let Some(clause) = statement
            .named_children(&mut inner)
            .find(|n| n.kind() == "export_clause")
        else {
            continue;
        };
        let mut specifiers = clause.walk();
        for item in clause.named_children(&mut specifiers) {
            let Some(name) = item.child_by_field_name("name") else {
                continue;
            };
            let exported = item.child_by_field_name("alias").unwrap_or(name);
            anchors
                .entry(node_text(exported, source).to_string())
                .or_insert(span(name));
        }
    }

    anchors
}

/// Identifier spans of module-level declarations (functions, classes,
/// variables), keyed by name. The first declaration of a name wins.
pub fn declaration_sites(tree: &Tree, source: &str) -> HashMap<String, OffsetRange> {
    let root = tree.root_node();
    let mut sites = HashMap::new();
    let mut cursor = root.walk();

    for statement in root.named_children(&mut cursor) {
        let declaration = if statement.kind() == "export_statement" {
            match statement.child_by_field_name("declaration") {
                Some(declaration) => declaration,
                None => continue,
            }
        } else {
            statement
        };

        match declaration.kind() {
            "function_declaration" | "generator_function_declaration" | "class_declaration" => {
                if let Some(name) = declaration.child_by_field_name("name") {
                    sites
                        .entry(node_text(name, source).to_string())
                        .or_insert(OffsetRange::new(name.start_byte(), name.end_byte()));
                }
            }
            "lexical_declaration" | "variable_declaration" => {
                let mut inner = declaration.walk();
                for declarator in declaration.named_children(&mut inner) {
                    let Some(name) = declarator
                        .child_by_field_name("name")
                        .filter(|n| n.kind() == "identifier")
                    else {
                        continue;
                    };
                    sites
                        .entry(node_text(name, source).to_string())
                        .or_insert(OffsetRange::new(name.start_byte(), name.end_byte()));
                }
            }
            _ => {}
        }
    }

    sites
}
