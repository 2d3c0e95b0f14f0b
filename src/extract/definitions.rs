//! Action definition extractor
//!
//! An action definition is an async function that is either under a
//! module-level `"use server"` directive (exported declarations only) or opens
//! its own body with the directive (any function).
//!
//! Targets, in the order they are discovered:
//! - function declarations (exported, default-exported or private)
//! - variables bound directly to an async function/arrow literal
//! - async literals nested anywhere in a variable initializer (builder chains)
//! - `export default async () => ...`
//! - any async literal whose own body opens with the directive, reported as
//!   an inline definition

use super::parser::{parse_source, SourceDialect};
use super::syntax::{
    body_has_server_directive, has_server_directive, is_async, is_function_declaration,
    is_function_literal, is_module_level, node_text, unwrap_expression, visit, Visit,
};
use crate::range::OffsetRange;
use serde::Serialize;
use std::collections::HashSet;
use tree_sitter::{Node, Tree};

/// Name of an action definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionName {
    /// Declared identifier (function or variable name)
    Named(String),
    /// Anonymous `export default` function
    Default,
    /// Literal found inline (e.g. as a markup attribute value)
    Inline,
}

impl DefinitionName {
    /// The identifier same-file calls can use, if any
    pub fn as_local_name(&self) -> Option<&str> {
        match self {
            DefinitionName::Named(name) => Some(name),
            DefinitionName::Default | DefinitionName::Inline => None,
        }
    }
}

impl std::fmt::Display for DefinitionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefinitionName::Named(name) => write!(f, "{}", name),
            DefinitionName::Default => write!(f, "<default>"),
            DefinitionName::Inline => write!(f, "<inline>"),
        }
    }
}

/// A function recognised as a server action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionDefinitionSpan {
    pub name: DefinitionName,
    /// The executable block, braces included (or the expression of an
    /// expression-bodied arrow)
    pub body: OffsetRange,
    /// The declared identifier, when there is one
    pub name_range: Option<OffsetRange>,
}

impl ActionDefinitionSpan {
    /// Whether `offset` lands on the definition's name or inside its body
    pub fn covers(&self, offset: usize) -> bool {
        self.body.contains(offset) || self.name_range.is_some_and(|r| r.contains(offset))
    }
}

/// Extract action definitions from TSX (or plain TypeScript/JavaScript) text
pub fn extract_definitions(source: &str) -> Vec<ActionDefinitionSpan> {
    extract_definitions_in(source, SourceDialect::default())
}

/// Extract action definitions using a specific grammar
pub fn extract_definitions_in(source: &str, dialect: SourceDialect) -> Vec<ActionDefinitionSpan> {
    match parse_source(source, dialect) {
        Ok(tree) => definitions_in_tree(&tree, source),
        Err(e) => {
            tracing::debug!("No definitions extracted: {}", e);
            Vec::new()
        }
    }
}

/// Extract action definitions from an already parsed tree
pub fn definitions_in_tree(tree: &Tree, source: &str) -> Vec<ActionDefinitionSpan> {
    let root = tree.root_node();
    let mut collector = DefinitionCollector {
        source,
        module_marked: has_server_directive(root, source),
        exported_names: exported_local_names(root, source),
        seen: HashSet::new(),
        spans: Vec::new(),
    };

    visit(root, |node| {
        match node.kind() {
            _ if is_function_declaration(node) => collector.declaration(node),
            "variable_declarator" => collector.declarator(node),
            "export_statement" => collector.default_export(node),
            _ if is_function_literal(node) => collector.inline(node),
            _ => {}
        }
        Visit::Descend
    });

    collector.spans
}

struct DefinitionCollector<'s> {
    source: &'s str,
    module_marked: bool,
    exported_names: HashSet<String>,
    /// Body ranges already reported
    seen: HashSet<(usize, usize)>,
    spans: Vec<ActionDefinitionSpan>,
}

impl<'s> DefinitionCollector<'s> {
    fn declaration(&mut self, node: Node<'_>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);
        let exported = node.parent().is_some_and(|p| p.kind() == "export_statement")
            || (is_module_level(node) && self.exported_names.contains(name));

        self.consider(
            node,
            DefinitionName::Named(name.to_string()),
            Some(to_range(name_node)),
            exported,
        );
    }

    fn declarator(&mut self, node: Node<'_>) {
        let (Some(name_node), Some(value)) =
            (node.child_by_field_name("name"), node.child_by_field_name("value"))
        else {
            return;
        };
        if name_node.kind() != "identifier" {
            return;
        }

        let name = node_text(name_node, self.source);
        // declarator -> lexical_declaration -> (export_statement) -> program
        let declaration = node.parent();
        let exported = declaration
            .and_then(|d| d.parent())
            .is_some_and(|p| p.kind() == "export_statement")
            || (declaration.is_some_and(is_module_level) && self.exported_names.contains(name));
        let name_range = Some(to_range(name_node));

        // The initializer itself or builder/factory chains: every literal in it
        // belongs to this name. Only an accepted literal hides what it contains.
        let mut candidates = vec![value];
        while let Some(n) = candidates.pop() {
            if is_function_literal(n)
                && self.consider(n, DefinitionName::Named(name.to_string()), name_range, exported)
            {
                continue;
            }
            let mut cursor = n.walk();
            let children: Vec<_> = n.named_children(&mut cursor).collect();
            candidates.extend(children.into_iter().rev());
        }
    }

    fn default_export(&mut self, node: Node<'_>) {
        let Some(value) = node.child_by_field_name("value") else {
            return;
        };
        let value = unwrap_expression(value);
        if is_function_literal(value) {
            let name = match value.child_by_field_name("name") {
                Some(name_node) => DefinitionName::Named(node_text(name_node, self.source).to_string()),
                None => DefinitionName::Default,
            };
            let name_range = value.child_by_field_name("name").map(to_range);
            self.consider(value, name, name_range, true);
        }
    }

    fn inline(&mut self, node: Node<'_>) {
        if is_async(node) && body_has_server_directive(node, self.source) {
            self.push(node, DefinitionName::Inline, None);
        }
    }

    /// Apply the eligibility rule: async, and either the body opens with the
    /// directive or the function is exported from a marked module
    fn consider(
        &mut self,
        function: Node<'_>,
        name: DefinitionName,
        name_range: Option<OffsetRange>,
        exported: bool,
    ) -> bool {
        if !is_async(function) {
            return false;
        }
        let body_marked = body_has_server_directive(function, self.source);
        if body_marked || (exported && self.module_marked) {
            self.push(function, name, name_range);
            return true;
        }
        false
    }

    fn push(&mut self, function: Node<'_>, name: DefinitionName, name_range: Option<OffsetRange>) {
        let Some(body) = function.child_by_field_name("body") else {
            return;
        };
        if !self.seen.insert((body.start_byte(), body.end_byte())) {
            return;
        }
        self.spans.push(ActionDefinitionSpan {
            name,
            body: to_range(body),
            name_range,
        });
    }
}

/// Names made public by `export { a, b as c }` and `export default a`,
/// which let earlier private declarations count as exported
fn exported_local_names(root: Node<'_>, source: &str) -> HashSet<String> {
    let mut names = HashSet::new();
    let mut cursor = root.walk();
    for statement in root.named_children(&mut cursor) {
        if statement.kind() != "export_statement" || statement.child_by_field_name("source").is_some() {
            continue;
        }
        if let Some(value) = statement.child_by_field_name("value") {
            if value.kind() == "identifier" {
                names.insert(node_text(value, source).to_string());
            }
            continue;
        }
        let mut inner = statement.walk();
        for clause in statement.named_children(&mut inner) {
            if clause.kind() != "export_clause" {
                continue;
            }
            let mut specifiers = clause.walk();
            for specifier in clause.named_children(&mut specifiers) {
                if let Some(local) = specifier.child_by_field_name("name") {
                    names.insert(node_text(local, source).to_string());
                }
            }
        }
    }
    names
}

fn to_range(node: Node<'_>) -> OffsetRange {
    OffsetRange::new(node.start_byte(), node.end_byte())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(spans: &[ActionDefinitionSpan]) -> Vec<String> {
        spans.iter().map(|s| s.name.to_string()).collect()
    }

    #[test]
    fn test_module_directive_exported_declarations() {
        let source = r#""use server";

export async function createUser(data: FormData) {
  await db.insert(data);
}

export const deleteUser = async (id: string) => {
  await db.delete(id);
};

async function privateHelper() {
  return 1;
}

export function notAsync() {}
"#;
        let spans = extract_definitions(source);
        assert_eq!(names(&spans), vec!["createUser", "deleteUser"]);

        let create = &spans[0];
        assert_eq!(&source[create.name_range.unwrap().start..create.name_range.unwrap().end], "createUser");
        assert!(source[create.body.start..create.body.end].starts_with('{'));
        assert!(source[create.body.start..create.body.end].ends_with('}'));
    }

    #[test]
    fn test_private_helper_needs_own_directive() {
        let source = r#"
async function save() {
  "use server";
  await db.save();
}

async function notAnAction() {
  await db.read();
}
"#;
        let spans = extract_definitions(source);
        assert_eq!(names(&spans), vec!["save"]);
    }

    #[test]
    fn test_export_clause_marks_declaration_exported() {
        let source = r#"'use server';
async function archive() {}
const restore = async () => {};
export { archive, restore as undo };
"#;
        let spans = extract_definitions(source);
        assert_eq!(names(&spans), vec!["archive", "restore"]);
    }

    #[test]
    fn test_builder_chain_and_default_export() {
        let source = r#""use server";
export const updateName = actionClient
  .schema(schema)
  .action(async ({ parsedInput }) => {
    return parsedInput;
  });

export default async () => {
  await work();
};
"#;
        let spans = extract_definitions(source);
        assert_eq!(names(&spans), vec!["updateName", "<default>"]);
        assert!(spans[1].name_range.is_none());
    }

    #[test]
    fn test_async_literal_inside_plain_wrapper() {
        let source = r#""use server";
export const save = withAuth(function (ctx) {
  return async (data) => {
    await db.write(data);
  };
});
"#;
        let spans = extract_definitions(source);
        assert_eq!(names(&spans), vec!["save"]);
        let body = &source[spans[0].body.start..spans[0].body.end];
        assert!(body.contains("db.write"));
        assert!(!body.contains("return async"));
    }

    #[test]
    fn test_accepted_wrapper_hides_inner_literals() {
        let source = r#""use server";
export const run = withRetry(async (input) => {
  const step = async () => input;
  return step();
});
"#;
        let spans = extract_definitions(source);
        assert_eq!(names(&spans), vec!["run"]);
        assert!(source[spans[0].body.start..spans[0].body.end].contains("const step"));
    }

    #[test]
    fn test_async_generator_declaration() {
        let source = r#""use server";
export async function* stream() {
  yield await next();
}

export function* plain() {}
"#;
        let spans = extract_definitions(source);
        assert_eq!(names(&spans), vec!["stream"]);
        assert_eq!(
            &source[spans[0].name_range.unwrap().start..spans[0].name_range.unwrap().end],
            "stream"
        );
    }

    #[test]
    fn test_inline_literal_in_markup() {
        let source = r#"
export default function Page() {
  return (
    <form action={async (data) => {
      "use server";
      await save(data);
    }}>
      <button>Save</button>
    </form>
  );
}
"#;
        let spans = extract_definitions(source);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, DefinitionName::Inline);
    }

    #[test]
    fn test_named_then_inline_rediscovery_is_deduplicated() {
        let source = r#"
export const submit = async () => {
  "use server";
};
"#;
        let spans = extract_definitions(source);
        assert_eq!(names(&spans), vec!["submit"]);
    }

    #[test]
    fn test_directive_in_nested_scope_only() {
        let source = r#"
export function Page() {
  const save = async () => {
    "use server";
  };
  return <form action={save} />;
}
"#;
        let spans = extract_definitions(source);
        assert_eq!(names(&spans), vec!["save"]);
    }

    #[test]
    fn test_broken_source_degrades_gracefully() {
        let spans = extract_definitions("export async function (((");
        assert!(spans.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let source = r#""use server";
export async function a() {}
export const b = async () => {};
"#;
        assert_eq!(extract_definitions(source), extract_definitions(source));
    }
}
