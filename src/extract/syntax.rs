//! Shared syntax helpers for the extractors
//!
//! Node-kind tables, directive detection, wrapper unwrapping and an
//! allocation-light pre-order walk. Everything here is grammar-specific to the
//! tree-sitter JavaScript/TypeScript family.

use tree_sitter::Node;

/// The server-marker directive literal
pub const SERVER_DIRECTIVE: &str = "use server";

/// Maximum number of expression wrappers peeled off a callee
pub const MAX_UNWRAP_DEPTH: usize = 8;

/// Function literal kinds (`function_expression` is `function` in older grammars)
const FUNCTION_LITERALS: &[&str] = &[
    "function_expression",
    "function",
    "generator_function",
    "arrow_function",
];

/// Declaration kinds that introduce a callable name
const FUNCTION_DECLARATIONS: &[&str] = &["function_declaration", "generator_function_declaration"];

/// Wrappers that do not change which function a callee refers to
const TRANSPARENT_WRAPPERS: &[&str] = &[
    "parenthesized_expression",
    "non_null_expression",
    "as_expression",
    "satisfies_expression",
    "type_assertion",
];

/// Walk control returned by `visit` callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Continue into the node's children
    Descend,
    /// Do not enter this node's children
    Skip,
    /// Abort the whole walk
    Stop,
}

/// Pre-order (document order) walk over `root` and its descendants.
///
/// Uses an explicit stack so deeply nested sources cannot exhaust the call stack.
pub fn visit<'t>(root: Node<'t>, mut f: impl FnMut(Node<'t>) -> Visit) {
    let mut stack = vec![root];
    let mut cursor = root.walk();
    let mut children = Vec::new();

    while let Some(node) = stack.pop() {
        match f(node) {
            Visit::Stop => return,
            Visit::Skip => continue,
            Visit::Descend => {}
        }
        children.clear();
        children.extend(node.children(&mut cursor));
        stack.extend(children.drain(..).rev());
    }
}

/// Source text covered by `node`
pub fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

/// Contents of a string literal node without its quotes
pub fn string_value<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    let text = node_text(node, source);
    if text.len() >= 2 {
        let quote = text.as_bytes()[0];
        if matches!(quote, b'"' | b'\'' | b'`') && text.as_bytes()[text.len() - 1] == quote {
            return &text[1..text.len() - 1];
        }
    }
    text
}

pub fn is_comment(node: Node<'_>) -> bool {
    matches!(node.kind(), "comment" | "html_comment" | "hashbang_line")
}

/// First named child that is not a comment
pub fn first_named_child(node: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = node.walk();
    let child = node.named_children(&mut cursor).find(|c| !is_comment(*c));
    child
}

/// Last named child that is not a comment
pub fn last_named_child(node: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = node.walk();
    let child = node.named_children(&mut cursor).filter(|c| !is_comment(*c)).last();
    child
}

/// Whether `node` has a direct anonymous child token of the given kind
/// (`async`, `type`, `default`, ...)
pub fn has_token(node: Node<'_>, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|c| !c.is_named() && c.kind() == token);
    found
}

pub fn is_function_literal(node: Node<'_>) -> bool {
    FUNCTION_LITERALS.contains(&node.kind())
}

pub fn is_function_declaration(node: Node<'_>) -> bool {
    FUNCTION_DECLARATIONS.contains(&node.kind())
}

pub fn is_async(node: Node<'_>) -> bool {
    has_token(node, "async")
}

/// Whether a statement container (program or statement block) opens with a
/// directive prologue containing `"use server"`.
///
/// The prologue is the run of leading string-literal expression statements;
/// comments are skipped, any other statement ends it.
pub fn has_server_directive(container: Node<'_>, source: &str) -> bool {
    let mut cursor = container.walk();
    for statement in container.named_children(&mut cursor) {
        if is_comment(statement) {
            continue;
        }
        if statement.kind() != "expression_statement" {
            return false;
        }
        let Some(expression) = first_named_child(statement) else {
            return false;
        };
        if expression.kind() != "string" {
            return false;
        }
        if string_value(expression, source) == SERVER_DIRECTIVE {
            return true;
        }
    }
    false
}

/// Whether a function's own body block opens with the server directive
pub fn body_has_server_directive(function: Node<'_>, source: &str) -> bool {
    function
        .child_by_field_name("body")
        .filter(|body| body.kind() == "statement_block")
        .is_some_and(|body| has_server_directive(body, source))
}

/// Peel parentheses, non-null assertions and type assertions off an
/// expression, at most `MAX_UNWRAP_DEPTH` layers deep.
pub fn unwrap_expression(node: Node<'_>) -> Node<'_> {
    let mut current = node;
    for _ in 0..MAX_UNWRAP_DEPTH {
        if !TRANSPARENT_WRAPPERS.contains(&current.kind()) {
            break;
        }
        // `<T>expr` keeps the expression last, every other wrapper keeps it first
        let inner = if current.kind() == "type_assertion" {
            last_named_child(current)
        } else {
            first_named_child(current)
        };
        match inner {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

/// Whether a function literal appears anywhere in `node`'s subtree,
/// `node` included. Stops at the first match.
pub fn contains_function_literal(node: Node<'_>) -> bool {
    let mut found = false;
    visit(node, |n| {
        if is_function_literal(n) {
            found = true;
            Visit::Stop
        } else {
            Visit::Descend
        }
    });
    found
}

/// Whether `node` is a top-level statement, allowing for a wrapping `export`
pub fn is_module_level(statement: Node<'_>) -> bool {
    match statement.parent() {
        Some(parent) if parent.kind() == "program" => true,
        Some(parent) if parent.kind() == "export_statement" => {
            parent.parent().is_some_and(|p| p.kind() == "program")
        }
        _ => false,
    }
}
