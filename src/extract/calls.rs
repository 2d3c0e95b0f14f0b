//! Call-site extractor
//!
//! Finds every syntactic site that might invoke an action:
//! 1. `action={...}` / `formAction={...}` markup attributes (entry points)
//! 2. call expressions with a resolvable callee identifier
//! 3. calls nested inside a `startTransition(() => ...)` callback
//! 4. the first argument of `useActionState(fn, ...)`-style hooks
//!
//! Rules are independent; one span found by several rules is reported once,
//! under the rule that reached it first.

use super::parser::{parse_source, SourceDialect};
use super::syntax::{
    first_named_child, is_function_literal, last_named_child, node_text, unwrap_expression,
    visit, Visit,
};
use crate::range::OffsetRange;
use serde::Serialize;
use std::collections::HashSet;
use tree_sitter::{Node, Tree};

/// Deferred-execution wrappers whose callback body is scanned for calls
pub const TRANSITION_WRAPPERS: &[&str] = &["startTransition"];

/// Hooks whose first argument is an action reference
pub const ACTION_HOOKS: &[&str] = &["useActionState", "useFormState"];

/// Markup attribute that hands a function to the framework as an entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EntryAttribute {
    Action,
    FormAction,
}

impl EntryAttribute {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "action" => Some(EntryAttribute::Action),
            "formAction" => Some(EntryAttribute::FormAction),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryAttribute::Action => "action",
            EntryAttribute::FormAction => "formAction",
        }
    }
}

/// The identifier a candidate would invoke
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Callee {
    pub name: String,
    /// Offset of the identifier's first byte
    pub start: usize,
}

impl Callee {
    /// Where to ask the oracle about this callee: the middle of the name,
    /// but never its first character.
    pub fn probe_offset(&self) -> usize {
        let chars = self.name.chars().count();
        let step = (chars / 2).max(1);
        let byte = self
            .name
            .char_indices()
            .nth(step)
            .map(|(i, _)| i)
            .unwrap_or(self.name.len());
        self.start + byte
    }
}

/// How a candidate was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateKind {
    /// `fn()` or `ns.fn()`
    DirectCall {
        callee: Callee,
        /// Base identifier of a single-level property access
        qualifier: Option<String>,
    },
    /// A call inside a transition callback
    WrappedCall {
        callee: Callee,
        qualifier: Option<String>,
    },
    /// The expression of an `action` / `formAction` attribute
    EntryPoint { attribute: EntryAttribute },
    /// Identifier passed as the first argument of an action hook
    HookArgument { callee: Callee },
}

/// A site that might invoke an action definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallCandidate {
    #[serde(flatten)]
    pub kind: CandidateKind,
    /// Highlightable span: identifier through closing parenthesis for calls,
    /// the expression itself otherwise
    pub range: OffsetRange,
}

impl CallCandidate {
    pub fn callee(&self) -> Option<&Callee> {
        match &self.kind {
            CandidateKind::DirectCall { callee, .. }
            | CandidateKind::WrappedCall { callee, .. }
            | CandidateKind::HookArgument { callee } => Some(callee),
            CandidateKind::EntryPoint { .. } => None,
        }
    }

    pub fn callee_name(&self) -> Option<&str> {
        self.callee().map(|c| c.name.as_str())
    }

    pub fn qualifier_name(&self) -> Option<&str> {
        match &self.kind {
            CandidateKind::DirectCall { qualifier, .. }
            | CandidateKind::WrappedCall { qualifier, .. } => qualifier.as_deref(),
            _ => None,
        }
    }

    pub fn is_entry_point(&self) -> bool {
        matches!(self.kind, CandidateKind::EntryPoint { .. })
    }

    /// Offset handed to the resolution oracle
    pub fn probe_offset(&self) -> usize {
        self.callee()
            .map(Callee::probe_offset)
            .unwrap_or(self.range.start)
    }

    /// Short label for display
    pub fn kind_label(&self) -> &'static str {
        match &self.kind {
            CandidateKind::DirectCall { .. } => "call",
            CandidateKind::WrappedCall { .. } => "transition",
            CandidateKind::EntryPoint { attribute } => attribute.as_str(),
            CandidateKind::HookArgument { .. } => "hook",
        }
    }
}

/// Extract call candidates from TSX (or plain TypeScript/JavaScript) text
pub fn extract_call_sites(source: &str) -> Vec<CallCandidate> {
    extract_call_sites_in(source, SourceDialect::default())
}

/// Extract call candidates using a specific grammar
pub fn extract_call_sites_in(source: &str, dialect: SourceDialect) -> Vec<CallCandidate> {
    match parse_source(source, dialect) {
        Ok(tree) => call_sites_in_tree(&tree, source),
        Err(e) => {
            tracing::debug!("No call sites extracted: {}", e);
            Vec::new()
        }
    }
}

/// Extract call candidates from an already parsed tree
pub fn call_sites_in_tree(tree: &Tree, source: &str) -> Vec<CallCandidate> {
    let mut collector = CandidateCollector {
        source,
        seen: HashSet::new(),
        candidates: Vec::new(),
    };

    visit(tree.root_node(), |node| {
        match node.kind() {
            "jsx_attribute" => collector.entry_point(node),
            "call_expression" => collector.call(node),
            _ => {}
        }
        Visit::Descend
    });

    collector.candidates
}

struct CandidateCollector<'s> {
    source: &'s str,
    /// Spans already reported, regardless of kind
    seen: HashSet<OffsetRange>,
    candidates: Vec<CallCandidate>,
}

impl<'s> CandidateCollector<'s> {
    fn entry_point(&mut self, node: Node<'_>) {
        let Some(name) = first_named_child(node) else {
            return;
        };
        if name.kind() != "property_identifier" {
            return;
        }
        let Some(attribute) = EntryAttribute::from_name(node_text(name, self.source)) else {
            return;
        };
        let Some(value) = last_named_child(node).filter(|v| v.kind() == "jsx_expression") else {
            return;
        };
        // `action={}` or `action={/* comment */}` carry nothing to highlight
        let Some(expression) = first_named_child(value) else {
            return;
        };

        self.push(
            CandidateKind::EntryPoint { attribute },
            OffsetRange::new(expression.start_byte(), expression.end_byte()),
        );
    }

    fn call(&mut self, node: Node<'_>) {
        let Some((callee, qualifier)) = self.resolve_callee(node) else {
            return;
        };
        let name = callee.name.clone();
        self.push_call(node, callee, qualifier, false);

        if TRANSITION_WRAPPERS.contains(&name.as_str()) {
            self.wrapped_calls(node);
        }
        if ACTION_HOOKS.contains(&name.as_str()) {
            self.hook_argument(node);
        }
    }

    /// Scan an inline transition callback for the calls it makes
    fn wrapped_calls(&mut self, wrapper: Node<'_>) {
        let Some(callback) = first_argument(wrapper) else {
            return;
        };
        let callback = unwrap_expression(callback);
        if !is_function_literal(callback) {
            return;
        }
        let Some(body) = callback.child_by_field_name("body") else {
            return;
        };

        let mut nested = Vec::new();
        visit(body, |n| {
            if n.kind() == "call_expression" {
                nested.push(n);
            }
            Visit::Descend
        });
        for call in nested {
            if let Some((callee, qualifier)) = self.resolve_callee(call) {
                self.push_call(call, callee, qualifier, true);
            }
        }
    }

    fn hook_argument(&mut self, hook: Node<'_>) {
        let Some(argument) = first_argument(hook) else {
            return;
        };
        if argument.kind() != "identifier" {
            return;
        }
        let callee = Callee {
            name: node_text(argument, self.source).to_string(),
            start: argument.start_byte(),
        };
        self.push(
            CandidateKind::HookArgument { callee },
            OffsetRange::new(argument.start_byte(), argument.end_byte()),
        );
    }

    /// Callee identifier and optional qualifier of a call expression.
    ///
    /// `fn()` yields `fn`; `ns.fn()` yields `fn` qualified by `ns`;
    /// `a.b.fn()` yields `fn` with no qualifier. Element access
    /// (`obj['fn']()`) yields nothing.
    fn resolve_callee(&self, call: Node<'_>) -> Option<(Callee, Option<String>)> {
        let function = unwrap_expression(call.child_by_field_name("function")?);
        match function.kind() {
            "identifier" => Some((
                Callee {
                    name: node_text(function, self.source).to_string(),
                    start: function.start_byte(),
                },
                None,
            )),
            "member_expression" => {
                let property = function.child_by_field_name("property")?;
                if !matches!(property.kind(), "property_identifier" | "private_property_identifier") {
                    return None;
                }
                let qualifier = function
                    .child_by_field_name("object")
                    .filter(|object| object.kind() == "identifier")
                    .map(|object| node_text(object, self.source).to_string());
                Some((
                    Callee {
                        name: node_text(property, self.source).to_string(),
                        start: property.start_byte(),
                    },
                    qualifier,
                ))
            }
            _ => None,
        }
    }

    fn push_call(&mut self, call: Node<'_>, callee: Callee, qualifier: Option<String>, wrapped: bool) {
        let range = OffsetRange::new(callee.start, call.end_byte());
        let kind = if wrapped {
            CandidateKind::WrappedCall { callee, qualifier }
        } else {
            CandidateKind::DirectCall { callee, qualifier }
        };
        self.push(kind, range);
    }

    fn push(&mut self, kind: CandidateKind, range: OffsetRange) {
        if self.seen.insert(range) {
            self.candidates.push(CallCandidate { kind, range });
        }
    }
}

/// First argument of a call, ignoring comments
fn first_argument(call: Node<'_>) -> Option<Node<'_>> {
    let arguments = call.child_by_field_name("arguments")?;
    if arguments.kind() != "arguments" {
        return None;
    }
    first_named_child(arguments)
}
