//! Reduces a `trans` body to a message with `%name%` placeholders.

use crate::ast::{Expr, Node};
use crate::error::{Error, Result};
use crate::trans::TransBody;

/// How many filter / string-coercion layers are unwrapped before a
/// printed expression is given up on.
pub const MAX_UNWRAP_DEPTH: usize = 32;

/// A variable interpolated into a message.
///
/// `raw` variables were printed without any filter and go into the
/// substitution map as-is; the others are escaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub raw: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Literal text, possibly containing `%name%` placeholders.
    Literal(String),
    /// An inline atomic expression used as the whole message.
    Expr(Expr),
}

impl Message {
    pub fn into_expr(self) -> Expr {
        match self {
            Message::Literal(text) => Expr::Str(text),
            Message::Expr(expr) => expr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub message: Message,
    pub variables: Vec<Variable>,
}

/// Extract the message and its variables from a translation body.
///
/// `line` is reported when the body holds something other than text and
/// simple variables.
pub fn extract(body: &TransBody, line: usize) -> Result<Extracted> {
    match body {
        TransBody::Inline(expr) if expr.is_atomic() => Ok(Extracted {
            message: Message::Expr(expr.clone()),
            variables: Vec::new(),
        }),
        TransBody::Inline(_) => Err(Error::UntranslatableContent { line }),
        TransBody::Nodes(nodes) => extract_nodes(nodes, line),
    }
}

pub fn extract_nodes(nodes: &[Node], line: usize) -> Result<Extracted> {
    let mut message = String::new();
    let mut variables = Vec::new();

    for node in nodes {
        match node {
            Node::Text(data) => message.push_str(data),
            Node::Print(expr) => {
                let raw = !matches!(expr, Expr::Filter { .. });
                let name = variable_name(expr, 0).ok_or(Error::UntranslatableContent { line })?;
                message.push('%');
                message.push_str(name);
                message.push('%');
                union(
                    &mut variables,
                    [Variable {
                        name: name.to_string(),
                        raw,
                    }],
                );
            }
            Node::For { .. } | Node::If { .. } | Node::Trans(_) => {
                return Err(Error::UntranslatableContent { line });
            }
        }
    }

    Ok(Extracted {
        message: Message::Literal(trim_message(&message).to_string()),
        variables,
    })
}

/// Strip surrounding spaces, tabs, line breaks, NUL and vertical tabs.
///
/// Other Unicode whitespace such as NBSP is part of the message.
pub fn trim_message(text: &str) -> &str {
    text.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r' | '\0' | '\x0B'))
}

/// Name of the variable under any filter and string-coercion layers.
pub(crate) fn variable_name(expr: &Expr, depth: usize) -> Option<&str> {
    if depth > MAX_UNWRAP_DEPTH {
        return None;
    }
    match expr {
        Expr::Name(name) => Some(name),
        Expr::Filter { node, .. } | Expr::ToString(node) => variable_name(node, depth + 1),
        _ => None,
    }
}

/// Append variables not already present by name; the first flag wins.
pub fn union(into: &mut Vec<Variable>, from: impl IntoIterator<Item = Variable>) {
    for variable in from {
        if !into.iter().any(|v| v.name == variable.name) {
            into.push(variable);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Node {
        Node::Text(s.to_string())
    }

    fn print(name: &str) -> Node {
        Node::Print(Expr::name(name))
    }

    fn escaped(name: &str) -> Node {
        Node::Print(Expr::filter(Expr::name(name), "escape", vec![]))
    }

    fn var(name: &str, raw: bool) -> Variable {
        Variable {
            name: name.to_string(),
            raw,
        }
    }

    #[test]
    fn text_only_body_is_trimmed() {
        let out = extract_nodes(&[text("  Hello\n world \n")], 1).unwrap();
        assert_eq!(out.message, Message::Literal("Hello\n world".to_string()));
        assert!(out.variables.is_empty());
    }

    #[test]
    fn unicode_spaces_are_kept() {
        let out = extract_nodes(&[text("\0\x0B \u{a0}Total\u{2028}\t\n")], 1).unwrap();
        assert_eq!(
            out.message,
            Message::Literal("\u{a0}Total\u{2028}".to_string())
        );
    }

    #[test]
    fn empty_body_gives_empty_message() {
        let out = extract(&TransBody::Nodes(vec![]), 1).unwrap();
        assert_eq!(out.message, Message::Literal(String::new()));
    }

    #[test]
    fn placeholders_in_first_occurrence_order() {
        let nodes = [
            text("Dear "),
            print("name"),
            text(", you have "),
            escaped("count"),
            text(" messages, "),
            escaped("name"),
        ];
        let out = extract_nodes(&nodes, 1).unwrap();
        assert_eq!(
            out.message,
            Message::Literal("Dear %name%, you have %count% messages, %name%".to_string())
        );
        assert_eq!(out.variables, vec![var("name", true), var("count", false)]);
    }

    #[test]
    fn unwraps_nested_filters_and_coercion() {
        let expr = Expr::filter(
            Expr::ToString(Box::new(Expr::filter(Expr::name("user"), "upper", vec![]))),
            "escape",
            vec![],
        );
        let out = extract_nodes(&[Node::Print(expr)], 1).unwrap();
        assert_eq!(out.message, Message::Literal("%user%".to_string()));
        assert_eq!(out.variables, vec![var("user", false)]);
    }

    #[test]
    fn inline_atomic_expression_passes_through() {
        let out = extract(&TransBody::Inline(Expr::name("greeting")), 1).unwrap();
        assert_eq!(out.message, Message::Expr(Expr::name("greeting")));
        assert!(out.variables.is_empty());
    }

    #[test]
    fn filter_over_attribute_is_rejected() {
        let expr = Expr::filter(
            Expr::Attribute(Box::new(Expr::name("user")), "name".into()),
            "escape",
            vec![],
        );
        let err = extract_nodes(&[Node::Print(expr)], 7).unwrap_err();
        assert_eq!(err, Error::UntranslatableContent { line: 7 });
    }

    #[test]
    fn control_structures_are_rejected() {
        let nodes = [Node::If {
            cases: vec![(Expr::name("x"), vec![text("y")])],
            else_body: None,
        }];
        assert!(extract_nodes(&nodes, 2).is_err());
    }

    #[test]
    fn unwrap_depth_is_bounded() {
        let mut expr = Expr::name("deep");
        for _ in 0..=MAX_UNWRAP_DEPTH + 1 {
            expr = Expr::filter(expr, "lower", vec![]);
        }
        assert_eq!(variable_name(&expr, 0), None);
    }

    #[test]
    fn union_keeps_first_raw_flag() {
        let mut vars = vec![var("count", false)];
        union(&mut vars, [var("count", true), var("n", true)]);
        assert_eq!(vars, vec![var("count", false), var("n", true)]);
    }
}
