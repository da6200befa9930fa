use crate::ast::{Expr, Node};
use crate::error::{Error, Result};
use crate::extension::TagParser;
use crate::lexer::{Token, TokenKind};
use crate::parser::Parser;
use crate::trans::extract::variable_name;
use crate::trans::{TransBody, TransNode};

/// Parses `{% trans from <domain> ... %}` in its inline and block forms.
///
/// ```text
/// {% trans from "app" "Hello" %}
/// {% trans from "app" %}Hello {{ name }}{% endtrans %}
/// {% trans from "app" %}One item{% plural n %}{{ count }} items{% notes %}cart{% endtrans %}
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct TransTagParser;

fn decide_for_fork(token: &Token) -> bool {
    token.is_name("plural") || token.is_name("notes") || token.is_name("endtrans")
}

fn decide_for_plural_end(token: &Token) -> bool {
    token.is_name("notes") || token.is_name("endtrans")
}

impl TagParser for TransTagParser {
    fn tag(&self) -> &'static str {
        "trans"
    }

    fn parse(&self, parser: &mut Parser<'_>, line: usize) -> Result<Node> {
        parser.expect_name("from")?;
        let domain = parser.parse_expression()?;

        let mut count = None;
        let mut plural = None;
        let mut notes = None;

        let translation = if !parser.test(&TokenKind::BlockEnd)? {
            TransBody::Inline(parser.parse_expression()?)
        } else {
            parser.expect(TokenKind::BlockEnd)?;
            let body = parser.subparse(Some(&decide_for_fork))?;

            if parser.test_name("plural")? {
                parser.next()?;
                count = Some(parser.parse_expression()?);
                parser.expect(TokenKind::BlockEnd)?;
                plural = Some(parser.subparse(Some(&decide_for_plural_end))?);
            }
            if parser.test_name("notes")? {
                parser.next()?;
                parser.expect(TokenKind::BlockEnd)?;
                notes = Some(parser.subparse_raw("endtrans")?);
            }
            parser.expect_name("endtrans")?;
            TransBody::Nodes(body)
        };
        parser.expect(TokenKind::BlockEnd)?;

        check_trans_string(&translation, line)?;

        tracing::debug!(
            line,
            plural = plural.is_some(),
            notes = notes.is_some(),
            "parsed trans tag"
        );
        let node = TransNode::new(translation, domain, count, plural, notes, line)?;
        Ok(Node::Trans(Box::new(node)))
    }
}

/// Reject singular bodies holding anything but text and simple variables.
pub fn check_trans_string(body: &TransBody, line: usize) -> Result<()> {
    let translatable = match body {
        TransBody::Inline(expr) => expr.is_atomic(),
        TransBody::Nodes(nodes) => nodes.iter().all(is_translatable),
    };
    if translatable {
        Ok(())
    } else {
        Err(Error::UntranslatableContent { line })
    }
}

fn is_translatable(node: &Node) -> bool {
    match node {
        Node::Text(_) | Node::Print(Expr::Name(_)) => true,
        Node::Print(expr @ Expr::Filter { .. }) => variable_name(expr, 0).is_some(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Environment, Options};

    fn parse_one(source: &str) -> Result<TransNode> {
        let env = Environment::new(Options {
            autoescape: false,
            ..Options::default()
        });
        let mut nodes = env.parse(source)?;
        assert_eq!(nodes.len(), 1, "expected a single node");
        match nodes.remove(0) {
            Node::Trans(node) => Ok(*node),
            other => panic!("expected a trans node, got {other:?}"),
        }
    }

    #[test]
    fn block_form_with_domain() {
        let node = parse_one("{% trans from \"app\" %}Hello {{ name }}{% endtrans %}").unwrap();
        assert_eq!(node.domain(), &Expr::str("app"));
        assert_eq!(
            node.translation(),
            &TransBody::Nodes(vec![
                Node::Text("Hello ".into()),
                Node::Print(Expr::name("name")),
            ])
        );
        assert!(node.plural().is_none());
        assert!(node.count().is_none());
        assert!(node.notes().is_none());
    }

    #[test]
    fn inline_form() {
        let node = parse_one("{% trans from domain \"Hello\" %}").unwrap();
        assert_eq!(node.domain(), &Expr::name("domain"));
        assert_eq!(node.translation(), &TransBody::Inline(Expr::str("Hello")));
    }

    #[test]
    fn plural_and_notes() {
        let node = parse_one(
            "{% trans from 'shop' %}One apple{% plural apples|length %}{{ count }} apples{% notes %}\n  fruit {% if %} counter\n{% endtrans %}",
        )
        .unwrap();
        assert_eq!(
            node.count(),
            Some(&Expr::filter(Expr::name("apples"), "length", vec![]))
        );
        assert_eq!(
            node.plural(),
            Some(
                &[
                    Node::Print(Expr::name("count")),
                    Node::Text(" apples".into())
                ][..]
            )
        );
        assert_eq!(node.notes_text().as_deref(), Some("fruit {% if %} counter"));
    }

    #[test]
    fn notes_without_plural() {
        let node =
            parse_one("{% trans from 'app' %}Save{% notes %}button label{% endtrans %}").unwrap();
        assert!(node.plural().is_none());
        assert_eq!(node.notes_text().as_deref(), Some("button label"));
    }

    #[test]
    fn line_of_the_opening_tag_is_kept() {
        let env = Environment::default();
        let nodes = env
            .parse("a\nb\n{% trans from 'app' %}\nx\n{% endtrans %}")
            .unwrap();
        let Node::Trans(node) = &nodes[1] else {
            panic!("expected a trans node");
        };
        assert_eq!(node.line(), 3);
    }

    #[test]
    fn missing_from_is_a_grammar_error() {
        let err = parse_one("{% trans 'app' %}x{% endtrans %}").unwrap_err();
        assert!(matches!(err, Error::Syntax { line: 1, .. }));
    }

    #[test]
    fn missing_endtrans_is_a_grammar_error() {
        let err = parse_one("{% trans from 'app' %}x").unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn unclosed_notes_is_a_grammar_error() {
        let err = parse_one("{% trans from 'app' %}x{% notes %}dangling").unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn plural_after_notes_is_raw_text() {
        let node = parse_one(
            "{% trans from 'app' %}x{% notes %}see {% plural n %}{% endtrans %}",
        )
        .unwrap();
        assert!(node.plural().is_none());
        assert_eq!(node.notes_text().as_deref(), Some("see {% plural n %}"));
    }

    #[test]
    fn nested_if_is_a_content_error_at_tag_line() {
        let err = parse_one("\n{% trans from 'app' %}{% if a %}b{% endif %}{% endtrans %}")
            .unwrap_err();
        assert_eq!(err, Error::UntranslatableContent { line: 2 });
    }

    #[test]
    fn arithmetic_is_a_content_error() {
        let err = parse_one("{% trans from 'app' %}{{ a + 1 }}{% endtrans %}").unwrap_err();
        assert_eq!(err, Error::UntranslatableContent { line: 1 });
    }

    #[test]
    fn inline_form_must_be_atomic() {
        let err = parse_one("{% trans from 'app' 'a' ~ b %}").unwrap_err();
        assert_eq!(err, Error::UntranslatableContent { line: 1 });
    }

    #[test]
    fn inline_constants_are_accepted() {
        for source in [
            "{% trans from 'app' true %}",
            "{% trans from 'app' null %}",
            "{% trans from 'app' 42 %}",
        ] {
            assert!(parse_one(source).is_ok(), "{source}");
        }
    }

    #[test]
    fn filtered_variables_are_accepted() {
        let node = parse_one("{% trans from 'app' %}Hi {{ name|upper }}{% endtrans %}").unwrap();
        assert!(matches!(node.translation(), TransBody::Nodes(n) if n.len() == 2));
    }

    #[test]
    fn plural_body_is_not_validated_at_parse_time() {
        let node = parse_one(
            "{% trans from 'app' %}one{% plural n %}{% if n %}many{% endif %}{% endtrans %}",
        );
        assert!(node.is_ok());
    }
}
