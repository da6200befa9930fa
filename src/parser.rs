use std::collections::VecDeque;

use crate::ast::*;
use crate::error::{Error, Result};
use crate::lexer::{Token, TokenKind, Tokenizer};
use crate::Environment;

/// Filters that already decide how a printed value is escaped.
const ESCAPING_FILTERS: [&str; 3] = ["escape", "e", "raw"];

/// Token stream plus the template and expression grammar.
///
/// Tag parsers registered on the [`Environment`] drive this type directly
/// through `next`/`test`/`expect`, `parse_expression` and `subparse`.
pub struct Parser<'a> {
    lexer: Tokenizer<'a>,
    buffer: VecDeque<Token>,
    env: &'a Environment,
    line: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str, env: &'a Environment) -> Self {
        Self {
            lexer: Tokenizer::new(input, env.options().trim_blocks),
            buffer: VecDeque::new(),
            env,
            line: 1,
        }
    }

    /// Parser over a bare expression such as `translate("Hi", "app")`.
    pub fn for_expression(input: &'a str, env: &'a Environment) -> Self {
        Self {
            lexer: Tokenizer::expression(input),
            buffer: VecDeque::new(),
            env,
            line: 1,
        }
    }

    /// Line of the next token, or of the last one consumed at end of input.
    pub fn current_line(&self) -> usize {
        self.buffer.front().map_or(self.line, |t| t.line)
    }

    pub fn peek(&mut self, n: usize) -> Result<Option<&Token>> {
        while self.buffer.len() <= n {
            match self.lexer.next_token()? {
                Some(token) => self.buffer.push_back(token),
                None => return Ok(None),
            }
        }
        Ok(self.buffer.get(n))
    }

    pub fn next(&mut self) -> Result<Token> {
        let token = match self.buffer.pop_front() {
            Some(token) => Some(token),
            None => self.lexer.next_token()?,
        };
        match token {
            Some(token) => {
                self.line = token.line;
                Ok(token)
            }
            None => Err(Error::syntax("Unexpected end of template", self.line)),
        }
    }

    /// Consume the next token, which must be a name, and return its value.
    pub fn next_name(&mut self) -> Result<String> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Name(name) => Ok(name),
            other => Err(Error::syntax(
                format!("Unexpected token {other} (a name was expected)"),
                token.line,
            )),
        }
    }

    pub fn test(&mut self, kind: &TokenKind) -> Result<bool> {
        Ok(self.peek(0)?.is_some_and(|t| &t.kind == kind))
    }

    pub fn test_name(&mut self, value: &str) -> Result<bool> {
        Ok(self.peek(0)?.is_some_and(|t| t.is_name(value)))
    }

    pub fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        let token = self.next()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(Error::syntax(
                format!("Unexpected token {} ({kind} expected)", token.kind),
                token.line,
            ))
        }
    }

    pub fn expect_name(&mut self, value: &str) -> Result<Token> {
        self.expect(TokenKind::Name(value.to_string()))
    }

    fn eat(&mut self, kind: &TokenKind) -> Result<bool> {
        if self.test(kind)? {
            self.next()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn eat_name(&mut self, value: &str) -> Result<bool> {
        if self.test_name(value)? {
            self.next()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Parse a whole template.
    pub fn parse(&mut self) -> Result<Template> {
        self.subparse(None)
    }

    /// Parse nodes until a block whose tag name satisfies `stop`.
    ///
    /// The `{%` of the stop block is consumed and its name token is left in
    /// the stream for the caller. Without `stop`, parses to end of input.
    pub fn subparse(&mut self, stop: Option<&dyn Fn(&Token) -> bool>) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        loop {
            let Some(token) = self.peek(0)?.cloned() else {
                if stop.is_some() {
                    return Err(Error::syntax("Unexpected end of template", self.line));
                }
                return Ok(nodes);
            };

            match token.kind {
                TokenKind::Text(text) => {
                    self.next()?;
                    nodes.push(Node::Text(text));
                }
                TokenKind::VarStart => {
                    self.next()?;
                    let expr = self.parse_expression()?;
                    self.expect(TokenKind::VarEnd)?;
                    nodes.push(Node::Print(self.print_expr(expr)));
                }
                TokenKind::BlockStart => {
                    self.next()?;
                    let tag = self.next_tag_token()?;
                    if stop.is_some_and(|stop| stop(&tag)) {
                        return Ok(nodes);
                    }
                    let name = self.next_name()?;
                    nodes.push(self.parse_tag(&name, token.line)?);
                }
                other => {
                    return Err(Error::syntax(
                        format!("Unexpected token {other}"),
                        token.line,
                    ));
                }
            }
        }
    }

    /// Read raw text up to `{% end %}` without parsing nested tags.
    ///
    /// Like [`Parser::subparse`], the `end` name token is left in the
    /// stream. Must be called right after a block end has been consumed.
    pub fn subparse_raw(&mut self, end: &str) -> Result<Vec<Node>> {
        if !self.buffer.is_empty() {
            return Err(Error::syntax(
                "A raw section must start right after a block end",
                self.current_line(),
            ));
        }
        let text = self.lexer.raw_until(end).ok_or_else(|| {
            Error::syntax(
                format!("Unexpected end of template (\"{end}\" expected)"),
                self.line,
            )
        })?;
        self.line = self.lexer.line();
        Ok(vec![Node::Text(text)])
    }

    fn next_tag_token(&mut self) -> Result<Token> {
        match self.peek(0)?.cloned() {
            Some(token @ Token {
                kind: TokenKind::Name(_),
                ..
            }) => Ok(token),
            Some(token) => Err(Error::syntax(
                "A block must start with a tag name",
                token.line,
            )),
            None => Err(Error::syntax("Unexpected end of template", self.line)),
        }
    }

    fn parse_tag(&mut self, name: &str, line: usize) -> Result<Node> {
        tracing::trace!(tag = name, line, "parsing tag");
        let env = self.env;
        match name {
            "for" => self.parse_for(),
            "if" => self.parse_if(),
            _ => match env.tag_parser(name) {
                Some(tag_parser) => tag_parser.parse(self, line),
                None => Err(Error::syntax(format!("Unknown \"{name}\" tag"), line)),
            },
        }
    }

    fn parse_for(&mut self) -> Result<Node> {
        let target = self.next_name()?;
        self.expect_name("in")?;
        let iterable = self.parse_expression()?;
        self.expect(TokenKind::BlockEnd)?;

        let body = self.subparse(Some(&|t: &Token| t.is_name("endfor")))?;
        self.expect_name("endfor")?;
        self.expect(TokenKind::BlockEnd)?;

        Ok(Node::For {
            target,
            iterable,
            body,
        })
    }

    fn parse_if(&mut self) -> Result<Node> {
        let fork = |t: &Token| t.is_name("elif") || t.is_name("else") || t.is_name("endif");

        let condition = self.parse_expression()?;
        self.expect(TokenKind::BlockEnd)?;
        let body = self.subparse(Some(&fork))?;
        let mut cases = vec![(condition, body)];
        let mut else_body = None;

        loop {
            let line = self.current_line();
            match self.next_name()?.as_str() {
                "elif" => {
                    let condition = self.parse_expression()?;
                    self.expect(TokenKind::BlockEnd)?;
                    cases.push((condition, self.subparse(Some(&fork))?));
                }
                "else" => {
                    self.expect(TokenKind::BlockEnd)?;
                    else_body =
                        Some(self.subparse(Some(&|t: &Token| t.is_name("endif")))?);
                    self.expect_name("endif")?;
                    self.expect(TokenKind::BlockEnd)?;
                    break;
                }
                "endif" => {
                    self.expect(TokenKind::BlockEnd)?;
                    break;
                }
                other => {
                    return Err(Error::syntax(
                        format!("Unexpected \"{other}\" tag (expecting elif, else or endif)"),
                        line,
                    ));
                }
            }
        }

        Ok(Node::If { cases, else_body })
    }

    /// Apply autoescaping to a printed expression.
    fn print_expr(&self, expr: Expr) -> Expr {
        let options = self.env.options();
        if !options.autoescape {
            return expr;
        }
        let escaped = matches!(&expr, Expr::Filter { name, .. }
            if ESCAPING_FILTERS.contains(&name.as_str()) || *name == options.escape_function);
        if escaped {
            expr
        } else {
            self.make_filter(expr, &options.escape_function, Vec::new())
        }
    }

    fn make_filter(&self, node: Expr, name: &str, args: Vec<Expr>) -> Expr {
        let node = if self.env.options().sandboxed {
            Expr::ToString(Box::new(node))
        } else {
            node
        };
        Expr::filter(node, name, args)
    }

    /// Parse an expression and require that nothing follows it.
    pub fn parse_standalone_expression(&mut self) -> Result<Expr> {
        let expr = self.parse_expression()?;
        if let Some(token) = self.peek(0)? {
            return Err(Error::syntax(
                format!("Unexpected token {} after expression", token.kind),
                token.line,
            ));
        }
        Ok(expr)
    }

    pub fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat_name("or")? {
            let rhs = self.parse_and()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::Or, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_not()?;
        while self.eat_name("and")? {
            let rhs = self.parse_not()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::And, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat_name("not")? {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_concat()?;
        loop {
            let op = match self.peek(0)?.map(|t| &t.kind) {
                Some(TokenKind::EqEq) => BinOp::Eq,
                Some(TokenKind::NotEq) => BinOp::NotEq,
                Some(TokenKind::Lt) => BinOp::Lt,
                Some(TokenKind::Gt) => BinOp::Gt,
                _ => break,
            };
            self.next()?;
            let rhs = self.parse_concat()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_concat(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_add()?;
        while self.eat(&TokenKind::Tilde)? {
            let rhs = self.parse_add()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::Concat, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek(0)?.map(|t| &t.kind) {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => break,
            };
            self.next()?;
            let rhs = self.parse_mul()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        while self.eat(&TokenKind::Star)? {
            let rhs = self.parse_unary()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::Mul, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat(&TokenKind::Minus)? {
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_filtered()
    }

    fn parse_filtered(&mut self) -> Result<Expr> {
        let mut expr = self.parse_postfix()?;
        while self.eat(&TokenKind::Pipe)? {
            let name = self.next_name()?;
            let args = if self.eat(&TokenKind::LParen)? {
                self.parse_arguments(TokenKind::RParen)?
            } else {
                Vec::new()
            };
            expr = self.make_filter(expr, &name, args);
        }
        Ok(expr)
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&TokenKind::Dot)? {
                let attr = self.next_name()?;
                expr = Expr::Attribute(Box::new(expr), attr);
            } else if self.eat(&TokenKind::LBracket)? {
                let index = self.parse_expression()?;
                self.expect(TokenKind::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if let (Expr::Name(name), true) = (&expr, self.test(&TokenKind::LParen)?) {
                let name = name.clone();
                self.next()?;
                let args = self.parse_arguments(TokenKind::RParen)?;
                expr = Expr::Call { name, args };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Comma separated expressions up to `close`, which is consumed.
    fn parse_arguments(&mut self, close: TokenKind) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(&close)? {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(close)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.next()?;
        let expr = match token.kind {
            TokenKind::Str(s) => Expr::Str(s),
            TokenKind::Int(i) => Expr::Int(i),
            TokenKind::Name(name) => match name.as_str() {
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                "null" | "none" => Expr::Null,
                _ => Expr::Name(name),
            },
            TokenKind::LParen => {
                let e = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                e
            }
            TokenKind::LBracket => Expr::List(self.parse_arguments(TokenKind::RBracket)?),
            TokenKind::LBrace => Expr::Map(self.parse_map()?),
            other => {
                return Err(Error::syntax(
                    format!("Unexpected token {other} (an expression was expected)"),
                    token.line,
                ));
            }
        };
        Ok(expr)
    }

    fn parse_map(&mut self) -> Result<Vec<(Expr, Expr)>> {
        let mut entries = Vec::new();
        if self.eat(&TokenKind::RBrace)? {
            return Ok(entries);
        }
        loop {
            let key = self.parse_expression()?;
            self.expect(TokenKind::Colon)?;
            let value = self.parse_expression()?;
            entries.push((key, value));
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Options;

    fn env_with(options: Options) -> Environment {
        Environment::new(options)
    }

    fn parse(source: &str) -> Result<Template> {
        let env = env_with(Options {
            autoescape: false,
            ..Options::default()
        });
        let mut parser = Parser::new(source, &env);
        parser.parse()
    }

    fn expr(source: &str) -> Expr {
        let env = Environment::default();
        Parser::for_expression(source, &env)
            .parse_standalone_expression()
            .unwrap()
    }

    #[test]
    fn text_and_print() {
        assert_eq!(
            parse("Hi {{ name }}!").unwrap(),
            vec![
                Node::Text("Hi ".into()),
                Node::Print(Expr::name("name")),
                Node::Text("!".into()),
            ]
        );
    }

    #[test]
    fn autoescape_wraps_prints_once() {
        let env = Environment::default();
        let nodes = Parser::new("{{ a }}{{ b|e }}{{ c|raw }}", &env).parse().unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::Print(Expr::filter(Expr::name("a"), "escape", vec![])),
                Node::Print(Expr::filter(Expr::name("b"), "e", vec![])),
                Node::Print(Expr::filter(Expr::name("c"), "raw", vec![])),
            ]
        );
    }

    #[test]
    fn sandbox_wraps_filter_inputs() {
        let env = env_with(Options {
            sandboxed: true,
            ..Options::default()
        });
        let nodes = Parser::new("{{ name|upper }}", &env).parse().unwrap();
        let upper = Expr::filter(Expr::ToString(Box::new(Expr::name("name"))), "upper", vec![]);
        assert_eq!(
            nodes,
            vec![Node::Print(Expr::filter(
                Expr::ToString(Box::new(upper)),
                "escape",
                vec![]
            ))]
        );
    }

    #[test]
    fn for_and_if_blocks() {
        let nodes = parse("{% for x in items %}{% if x %}y{% elif z %}w{% else %}n{% endif %}{% endfor %}")
            .unwrap();
        assert_eq!(
            nodes,
            vec![Node::For {
                target: "x".into(),
                iterable: Expr::name("items"),
                body: vec![Node::If {
                    cases: vec![
                        (Expr::name("x"), vec![Node::Text("y".into())]),
                        (Expr::name("z"), vec![Node::Text("w".into())]),
                    ],
                    else_body: Some(vec![Node::Text("n".into())]),
                }],
            }]
        );
    }

    #[test]
    fn unknown_tag_reports_line() {
        let err = parse("a\n\n{% blah %}").unwrap_err();
        assert_eq!(err, Error::syntax("Unknown \"blah\" tag", 3));
    }

    #[test]
    fn unclosed_block_is_an_error() {
        let err = parse("{% for x in y %}body").unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
        assert_eq!(err.to_string(), "Syntax error at line 1: Unexpected end of template");
    }

    #[test]
    fn expression_precedence() {
        assert_eq!(
            expr("a or b and not c == 'x'"),
            Expr::BinOp(
                Box::new(Expr::name("a")),
                BinOp::Or,
                Box::new(Expr::BinOp(
                    Box::new(Expr::name("b")),
                    BinOp::And,
                    Box::new(Expr::Not(Box::new(Expr::BinOp(
                        Box::new(Expr::name("c")),
                        BinOp::Eq,
                        Box::new(Expr::str("x")),
                    )))),
                )),
            )
        );
    }

    #[test]
    fn calls_lists_and_maps() {
        assert_eq!(
            expr(r#"f(["a", 1], {"%k%": -n|abs})"#),
            Expr::call(
                "f",
                vec![
                    Expr::List(vec![Expr::str("a"), Expr::Int(1)]),
                    Expr::Map(vec![(
                        Expr::str("%k%"),
                        Expr::Neg(Box::new(Expr::filter(Expr::name("n"), "abs", vec![]))),
                    )]),
                ]
            )
        );
    }

    #[test]
    fn attribute_and_index_access() {
        assert_eq!(
            expr("user.name[0]"),
            Expr::Index(
                Box::new(Expr::Attribute(Box::new(Expr::name("user")), "name".into())),
                Box::new(Expr::Int(0)),
            )
        );
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        let env = Environment::default();
        let err = Parser::for_expression("a b", &env)
            .parse_standalone_expression()
            .unwrap_err();
        assert!(err.to_string().contains("name \"b\""));
    }
}
