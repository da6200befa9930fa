use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Text(String),
    BlockStart, // {%
    BlockEnd,   // %}
    VarStart,   // {{
    VarEnd,     // }}

    // Data
    Name(String),
    Str(String),
    Int(i64),

    // Symbols
    EqEq,     // ==
    NotEq,    // !=
    Lt,       // <
    Gt,       // >
    Plus,     // +
    Minus,    // -
    Star,     // *
    Tilde,    // ~
    Pipe,     // |
    Dot,      // .
    Comma,    // ,
    Colon,    // :
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    LBrace,   // {
    RBrace,   // }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            TokenKind::Text(_) => return f.write_str("text"),
            TokenKind::Name(name) => return write!(f, "name \"{name}\""),
            TokenKind::Str(value) => return write!(f, "string {value:?}"),
            TokenKind::Int(value) => return write!(f, "number {value}"),
            TokenKind::BlockStart => "{%",
            TokenKind::BlockEnd => "%}",
            TokenKind::VarStart => "{{",
            TokenKind::VarEnd => "}}",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Tilde => "~",
            TokenKind::Pipe => "|",
            TokenKind::Dot => ".",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
        };
        write!(f, "\"{symbol}\"")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

impl Token {
    /// True when this is a name token spelled `value`.
    pub fn is_name(&self, value: &str) -> bool {
        matches!(&self.kind, TokenKind::Name(n) if n == value)
    }
}

#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
    line: usize,
    in_tag: bool,
    // Open `{` inside a tag, so a map closing with `}}` is not read as VarEnd.
    brace_depth: usize,
    trim_blocks: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str, trim_blocks: bool) -> Self {
        Self {
            input,
            cursor: 0,
            line: 1,
            in_tag: false,
            brace_depth: 0,
            trim_blocks,
        }
    }

    /// Tokenizer for a bare expression, with no surrounding `{{ }}`.
    pub fn expression(input: &'a str) -> Self {
        Self {
            in_tag: true,
            ..Self::new(input, false)
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        let consumed = &self.input[self.cursor..self.cursor + n];
        self.line += consumed.matches('\n').count();
        self.cursor += n;
    }

    fn token(&self, kind: TokenKind, line: usize) -> Option<Token> {
        Some(Token { kind, line })
    }

    /// Consume raw source up to the next `{% <tag>` without tokenizing it.
    ///
    /// On success the tokenizer is left inside that block, just past `{%`,
    /// so the next token is the `tag` name itself.
    pub fn raw_until(&mut self, tag: &str) -> Option<String> {
        let rest = self.remaining();
        let mut offset = 0;
        while let Some(idx) = rest[offset..].find("{%") {
            let start = offset + idx;
            let inner = rest[start + 2..].trim_start();
            let is_tag = inner.starts_with(tag)
                && !inner[tag.len()..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
            if is_tag {
                let text = rest[..start].to_string();
                self.advance(start + 2);
                self.in_tag = true;
                self.brace_depth = 0;
                return Some(text);
            }
            offset = start + 2;
        }
        None
    }

    pub fn next_token(&mut self) -> Result<Option<Token>> {
        if self.remaining().is_empty() {
            return Ok(None);
        }
        if self.in_tag {
            self.next_tag_token()
        } else {
            Ok(self.next_text_token())
        }
    }

    fn next_text_token(&mut self) -> Option<Token> {
        let rest = self.remaining();
        let line = self.line;
        // Find next `{{` or `{%`
        let next_tag = rest.find("{%").into_iter().chain(rest.find("{{")).min();

        match next_tag {
            Some(0) => {
                self.advance(2);
                self.in_tag = true;
                self.brace_depth = 0;
                if rest.starts_with("{%") {
                    self.token(TokenKind::BlockStart, line)
                } else {
                    self.token(TokenKind::VarStart, line)
                }
            }
            Some(idx) => {
                let text = rest[..idx].to_string();
                self.advance(idx);
                self.token(TokenKind::Text(text), line)
            }
            None => {
                let text = rest.to_string();
                self.advance(rest.len());
                self.token(TokenKind::Text(text), line)
            }
        }
    }

    fn next_tag_token(&mut self) -> Result<Option<Token>> {
        let rest = self.remaining();
        let skipped = rest.len() - rest.trim_start().len();
        self.advance(skipped);

        let rest = self.remaining();
        let line = self.line;
        let Some(first) = rest.chars().next() else {
            return Ok(None);
        };

        if rest.starts_with("%}") {
            self.advance(2);
            self.in_tag = false;
            if self.trim_blocks {
                let after = self.remaining();
                if after.starts_with('\n') {
                    self.advance(1);
                } else if after.starts_with("\r\n") {
                    self.advance(2);
                }
            }
            return Ok(self.token(TokenKind::BlockEnd, line));
        }
        if rest.starts_with("}}") && self.brace_depth == 0 {
            self.advance(2);
            self.in_tag = false;
            return Ok(self.token(TokenKind::VarEnd, line));
        }

        for (symbol, kind) in [("==", TokenKind::EqEq), ("!=", TokenKind::NotEq)] {
            if rest.starts_with(symbol) {
                self.advance(2);
                return Ok(self.token(kind, line));
            }
        }

        let single = match first {
            '<' => Some(TokenKind::Lt),
            '>' => Some(TokenKind::Gt),
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Star),
            '~' => Some(TokenKind::Tilde),
            '|' => Some(TokenKind::Pipe),
            '.' => Some(TokenKind::Dot),
            ',' => Some(TokenKind::Comma),
            ':' => Some(TokenKind::Colon),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            '{' => {
                self.brace_depth += 1;
                Some(TokenKind::LBrace)
            }
            '}' => {
                self.brace_depth = self.brace_depth.saturating_sub(1);
                Some(TokenKind::RBrace)
            }
            _ => None,
        };
        if let Some(kind) = single {
            self.advance(1);
            return Ok(self.token(kind, line));
        }

        if first == '\'' || first == '"' {
            return self.string_literal(first, line).map(Some);
        }

        if first.is_ascii_digit() {
            let len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
            let digits = &rest[..len];
            let value = digits
                .parse::<i64>()
                .map_err(|_| Error::syntax(format!("Integer literal {digits} is out of range"), line))?;
            self.advance(len);
            return Ok(self.token(TokenKind::Int(value), line));
        }

        if first.is_ascii_alphabetic() || first == '_' {
            let len = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .count();
            let name = rest[..len].to_string();
            self.advance(len);
            return Ok(self.token(TokenKind::Name(name), line));
        }

        Err(Error::syntax(format!("Unexpected character {first:?}"), line))
    }

    fn string_literal(&mut self, quote: char, line: usize) -> Result<Token> {
        let rest = self.remaining();
        let mut value = String::new();
        let mut chars = rest.char_indices().skip(1);
        while let Some((idx, c)) = chars.next() {
            if c == quote {
                self.advance(idx + c.len_utf8());
                return Ok(Token {
                    kind: TokenKind::Str(value),
                    line,
                });
            }
            if c == '\\' {
                match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, esc)) => value.push(esc),
                    None => break,
                }
            } else {
                value.push(c);
            }
        }
        Err(Error::syntax("Unterminated string literal", line))
    }
}
