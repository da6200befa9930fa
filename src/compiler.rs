use crate::ast::{Expr, Node};
use crate::error::Result;
use crate::Environment;

/// Code emission buffer.
///
/// Templates compile to a small scripting form: one `emit(<expr>);`
/// statement per output-producing node, block statements for `if` and
/// `for`, and `// line N` markers ahead of translation calls.
pub struct Compiler<'a> {
    env: &'a Environment,
    source: String,
    indentation: usize,
}

impl<'a> Compiler<'a> {
    pub fn new(env: &'a Environment) -> Self {
        Self {
            env,
            source: String::new(),
            indentation: 0,
        }
    }

    pub fn env(&self) -> &'a Environment {
        self.env
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn into_source(self) -> String {
        self.source
    }

    /// Append `text` at the current indentation.
    pub fn write(&mut self, text: &str) -> &mut Self {
        for _ in 0..self.indentation {
            self.source.push_str("    ");
        }
        self.source.push_str(text);
        self
    }

    pub fn raw(&mut self, text: &str) -> &mut Self {
        self.source.push_str(text);
        self
    }

    /// Append a double-quoted string literal.
    pub fn string(&mut self, value: &str) -> &mut Self {
        self.source.push('"');
        for c in value.chars() {
            match c {
                '"' => self.source.push_str("\\\""),
                '\\' => self.source.push_str("\\\\"),
                '\n' => self.source.push_str("\\n"),
                '\r' => self.source.push_str("\\r"),
                '\t' => self.source.push_str("\\t"),
                _ => self.source.push(c),
            }
        }
        self.source.push('"');
        self
    }

    pub fn indent(&mut self) -> &mut Self {
        self.indentation += 1;
        self
    }

    pub fn outdent(&mut self) -> &mut Self {
        self.indentation = self.indentation.saturating_sub(1);
        self
    }

    pub fn add_debug_info(&mut self, line: usize) -> &mut Self {
        self.write(&format!("// line {line}\n"))
    }

    pub fn subcompile(&mut self, expr: &Expr) -> &mut Self {
        match expr {
            Expr::Str(s) => self.string(s),
            Expr::Int(i) => self.raw(&i.to_string()),
            Expr::Bool(b) => self.raw(if *b { "true" } else { "false" }),
            Expr::Null => self.raw("null"),
            Expr::Name(name) => self.raw(name),
            Expr::Attribute(obj, attr) => self.subcompile(obj).raw(".").raw(attr),
            Expr::Index(obj, index) => self.subcompile(obj).raw("[").subcompile(index).raw("]"),
            Expr::BinOp(lhs, op, rhs) => self
                .raw("(")
                .subcompile(lhs)
                .raw(" ")
                .raw(op.symbol())
                .raw(" ")
                .subcompile(rhs)
                .raw(")"),
            Expr::Not(inner) => self.raw("(not ").subcompile(inner).raw(")"),
            Expr::Neg(inner) => self.raw("(-").subcompile(inner).raw(")"),
            Expr::Filter { node, name, args } => {
                let env = self.env;
                let function = env.filter_function(name).unwrap_or(name.as_str());
                self.raw(function).raw("(").subcompile(node);
                for arg in args {
                    self.raw(", ").subcompile(arg);
                }
                self.raw(")")
            }
            Expr::ToString(inner) => self.raw("to_string(").subcompile(inner).raw(")"),
            Expr::Call { name, args } => self.raw(name).raw("(").list(args).raw(")"),
            Expr::List(items) => self.raw("[").list(items).raw("]"),
            Expr::Map(entries) => {
                self.raw("{");
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        self.raw(", ");
                    }
                    self.subcompile(key).raw(": ").subcompile(value);
                }
                self.raw("}")
            }
        }
    }

    fn list(&mut self, items: &[Expr]) -> &mut Self {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.raw(", ");
            }
            self.subcompile(item);
        }
        self
    }

    pub fn compile_nodes(&mut self, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            self.compile_node(node)?;
        }
        Ok(())
    }

    fn compile_node(&mut self, node: &Node) -> Result<()> {
        match node {
            Node::Text(text) => {
                self.write("emit(").string(text).raw(");\n");
            }
            Node::Print(expr) => {
                self.write("emit(").subcompile(expr).raw(");\n");
            }
            Node::For {
                target,
                iterable,
                body,
            } => {
                self.write("for ")
                    .raw(target)
                    .raw(" in ")
                    .subcompile(iterable)
                    .raw(" {\n")
                    .indent();
                self.compile_nodes(body)?;
                self.outdent().write("}\n");
            }
            Node::If { cases, else_body } => {
                for (i, (condition, body)) in cases.iter().enumerate() {
                    if i == 0 {
                        self.write("if ");
                    } else {
                        self.outdent().write("} else if ");
                    }
                    self.subcompile(condition).raw(" {\n").indent();
                    self.compile_nodes(body)?;
                }
                if let Some(body) = else_body {
                    self.outdent().write("} else {\n").indent();
                    self.compile_nodes(body)?;
                }
                self.outdent().write("}\n");
            }
            Node::Trans(trans) => trans.compile(self)?,
        }
        Ok(())
    }
}
