//! The `{% trans %}` tag: grammar, message extraction and call generation.

pub mod extract;
pub mod parser;

use crate::ast::{Expr, Node};
use crate::compiler::Compiler;
use crate::config::Options;
use crate::error::{Error, Result};

pub use extract::{extract, Extracted, Message, Variable};
pub use parser::TransTagParser;

/// Singular text of a `trans` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum TransBody {
    /// `{% trans from domain expr %}`
    Inline(Expr),
    /// `{% trans from domain %}...{% endtrans %}`
    Nodes(Vec<Node>),
}

/// Runtime functions a translation call is emitted against.
pub struct CallTargets<'a> {
    pub translate: &'a str,
    pub translate_plural: &'a str,
    /// Wraps a non-raw placeholder value in the escaping call.
    pub escape: Box<dyn Fn(Expr) -> Expr + 'a>,
}

impl<'a> CallTargets<'a> {
    pub fn from_options(options: &'a Options) -> Self {
        Self {
            translate: &options.translate_function,
            translate_plural: &options.translate_plural_function,
            escape: Box::new(move |expr| Expr::call(options.escape_function.as_str(), vec![expr])),
        }
    }

    pub fn with_escaper(self, escape: impl Fn(Expr) -> Expr + 'a) -> Self {
        Self {
            escape: Box::new(escape),
            ..self
        }
    }
}

/// A parsed `trans` tag.
#[derive(Debug, Clone, PartialEq)]
pub struct TransNode {
    translation: TransBody,
    domain: Expr,
    count: Option<Expr>,
    plural: Option<Vec<Node>>,
    notes: Option<Vec<Node>>,
    line: usize,
}

impl TransNode {
    /// Fails with [`Error::PluralWithoutCount`] when `plural` is given
    /// without `count`.
    pub fn new(
        translation: TransBody,
        domain: Expr,
        count: Option<Expr>,
        plural: Option<Vec<Node>>,
        notes: Option<Vec<Node>>,
        line: usize,
    ) -> Result<Self> {
        if plural.is_some() && count.is_none() {
            return Err(Error::PluralWithoutCount { line });
        }
        Ok(Self {
            translation,
            domain,
            count,
            plural,
            notes,
            line,
        })
    }

    pub fn translation(&self) -> &TransBody {
        &self.translation
    }

    pub fn domain(&self) -> &Expr {
        &self.domain
    }

    pub fn count(&self) -> Option<&Expr> {
        self.count.as_ref()
    }

    pub fn plural(&self) -> Option<&[Node]> {
        self.plural.as_deref()
    }

    pub fn notes(&self) -> Option<&[Node]> {
        self.notes.as_deref()
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// Notes as a single trimmed line.
    pub fn notes_text(&self) -> Option<String> {
        let notes = self.notes.as_ref()?;
        let text: String = notes
            .iter()
            .filter_map(|node| match node {
                Node::Text(data) => Some(data.as_str()),
                _ => None,
            })
            .collect();
        Some(extract::trim_message(&text).replace(['\r', '\n'], " "))
    }

    /// Build the translation call this tag compiles to.
    ///
    /// Singular: `translate(message, domain[, map])`.
    /// Plural: `translate_plural([singular, plural], domain, abs(count)[, map])`.
    /// The map is only present when the messages hold placeholders.
    pub fn to_call(&self, targets: &CallTargets<'_>) -> Result<Expr> {
        let singular = extract(&self.translation, self.line)?;
        let mut variables = singular.variables;
        let message = singular.message.into_expr();

        let (function, mut args) = match (&self.plural, &self.count) {
            (None, _) => (targets.translate, vec![message, self.domain.clone()]),
            (Some(plural), Some(count)) => {
                let plural = extract::extract_nodes(plural, self.line)?;
                extract::union(&mut variables, plural.variables);
                let messages = Expr::List(vec![message, plural.message.into_expr()]);
                (
                    targets.translate_plural,
                    vec![messages, self.domain.clone(), abs(count)],
                )
            }
            (Some(_), None) => return Err(Error::PluralWithoutCount { line: self.line }),
        };

        if !variables.is_empty() {
            let entries = variables
                .iter()
                .map(|variable| {
                    let key = Expr::Str(format!("%{}%", variable.name));
                    (key, self.placeholder_value(variable, targets))
                })
                .collect();
            args.push(Expr::Map(entries));
        }

        Ok(Expr::call(function, args))
    }

    fn placeholder_value(&self, variable: &Variable, targets: &CallTargets<'_>) -> Expr {
        match &self.count {
            Some(count) if variable.name == "count" => abs(count),
            _ if variable.raw => Expr::name(variable.name.as_str()),
            _ => (targets.escape)(Expr::name(variable.name.as_str())),
        }
    }

    /// Emit the notes comment and the `emit(<call>);` statement.
    pub fn compile(&self, compiler: &mut Compiler<'_>) -> Result<()> {
        let options = compiler.env().options();
        let call = self.to_call(&CallTargets::from_options(options))?;

        compiler.add_debug_info(self.line);
        if let Some(notes) = self.notes_text() {
            compiler.write("// Translation Notes: ").raw(&notes).raw("\n");
        }
        compiler.write("emit(").subcompile(&call).raw(");\n");
        Ok(())
    }
}

fn abs(count: &Expr) -> Expr {
    Expr::call("abs", vec![count.clone()])
}
