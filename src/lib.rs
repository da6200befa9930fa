//! shimmyjinja-i18n: the `{% trans %}` tag for a minimal Jinja-like engine.
//!
//! Authors mark translatable text with a block tag:
//!
//! ```text
//! {% trans from "shop" %}One item{% plural n %}{{ count }} items{% notes %}cart badge{% endtrans %}
//! ```
//!
//! The tag is parsed into a [`TransNode`] and compiled into a single call
//! against the runtime translation functions:
//!
//! ```text
//! // line 1
//! // Translation Notes: cart badge
//! emit(translate_plural(["One item", "%count% items"], "shop", abs(n), {"%count%": abs(n)}));
//! ```
//!
//! Variables in the text become `%name%` placeholders and are passed in a
//! substitution map. A variable printed through a filter (which includes
//! the autoescape filter) is escaped in the map; one printed bare is
//! passed as-is. `count` always maps to `abs(<count expression>)`.
//!
//! Supported subset of the host engine:
//! - Text, `{{ expr }}` with filters, `{% if %}` / `{% elif %}` /
//!   `{% else %}`, `{% for x in xs %}`.
//! - Expressions: literals, names, `.attr`, `[index]`, calls, lists, maps,
//!   `~ + - *`, comparisons, `and` / `or` / `not`.
//!
//! Not supported:
//! - Translation catalogs; plug one in through [`Translator`].
//! - Template caching, macros, inheritance.

pub mod ast;
pub mod compiler;
pub mod config;
pub mod error;
pub mod eval;
pub mod extension;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod trans;

use std::collections::HashMap;

pub use ast::{Expr, Node, Template};
pub use compiler::Compiler;
pub use config::Options;
pub use error::{Error, Result};
pub use eval::{Evaluator, Value};
pub use extension::{Extension, FilterBinding, I18nExtension, TagParser};
pub use parser::Parser;
pub use runtime::{Passthrough, Translator};
pub use trans::{CallTargets, TransBody, TransNode};

/// Options plus the tags and filters registered by extensions.
pub struct Environment {
    options: Options,
    extensions: Vec<&'static str>,
    tags: HashMap<&'static str, Box<dyn TagParser>>,
    filters: HashMap<&'static str, String>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Environment {
    /// Environment with the i18n extension registered.
    pub fn new(options: Options) -> Self {
        let mut env = Self::bare(options);
        env.add_extension(&I18nExtension);
        env
    }

    /// Environment without any extension.
    pub fn bare(options: Options) -> Self {
        Self {
            options,
            extensions: Vec::new(),
            tags: HashMap::new(),
            filters: HashMap::new(),
        }
    }

    pub fn add_extension(&mut self, extension: &dyn Extension) {
        for tag_parser in extension.token_parsers() {
            self.tags.insert(tag_parser.tag(), tag_parser);
        }
        for binding in extension.filters(&self.options) {
            self.filters.insert(binding.name, binding.function);
        }
        self.extensions.push(extension.name());
        tracing::debug!(extension = extension.name(), "registered extension");
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|registered| *registered == name)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn tag_parser(&self, tag: &str) -> Option<&dyn TagParser> {
        self.tags.get(tag).map(|parser| parser.as_ref())
    }

    /// Runtime function a registered filter compiles to.
    pub fn filter_function(&self, filter: &str) -> Option<&str> {
        self.filters.get(filter).map(String::as_str)
    }

    pub fn parse(&self, source: &str) -> Result<Template> {
        Parser::new(source, self).parse()
    }

    /// Parse a bare expression, e.g. one emitted by [`Environment::compile`].
    pub fn parse_expression(&self, source: &str) -> Result<Expr> {
        Parser::for_expression(source, self).parse_standalone_expression()
    }

    pub fn compile(&self, source: &str) -> Result<String> {
        let template = self.parse(source)?;
        let mut compiler = Compiler::new(self);
        compiler.compile_nodes(&template)?;
        tracing::debug!(nodes = template.len(), "compiled template");
        Ok(compiler.into_source())
    }

    pub fn render(
        &self,
        source: &str,
        context: HashMap<String, Value>,
        translator: &dyn Translator,
    ) -> Result<String> {
        let template = self.parse(source)?;
        Evaluator::new(self, translator, context).render(&template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registers_i18n() {
        let env = Environment::default();
        assert!(env.has_extension("i18n"));
        assert!(env.tag_parser("trans").is_some());
        assert_eq!(env.filter_function("trans"), Some("translate"));
    }

    #[test]
    fn bare_environment_rejects_trans() {
        let env = Environment::bare(Options::default());
        let err = env.parse("{% trans from 'app' %}x{% endtrans %}").unwrap_err();
        assert_eq!(err, Error::syntax("Unknown \"trans\" tag", 1));
    }

    #[test]
    fn compiles_singular_translation() {
        let env = Environment::default();
        let code = env
            .compile("{% trans from \"app\" %}Hello {{ name }}{% endtrans %}")
            .unwrap();
        assert_eq!(
            code,
            "// line 1\nemit(translate(\"Hello %name%\", \"app\", {\"%name%\": escape(name)}));\n"
        );
    }

    #[test]
    fn renders_singular_translation() {
        let env = Environment::default();
        let context = HashMap::from([("name".to_string(), Value::from("<Ann>"))]);
        let out = env
            .render(
                "{% trans from \"app\" %}Hello {{ name }}{% endtrans %}!",
                context,
                &Passthrough,
            )
            .unwrap();
        assert_eq!(out, "Hello &lt;Ann&gt;!");
    }

    #[test]
    fn trans_filter_translates_without_plural() {
        let env = Environment::default();
        let out = env
            .render("{{ 'Save'|trans('app') }}", HashMap::new(), &Passthrough)
            .unwrap();
        assert_eq!(out, "Save");
    }
}
