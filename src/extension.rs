use crate::ast::Node;
use crate::config::Options;
use crate::error::Result;
use crate::parser::Parser;
use crate::trans::TransTagParser;

/// Parser for one custom block tag.
///
/// `parse` is called with the stream positioned just after the tag name;
/// it must consume everything up to and including the tag's final `%}`.
pub trait TagParser {
    fn tag(&self) -> &'static str;

    fn parse(&self, parser: &mut Parser<'_>, line: usize) -> Result<Node>;
}

/// A filter name bound to a runtime function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterBinding {
    pub name: &'static str,
    pub function: String,
}

pub trait Extension {
    fn name(&self) -> &'static str;

    fn token_parsers(&self) -> Vec<Box<dyn TagParser>> {
        Vec::new()
    }

    fn filters(&self, _options: &Options) -> Vec<FilterBinding> {
        Vec::new()
    }
}

/// Registers the `trans` tag and the `trans` filter.
///
/// The filter maps to the singular translation function only; plurals
/// need the tag.
#[derive(Debug, Default, Clone, Copy)]
pub struct I18nExtension;

impl Extension for I18nExtension {
    fn name(&self) -> &'static str {
        "i18n"
    }

    fn token_parsers(&self) -> Vec<Box<dyn TagParser>> {
        vec![Box::new(TransTagParser)]
    }

    fn filters(&self, options: &Options) -> Vec<FilterBinding> {
        vec![FilterBinding {
            name: "trans",
            function: options.translate_function.clone(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trans_filter_follows_configured_function() {
        let options = Options {
            translate_function: "t".to_string(),
            ..Options::default()
        };
        assert_eq!(
            I18nExtension.filters(&options),
            vec![FilterBinding {
                name: "trans",
                function: "t".to_string(),
            }]
        );
    }

    #[test]
    fn registers_trans_tag() {
        let tags: Vec<_> = I18nExtension.token_parsers().iter().map(|p| p.tag()).collect();
        assert_eq!(tags, vec!["trans"]);
    }
}
