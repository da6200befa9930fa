use serde::Deserialize;

use crate::error::{Error, Result};

/// Engine options.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use shimmyjinja_i18n::Options;
///
/// let options = Options::from_json(r#"{ "autoescape": false }"#).unwrap();
/// assert!(!options.autoescape);
/// assert_eq!(options.translate_function, "translate");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Drop the first newline after a block tag (`%}`).
    pub trim_blocks: bool,
    /// Wrap printed expressions in the escape filter unless they already
    /// go through `escape`, `e` or `raw`.
    pub autoescape: bool,
    /// Wrap every filter input in a string-coercion check.
    pub sandboxed: bool,
    pub translate_function: String,
    pub translate_plural_function: String,
    pub escape_function: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            trim_blocks: true,
            autoescape: true,
            sandboxed: false,
            translate_function: "translate".to_string(),
            translate_plural_function: "translate_plural".to_string(),
            escape_function: "escape".to_string(),
        }
    }
}

impl Options {
    pub fn from_json(source: &str) -> Result<Self> {
        serde_json::from_str(source).map_err(|e| Error::Config(e.to_string()))
    }
}
