/// Errors raised while parsing, compiling or rendering a template.
///
/// Every parse-time variant carries the template line it was raised for;
/// a failed tag invalidates the whole template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Syntax error at line {line}: {message}")]
    Syntax { message: String, line: usize },

    #[error(
        "The text to be translated with \"trans\" can only contain references to simple variables (line {line})"
    )]
    UntranslatableContent { line: usize },

    #[error("A plural translation needs a count expression (line {line})")]
    PluralWithoutCount { line: usize },

    #[error("Render error: {0}")]
    Render(String),

    #[error("Invalid options: {0}")]
    Config(String),
}

impl Error {
    pub fn syntax(message: impl Into<String>, line: usize) -> Self {
        Error::Syntax {
            message: message.into(),
            line,
        }
    }

    /// Template line the error points at, when it has one.
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::Syntax { line, .. }
            | Error::UntranslatableContent { line }
            | Error::PluralWithoutCount { line } => Some(*line),
            Error::Render(_) | Error::Config(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
