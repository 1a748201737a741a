use std::fmt;
use std::io;

pub type OcraResult<T> = Result<T, Error>;

/// Errors that can occur while loading grammars or compiling patterns.
///
/// Tokenizing a line never returns an error: problems found at that point degrade the
/// output instead.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred when reading a grammar file
    Io(io::Error),

    /// JSON parsing failed when loading a grammar.
    Json(serde_json::Error),

    /// A regular expression could not be compiled by Oniguruma.
    #[allow(missing_docs)]
    PatternSyntax { pattern: String, message: String },

    /// The grammar is structurally invalid, eg a `begin` without `end` or `while`.
    /// `path` points at the offending rule, like `repository.string.patterns[1]`.
    #[allow(missing_docs)]
    GrammarFormat { path: String, message: String },

    /// No grammar with that scope name was found in the registry.
    GrammarNotFound(String),
}

impl Error {
    pub(crate) fn pattern_syntax(pattern: &str, err: onig::Error) -> Self {
        Error::PatternSyntax {
            pattern: pattern.to_owned(),
            message: err.to_string(),
        }
    }

    pub(crate) fn grammar_format(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::GrammarFormat {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Json(err) => write!(f, "JSON parsing error: {}", err),
            Error::PatternSyntax { pattern, message } => {
                write!(f, "invalid pattern '{}': {}", pattern, message)
            }
            Error::GrammarFormat { path, message } => {
                write!(f, "invalid grammar at '{}': {}", path, message)
            }
            Error::GrammarNotFound(name) => write!(f, "grammar '{}' not found", name),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::PatternSyntax { .. } | Error::GrammarFormat { .. } | Error::GrammarNotFound(_) => {
                None
            }
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
