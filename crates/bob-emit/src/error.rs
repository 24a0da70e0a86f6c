use std::fmt;

/// Emission errors. Most failures are tied to a module or to a template
/// string, and the diagnostic must name the offender; the variants carry
/// that context so call sites don't format it by hand.
#[derive(Debug)]
pub enum Error {
    Msg(String),
    /// A module-level failure (invariant violation, unsupported feature,
    /// bad dependency), tagged with the declared module name.
    Module { module: String, reason: String },
    /// A template parse or execute failure, carrying the offending
    /// template text.
    Template { text: String, reason: String },
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Error::Msg(msg.into())
    }

    pub fn module<M: Into<String>, R: Into<String>>(module: M, reason: R) -> Self {
        Error::Module {
            module: module.into(),
            reason: reason.into(),
        }
    }

    pub fn template<T: Into<String>, R: Into<String>>(text: T, reason: R) -> Self {
        Error::Template {
            text: text.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Msg(msg) => write!(f, "{msg}"),
            Error::Module { module, reason } => write!(f, "module {module}: {reason}"),
            Error::Template { text, reason } => {
                write!(f, "failed to expand template '{text}': {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::msg(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
