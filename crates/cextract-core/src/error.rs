//! Error types for cextract

use crate::location::Location;
use thiserror::Error;

/// Why a requested function name could not be used as a closure root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// No function declaration carries this name
    NotFound,
    /// The name exists but does not denote a function
    NotAFunction,
    /// More than one distinct function carries this name
    Ambiguous,
}

impl std::fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnresolvedReason::NotFound => write!(f, "not found"),
            UnresolvedReason::NotAFunction => write!(f, "not a function"),
            UnresolvedReason::Ambiguous => write!(f, "ambiguous"),
        }
    }
}

/// cextract error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Fatal: a requested function does not resolve to exactly one function.
    #[error("cannot extract `{name}` ({reason}) in {file}{}", format_candidates(.candidates))]
    UnresolvedSymbol {
        name: String,
        reason: UnresolvedReason,
        /// Translation unit the lookup ran against
        file: String,
        /// Locations of the conflicting declarations, if any
        candidates: Vec<Location>,
    },

    /// Recoverable: a macro was queried before any visible definition.
    #[error("no visible definition of macro `{name}` at {location}")]
    NoVisibleDefinition { name: String, location: Location },

    /// Recoverable: a folded array size matched no enum constant.
    #[error("no enum constant folds to {value} at {location}")]
    MalformedConstantFold { value: i64, location: Location },

    /// Fatal: two kept declarations overlap without one containing the other.
    #[error("declarations at {first} and {second} partially overlap")]
    RedundantDeclConflict { first: Location, second: Location },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Recoverable errors are handled inside the engine and never reach users.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NoVisibleDefinition { .. } | Error::MalformedConstantFold { .. }
        )
    }
}

fn format_candidates(candidates: &[Location]) -> String {
    if candidates.is_empty() {
        return String::new();
    }
    let list: Vec<String> = candidates.iter().map(|l| l.to_string()).collect();
    format!("; candidates: {}", list.join(", "))
}

/// Result type alias for cextract
pub type Result<T> = std::result::Result<T, Error>;
