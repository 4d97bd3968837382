//! Error types for the FICS protocol engine

use thiserror::Error;

pub type FicsResult<T> = Result<T, FicsError>;

#[derive(Error, Debug)]
pub enum FicsError {
    #[error("Invalid connection config: {0}")]
    InvalidConfig(String),

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not connected")]
    NotConnected,

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Login outcome already decided")]
    LoginAlreadyResolved,

    #[error("Connection closed")]
    Disconnected,
}

/// A line matched a recognizer but one of its captured fields did not parse.
///
/// This means the grammar and the server output have diverged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("{tag} line has {found} fields, expected at least {expected}")]
    MissingFields {
        tag: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Bad {field} value: {value:?}")]
    BadField { field: &'static str, value: String },
}

impl GrammarError {
    pub(crate) fn bad(field: &'static str, value: impl Into<String>) -> Self {
        Self::BadField {
            field,
            value: value.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FenError {
    #[error("Board position rejected: {0}")]
    InvalidPosition(String),
}
