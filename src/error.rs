//! Error types shared by the compiler pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::token::Span;

/// The single error kind a filter compile can produce.
///
/// Always terminal for the given input: the caller maps it to a bad-request
/// response and the user has to edit the filter text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error: {message} at '{fragment}'")]
pub struct SyntaxError {
    pub message: String,
    /// The offending piece of the source text.
    pub fragment: String,
    pub span: Option<Span>,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self { message: message.into(), fragment: fragment.into(), span: None }
    }

    pub fn at_position(message: impl Into<String>, fragment: impl Into<String>, span: Span) -> Self {
        Self { message: message.into(), fragment: fragment.into(), span: Some(span) }
    }
}

/// Errors raised while building a parser configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {}: {source}", .path.display())]
    InvalidFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot parse config: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("unknown SQL dialect '{0}', expected 'postgres' or 'sqlite'")]
    UnknownDialect(String),
}
