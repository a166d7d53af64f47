//! Filter expression compiler for run and metric searches.
//!
//! Filters are written in a small Python-like language, e.g.
//! `run.name.startswith('bert') and run.metrics['loss'].last < 0.5`, and compiled into
//! sea-query joins and predicates for Postgres or SQLite.

pub mod ast;
pub mod config;
pub mod default_filter;
pub mod dialect;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod planner;
pub mod resolver;
pub mod sql_compiler;
pub mod statement;
pub mod token;

pub use config::{EntityTableMap, Limits, MetricSelectors, ParserConfig};
pub use default_filter::DefaultExpression;
pub use dialect::Dialect;
pub use error::{ConfigError, SyntaxError};
pub use planner::Join;
pub use sql_compiler::{CompiledQuery, QueryParser};
pub use statement::{SearchStatement, StatementBuilder};
