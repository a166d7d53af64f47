//! SQL compiler that turns filter expressions into joins and a WHERE predicate using sea-query.
//!
//! ```text
//! raw text -> lexer -> parser -> default injection (tree) -> resolver -> emitter -> CompiledQuery
//! ```

use sea_query::SimpleExpr;
use tracing::{debug, trace};

use crate::ast::Expression;
use crate::config::{EntityTableMap, Limits, MetricSelectors, ParserConfig};
use crate::default_filter::DefaultExpression;
use crate::dialect::{Dialect, Target};
use crate::error::{ConfigError, SyntaxError};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::planner::{Join, JoinPlanner};
use crate::resolver::{Reference, Resolved, Resolver};
use crate::statement::{column, StatementBuilder};

/// Compiles filter expressions for one dialect and one table layout.
///
/// Immutable once built, so a single instance can serve concurrent requests.
#[derive(Debug, Clone)]
pub struct QueryParser {
    default: DefaultExpression,
    tables: EntityTableMap,
    selectors: MetricSelectors,
    dialect: Dialect,
    limits: Limits,
}

/// The joins and predicate produced for one filter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledQuery {
    joins: Vec<Join>,
    condition: Option<SimpleExpr>,
}

impl QueryParser {
    pub fn new(default: DefaultExpression, tables: EntityTableMap, dialect: Dialect) -> Self {
        Self {
            default,
            tables,
            selectors: MetricSelectors::default(),
            dialect,
            limits: Limits::default(),
        }
    }

    pub fn with_selectors(mut self, selectors: MetricSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn from_config(config: ParserConfig) -> Result<Self, ConfigError> {
        let dialect = config.dialect.parse()?;
        Ok(Self::new(config.default, config.tables, dialect)
            .with_selectors(config.selectors)
            .with_limits(config.limits))
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn tables(&self) -> &EntityTableMap {
        &self.tables
    }

    /// Compiles `raw` into the joins and predicate it needs.
    pub fn compile(&self, raw: &str) -> Result<CompiledQuery, SyntaxError> {
        debug!(dialect = %self.dialect, length = raw.len(), "compiling filter");
        match self.compile_text(raw) {
            Ok(query) => {
                debug!(joins = query.joins.len(), "filter compiled");
                Ok(query)
            }
            Err(err) => {
                debug!(error = %err, "filter rejected");
                Err(err)
            }
        }
    }

    fn compile_text(&self, raw: &str) -> Result<CompiledQuery, SyntaxError> {
        if raw.len() > self.limits.max_length {
            return Err(SyntaxError::new(
                format!("filter is longer than {} bytes", self.limits.max_length),
                truncate(raw, 32),
            ));
        }

        let user = if raw.trim().is_empty() { None } else { Some(self.parse(raw)?) };
        let default = if self.default.applies_to(raw) {
            trace!(default = %self.default.expression, "default filter injected");
            Some(self.parse(&self.default.expression)?)
        } else {
            None
        };

        let ast = match (default, user) {
            (None, None) => return Ok(CompiledQuery::default()),
            (Some(expr), None) | (None, Some(expr)) => expr,
            (Some(default), Some(user)) => Expression::And(
                Box::new(Expression::Grouped(Box::new(default))),
                Box::new(Expression::Grouped(Box::new(user))),
            ),
        };

        let resolved = Resolver::new(&self.tables, &self.selectors).resolve(&ast)?;

        let mut emitter = Emitter {
            dialect: self.dialect,
            planner: JoinPlanner::new(&self.tables),
        };
        let condition = emitter.emit(&resolved, false);

        Ok(CompiledQuery {
            joins: emitter.planner.into_joins(),
            condition: Some(condition),
        })
    }

    /// Lexes and parses one text on its own, so error spans point into that text.
    fn parse(&self, text: &str) -> Result<Expression, SyntaxError> {
        let tokens: Vec<_> = Lexer::new(text).collect();
        Parser::new(text, &tokens)
            .with_max_depth(self.limits.max_depth)
            .parse()
    }
}

impl CompiledQuery {
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn condition(&self) -> Option<&SimpleExpr> {
        self.condition.as_ref()
    }

    /// True for a filter that adds nothing to a statement.
    pub fn is_empty(&self) -> bool {
        self.joins.is_empty() && self.condition.is_none()
    }

    /// Adds the joins in planned order, then the predicate.
    pub fn apply<B: StatementBuilder>(self, mut builder: B) -> B {
        for join in self.joins {
            builder.add_join(join);
        }
        if let Some(condition) = self.condition {
            builder.add_where(condition);
        }
        builder
    }
}

/// Walks a resolved expression, pushing negation down to the leaves.
struct Emitter<'a> {
    dialect: Dialect,
    planner: JoinPlanner<'a>,
}

impl Emitter<'_> {
    fn emit(&mut self, expr: &Resolved, negated: bool) -> SimpleExpr {
        match expr {
            Resolved::And(left, right) => {
                let left = self.emit(left, negated);
                let right = self.emit(right, negated);
                if negated { left.or(right) } else { left.and(right) }
            }
            Resolved::Or(left, right) => {
                let left = self.emit(left, negated);
                let right = self.emit(right, negated);
                if negated { left.and(right) } else { left.or(right) }
            }
            Resolved::Not(inner) => self.emit(inner, !negated),
            Resolved::Compare { op, target, value } => {
                let op = if negated { op.negate() } else { *op };
                let target = self.target(target);
                self.dialect.compare(target, op, value)
            }
            Resolved::Call { function, target, value } => {
                let target = self.target(target);
                self.dialect.matches(target, *function, value, negated)
            }
            Resolved::Flag(reference) => {
                let target = self.target(reference);
                let flag = self.dialect.operand(target);
                if negated { flag.not() } else { flag }
            }
        }
    }

    fn target(&mut self, reference: &Reference) -> Target {
        match reference {
            Reference::Column { table, column: name } => Target::Column(column(table, name).into()),
            Reference::Metric { key, column: name } => {
                let alias = self.planner.metric(key);
                Target::Column(column(&alias, name).into())
            }
            Reference::Context { key } => {
                let table = self.planner.context();
                Target::JsonField {
                    document: column(&table, "json").into(),
                    key: key.clone(),
                }
            }
            Reference::Experiment { column: name } => {
                let table = self.planner.experiment();
                Target::Column(column(&table, name).into())
            }
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
