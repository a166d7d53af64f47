//! The statement side of the compiler: sea-query identifiers, the builder seam a
//! compiled filter is applied to, and the run/metric search statements.

use sea_query::{Asterisk, Expr, Iden, JoinType, Query, SelectStatement, SimpleExpr, Values};

use crate::config::{EntityTableMap, METRICS, RUNS};
use crate::dialect::Dialect;
use crate::planner::Join;
use crate::sql_compiler::CompiledQuery;

/// Represents a table identifier for sea-query
#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// Name of a SQL function that sea-query does not know about, e.g. `IFNULL`
#[derive(Debug, Clone, Copy)]
pub struct SqlFunction(pub &'static str);

impl Iden for SqlFunction {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

pub fn column_ref(table: &str, column: &str) -> (TableName, ColumnName) {
    (TableName(table.to_string()), ColumnName(column.to_string()))
}

/// `"table"."column"`
pub fn column(table: &str, column: &str) -> Expr {
    Expr::col(column_ref(table, column))
}

/// Anything a compiled filter can be applied to.
pub trait StatementBuilder {
    fn add_join(&mut self, join: Join);
    fn add_where(&mut self, condition: SimpleExpr);
}

impl StatementBuilder for SelectStatement {
    fn add_join(&mut self, join: Join) {
        let table = TableName(join.table);
        match join.alias {
            Some(alias) => self.join_as(join.kind, table, TableName(alias), join.on),
            None => self.join(join.kind, table, join.on),
        };
    }

    fn add_where(&mut self, condition: SimpleExpr) {
        self.and_where(condition);
    }
}

/// Lifecycle stage value of runs hidden from every search.
const DELETED_STAGE: &str = "deleted";

/// A run or metric search, standing in for the persistence layer.
///
/// The exclusion of deleted runs is owned here and always comes last, after
/// whatever a compiled filter added.
#[derive(Debug, Clone)]
pub struct SearchStatement {
    select: SelectStatement,
    runs: String,
    dialect: Dialect,
}

impl SearchStatement {
    /// `SELECT "runs"."run_uuid" FROM "runs"`
    pub fn runs(tables: &EntityTableMap, dialect: Dialect) -> Self {
        let runs = tables.get_table_name(RUNS);
        let mut select = Query::select();
        select
            .column(column_ref(&runs, "run_uuid"))
            .from(TableName(runs.clone()));
        Self { select, runs, dialect }
    }

    /// `SELECT "metrics".* FROM "metrics" INNER JOIN "runs" ON ...`
    pub fn metrics(tables: &EntityTableMap, dialect: Dialect) -> Self {
        let runs = tables.get_table_name(RUNS);
        let metrics = tables.get_table_name(METRICS);
        let mut select = Query::select();
        select
            .column((TableName(metrics.clone()), Asterisk))
            .from(TableName(metrics.clone()))
            .join(
                JoinType::InnerJoin,
                TableName(runs.clone()),
                column(&metrics, "run_uuid").equals(column_ref(&runs, "run_uuid")),
            );
        Self { select, runs, dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn filter(self, query: CompiledQuery) -> Self {
        query.apply(self)
    }

    /// The final statement with placeholders and its bound values.
    pub fn build(&self) -> (String, Values) {
        self.dialect.build(&self.finish())
    }

    /// The final statement with values inlined.
    pub fn to_sql_string(&self) -> String {
        self.dialect.inline(&self.finish())
    }

    fn finish(&self) -> SelectStatement {
        let mut select = self.select.clone();
        select.and_where(column(&self.runs, "lifecycle_stage").ne(DELETED_STAGE));
        select
    }
}

impl StatementBuilder for SearchStatement {
    fn add_join(&mut self, join: Join) {
        self.select.add_join(join);
    }

    fn add_where(&mut self, condition: SimpleExpr) {
        self.select.add_where(condition);
    }
}
