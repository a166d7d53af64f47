//! Join planning for attribute references that live outside the searched table.

use sea_query::{JoinType, SimpleExpr};

use crate::config::{EntityTableMap, CONTEXTS, EXPERIMENTS, LATEST_METRICS, METRICS, RUNS};
use crate::statement::{column, column_ref};

/// A join the compiled filter needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinType,
    pub table: String,
    pub alias: Option<String>,
    pub on: SimpleExpr,
}

impl Join {
    /// The name the joined table is referred to by.
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

/// Collects the joins of one compile call.
///
/// Joins are only ever appended: one per distinct metric key, aliased
/// `metrics_<n>` in first-seen order, plus at most one context join and one
/// experiment join.
pub struct JoinPlanner<'a> {
    tables: &'a EntityTableMap,
    joins: Vec<Join>,
    /// metric key -> alias, in first-seen order
    metrics: Vec<(String, String)>,
    context: Option<String>,
    experiment: Option<String>,
}

impl<'a> JoinPlanner<'a> {
    pub fn new(tables: &'a EntityTableMap) -> Self {
        Self {
            tables,
            joins: Vec::new(),
            metrics: Vec::new(),
            context: None,
            experiment: None,
        }
    }

    /// Alias of the latest-metric join for `key`.
    pub fn metric(&mut self, key: &str) -> String {
        if let Some((_, alias)) = self.metrics.iter().find(|(k, _)| k == key) {
            return alias.clone();
        }

        let alias = format!("metrics_{}", self.metrics.len());
        let runs = self.tables.get_table_name(RUNS);
        let on = column(&runs, "run_uuid")
            .equals(column_ref(&alias, "run_uuid"))
            .and(column(&alias, "key").eq(key));

        tracing::trace!(key, alias = %alias, "planned metric join");
        self.joins.push(Join {
            kind: JoinType::LeftJoin,
            table: self.tables.get_table_name(LATEST_METRICS),
            alias: Some(alias.clone()),
            on,
        });
        self.metrics.push((key.to_string(), alias.clone()));
        alias
    }

    /// Table name of the context join.
    pub fn context(&mut self) -> String {
        if let Some(table) = &self.context {
            return table.clone();
        }

        let table = self.tables.get_table_name(CONTEXTS);
        let metrics = self.tables.get_table_name(METRICS);
        let on = column(&metrics, "context_id").equals(column_ref(&table, "id"));

        tracing::trace!(table = %table, "planned context join");
        self.joins.push(Join { kind: JoinType::LeftJoin, table: table.clone(), alias: None, on });
        self.context = Some(table.clone());
        table
    }

    /// Table name of the experiment join.
    pub fn experiment(&mut self) -> String {
        if let Some(table) = &self.experiment {
            return table.clone();
        }

        let table = self.tables.get_table_name(EXPERIMENTS);
        let runs = self.tables.get_table_name(RUNS);
        let on = column(&runs, "experiment_id").equals(column_ref(&table, "experiment_id"));

        tracing::trace!(table = %table, "planned experiment join");
        self.joins.push(Join { kind: JoinType::LeftJoin, table: table.clone(), alias: None, on });
        self.experiment = Some(table.clone());
        table
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn into_joins(self) -> Vec<Join> {
        self.joins
    }
}
