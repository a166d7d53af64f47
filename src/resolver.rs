//! Attribute resolution: maps attribute paths of the filter language onto the
//! logical schema of runs, metrics, contexts and experiments.

use crate::ast::{AttributePath, CompOp, Expression, Function, Literal, Segment};
use crate::config::{EntityTableMap, MetricSelectors, METRICS, RUNS};
use crate::error::SyntaxError;

/// run attribute -> runs column
///
/// `archived` is a real boolean column of `runs`, so `not run.archived` is a
/// plain column test. It is not derived from `lifecycle_stage`; the deleted
/// exclusion is appended separately by `SearchStatement`.
const RUN_ATTRIBUTES: &[(&str, &str)] = &[
    ("name", "name"),
    ("hash", "run_uuid"),
    ("status", "status"),
    ("user", "user_id"),
    ("start_time", "start_time"),
    ("end_time", "end_time"),
    ("experiment_id", "experiment_id"),
    ("archived", "archived"),
    ("artifact_uri", "artifact_uri"),
];

/// metric attribute -> metrics column
const METRIC_ATTRIBUTES: &[(&str, &str)] = &[
    ("name", "key"),
    ("value", "value"),
    ("step", "step"),
    ("timestamp", "timestamp"),
    ("iter", "iter"),
    ("is_nan", "is_nan"),
];

/// experiment attribute -> experiments column
const EXPERIMENT_ATTRIBUTES: &[(&str, &str)] = &[
    ("name", "name"),
    ("id", "experiment_id"),
    ("artifact_location", "artifact_location"),
];

/// Columns that may stand alone as a condition.
const BOOLEAN_COLUMNS: &[&str] = &["archived", "is_nan"];

/// Where the value of an attribute lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// A column of the searched table (or a table it is always joined with).
    Column { table: String, column: String },
    /// A column of the latest value of the metric `key`, needs a metric join.
    Metric { key: String, column: String },
    /// A key of the metric context JSON document, needs the context join.
    Context { key: String },
    /// A column of the run's experiment, needs the experiment join.
    Experiment { column: String },
}

impl Reference {
    fn is_boolean(&self) -> bool {
        match self {
            Reference::Column { column, .. }
            | Reference::Metric { column, .. }
            | Reference::Experiment { column } => BOOLEAN_COLUMNS.contains(&column.as_str()),
            Reference::Context { .. } => false,
        }
    }
}

/// An expression whose attribute paths have been resolved.
///
/// Groups are gone at this point; they only matter to the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    And(Box<Resolved>, Box<Resolved>),
    Or(Box<Resolved>, Box<Resolved>),
    Not(Box<Resolved>),
    Compare {
        op: CompOp,
        target: Reference,
        value: Literal,
    },
    Call {
        function: Function,
        target: Reference,
        value: String,
    },
    Flag(Reference),
}

pub struct Resolver<'a> {
    tables: &'a EntityTableMap,
    selectors: &'a MetricSelectors,
}

impl<'a> Resolver<'a> {
    pub fn new(tables: &'a EntityTableMap, selectors: &'a MetricSelectors) -> Self {
        Self { tables, selectors }
    }

    pub fn resolve(&self, expr: &Expression) -> Result<Resolved, SyntaxError> {
        match expr {
            Expression::And(left, right) => Ok(Resolved::And(
                Box::new(self.resolve(left)?),
                Box::new(self.resolve(right)?),
            )),
            Expression::Or(left, right) => Ok(Resolved::Or(
                Box::new(self.resolve(left)?),
                Box::new(self.resolve(right)?),
            )),
            Expression::Not(inner) => Ok(Resolved::Not(Box::new(self.resolve(inner)?))),
            Expression::Grouped(inner) => self.resolve(inner),
            Expression::Comparison { op, path, value } => Ok(Resolved::Compare {
                op: *op,
                target: self.reference(path)?,
                value: value.clone(),
            }),
            Expression::Call { function, path, value } => {
                let target = self.reference(path)?;
                let Some(value) = value.as_str() else {
                    return Err(error(
                        format!("{}() needs a string argument, got {}", function.name(), value),
                        path,
                    ));
                };
                Ok(Resolved::Call {
                    function: *function,
                    target,
                    value: value.to_string(),
                })
            }
            Expression::Attribute(path) => {
                let target = self.reference(path)?;
                if !target.is_boolean() {
                    return Err(error(
                        format!("'{}' is not a boolean attribute and needs a comparison", path),
                        path,
                    ));
                }
                Ok(Resolved::Flag(target))
            }
        }
    }

    /// Resolves a single attribute path.
    pub fn reference(&self, path: &AttributePath) -> Result<Reference, SyntaxError> {
        match path.root.as_str() {
            "run" => self.run_reference(path),
            "metric" => self.metric_reference(path),
            "experiment" => match path.segments.as_slice() {
                [Segment::Field(name)] => lookup(EXPERIMENT_ATTRIBUTES, name)
                    .map(|column| Reference::Experiment { column: column.to_string() })
                    .ok_or_else(|| error(format!("unknown experiment attribute '{}'", name), path)),
                _ => Err(error("unsupported experiment attribute", path)),
            },
            other => Err(error(
                format!("unknown entity '{}', expected 'run', 'metric' or 'experiment'", other),
                path,
            )),
        }
    }

    fn run_reference(&self, path: &AttributePath) -> Result<Reference, SyntaxError> {
        match path.segments.as_slice() {
            [] => Err(error("incomplete attribute", path)),
            [Segment::Field(name)] if name == "experiment" => Ok(Reference::Experiment {
                column: "name".to_string(),
            }),
            [Segment::Field(name)] if name == "metrics" => {
                Err(error("metric key is missing, expected run.metrics['<key>'].<selector>", path))
            }
            [Segment::Field(name)] => lookup(RUN_ATTRIBUTES, name)
                .map(|column| Reference::Column {
                    table: self.tables.get_table_name(RUNS),
                    column: column.to_string(),
                })
                .ok_or_else(|| error(format!("unknown run attribute '{}'", name), path)),
            [Segment::Field(metrics), Segment::Index(_)] if metrics == "metrics" => {
                Err(error(self.selector_hint("metric selector is missing"), path))
            }
            [Segment::Field(metrics), Segment::Index(key), Segment::Field(selector)] if metrics == "metrics" => {
                let column = self.selectors.column(selector).ok_or_else(|| {
                    error(self.selector_hint(&format!("unknown metric selector '{}'", selector)), path)
                })?;
                Ok(Reference::Metric {
                    key: key.clone(),
                    column: column.to_string(),
                })
            }
            _ => Err(error("unsupported run attribute", path)),
        }
    }

    fn metric_reference(&self, path: &AttributePath) -> Result<Reference, SyntaxError> {
        match path.segments.as_slice() {
            [] => Err(error("incomplete attribute", path)),
            [Segment::Field(context)] if context == "context" => {
                Err(error("context key is missing, expected metric.context.<key>", path))
            }
            [Segment::Field(context), Segment::Field(key) | Segment::Index(key)] if context == "context" => {
                Ok(Reference::Context { key: key.clone() })
            }
            [Segment::Field(context), _, _, ..] if context == "context" => {
                Err(error("nested context keys are not supported", path))
            }
            [Segment::Field(name)] => lookup(METRIC_ATTRIBUTES, name)
                .map(|column| Reference::Column {
                    table: self.tables.get_table_name(METRICS),
                    column: column.to_string(),
                })
                .ok_or_else(|| error(format!("unknown metric attribute '{}'", name), path)),
            _ => Err(error("unsupported metric attribute", path)),
        }
    }

    fn selector_hint(&self, message: &str) -> String {
        let known: Vec<_> = self.selectors.names().collect();
        format!("{}, expected one of: {}", message, known.join(", "))
    }
}

fn lookup(table: &[(&str, &'static str)], name: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(attribute, _)| *attribute == name)
        .map(|(_, column)| *column)
}

fn error(message: impl Into<String>, path: &AttributePath) -> SyntaxError {
    SyntaxError::at_position(message, path.to_string(), path.span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use pretty_assertions::assert_eq;

    fn resolve_with(input: &str, tables: &EntityTableMap) -> Result<Resolved, SyntaxError> {
        let tokens: Vec<_> = Lexer::new(input).collect();
        let ast = Parser::new(input, &tokens).parse()?;
        let selectors = MetricSelectors::default();
        Resolver::new(tables, &selectors).resolve(&ast)
    }

    fn resolve(input: &str) -> Result<Resolved, SyntaxError> {
        resolve_with(input, &EntityTableMap::default())
    }

    fn target(input: &str) -> Reference {
        match resolve(input).unwrap() {
            Resolved::Compare { target, .. } | Resolved::Call { target, .. } | Resolved::Flag(target) => target,
            other => panic!("Expected a leaf, got {:?}", other),
        }
    }

    #[test]
    fn test_run_columns() {
        assert_eq!(
            target("run.hash == 'abc'"),
            Reference::Column { table: "runs".to_string(), column: "run_uuid".to_string() }
        );
        assert_eq!(
            target("run.user == 'me'"),
            Reference::Column { table: "runs".to_string(), column: "user_id".to_string() }
        );
    }

    #[test]
    fn test_table_mapping_is_applied() {
        let tables = EntityTableMap::default().with("runs", "mlflow_runs");
        match resolve_with("run.name == 'a'", &tables).unwrap() {
            Resolved::Compare { target: Reference::Column { table, .. }, .. } => assert_eq!(table, "mlflow_runs"),
            other => panic!("Unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_metric_selectors() {
        assert_eq!(
            target("run.metrics['loss'].last < 1"),
            Reference::Metric { key: "loss".to_string(), column: "value".to_string() }
        );
        assert_eq!(
            target("run.metrics['loss'].last_step > 10"),
            Reference::Metric { key: "loss".to_string(), column: "step".to_string() }
        );

        let err = resolve("run.metrics['loss'].first < 1").unwrap_err();
        assert!(err.message.contains("unknown metric selector 'first'"));
        assert!(err.message.contains("last_step"));
        assert_eq!(err.fragment, "run.metrics['loss'].first");

        assert!(resolve("run.metrics['loss'] < 1").is_err());
        assert!(resolve("run.metrics < 1").is_err());
    }

    #[test]
    fn test_metric_context() {
        assert_eq!(target("metric.context.key1 == 'value1'"), Reference::Context { key: "key1".to_string() });
        assert_eq!(target("metric.context['key 1'] == 'value1'"), Reference::Context { key: "key 1".to_string() });

        let err = resolve("metric.context.parent.nested == 'value1'").unwrap_err();
        assert_eq!(err.message, "nested context keys are not supported");
        assert!(resolve("metric.context == 'value1'").is_err());
    }

    #[test]
    fn test_metric_columns() {
        assert_eq!(
            target("metric.name == 'loss'"),
            Reference::Column { table: "metrics".to_string(), column: "key".to_string() }
        );
    }

    #[test]
    fn test_experiment_references() {
        assert_eq!(target("run.experiment == 'default'"), Reference::Experiment { column: "name".to_string() });
        assert_eq!(target("experiment.id == 1"), Reference::Experiment { column: "experiment_id".to_string() });
        assert!(resolve("experiment.owner == 'me'").is_err());
    }

    #[test]
    fn test_unknown_attributes() {
        assert!(resolve("run.colour == 'red'").is_err());
        assert!(resolve("metric.colour == 'red'").is_err());
        assert!(resolve("param.lr == 1").is_err());
        assert!(resolve("run == 'a'").is_err());
        assert!(resolve("run.name.first == 'a'").is_err());
    }

    #[test]
    fn test_boolean_flags() {
        assert_eq!(
            resolve("not run.archived").unwrap(),
            Resolved::Not(Box::new(Resolved::Flag(Reference::Column {
                table: "runs".to_string(),
                column: "archived".to_string(),
            })))
        );
        assert!(resolve("run.metrics['loss'].is_nan").is_ok());

        let err = resolve("run.name").unwrap_err();
        assert!(err.message.contains("not a boolean attribute"));
    }

    #[test]
    fn test_groups_are_transparent() {
        assert_eq!(resolve("((run.name == 'a'))").unwrap(), resolve("run.name == 'a'").unwrap());
    }
}
