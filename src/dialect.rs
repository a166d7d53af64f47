//! SQL dialect strategy.
//!
//! Each backend differs in how it spells regular-expression matching and JSON key
//! extraction, and in its placeholder syntax. The differences are captured in one
//! static [`Spelling`] table per dialect; everything else goes through sea-query.

use std::fmt;
use std::str::FromStr;

use sea_query::{
    BinOper, Expr, Func, PostgresQueryBuilder, SelectStatement, SimpleExpr, SqliteQueryBuilder, Value, Values,
};

use crate::ast::{CompOp, Function, Literal};
use crate::error::ConfigError;
use crate::statement::SqlFunction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

/// How a JSON key is passed to the extraction operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonPath {
    /// A text array path: `{key}`
    PathArray,
    /// The bare key: `key`
    Key,
}

/// Backend specific operator spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spelling {
    pub regex: &'static str,
    pub not_regex: &'static str,
    /// Function used to replace NULL before matching, if the backend needs it.
    pub coalesce: Option<&'static str>,
    pub json_extract: &'static str,
    pub json_path: JsonPath,
    /// Fallback document for a NULL JSON column.
    pub json_default: Option<&'static str>,
}

const POSTGRES: Spelling = Spelling {
    regex: "~",
    not_regex: "!~",
    coalesce: None,
    json_extract: "#>>",
    json_path: JsonPath::PathArray,
    json_default: None,
};

const SQLITE: Spelling = Spelling {
    regex: "REGEXP",
    not_regex: "NOT REGEXP",
    coalesce: Some("IFNULL"),
    json_extract: "->>",
    json_path: JsonPath::Key,
    json_default: Some("JSON('{}')"),
};

/// The left-hand side of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Column(SimpleExpr),
    /// `key` of the JSON document stored in `document`.
    JsonField { document: SimpleExpr, key: String },
}

impl Dialect {
    pub fn spelling(self) -> &'static Spelling {
        match self {
            Dialect::Postgres => &POSTGRES,
            Dialect::Sqlite => &SQLITE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Renders a statement with placeholders, returning the bound values in order.
    pub fn build(self, statement: &SelectStatement) -> (String, Values) {
        match self {
            Dialect::Postgres => statement.build(PostgresQueryBuilder),
            Dialect::Sqlite => statement.build(SqliteQueryBuilder),
        }
    }

    /// Renders a statement with all values inlined. For display only.
    pub fn inline(self, statement: &SelectStatement) -> String {
        match self {
            Dialect::Postgres => statement.to_string(PostgresQueryBuilder),
            Dialect::Sqlite => statement.to_string(SqliteQueryBuilder),
        }
    }

    /// `target <op> value`. Comparisons with `None` become `IS [NOT] NULL`.
    pub fn compare(self, target: Target, op: CompOp, value: &Literal) -> SimpleExpr {
        let lhs = Expr::expr(self.operand(target));
        let Some(value) = literal_value(value) else {
            return match op {
                CompOp::NotEq => lhs.is_not_null(),
                _ => lhs.is_null(),
            };
        };
        match op {
            CompOp::Eq => lhs.eq(value),
            CompOp::NotEq => lhs.ne(value),
            CompOp::Gt => lhs.gt(value),
            CompOp::Lt => lhs.lt(value),
            CompOp::Gte => lhs.gte(value),
            CompOp::Lte => lhs.lte(value),
        }
    }

    /// Pattern matching for the membership, prefix, suffix and regex functions.
    pub fn matches(self, target: Target, function: Function, value: &str, negated: bool) -> SimpleExpr {
        let pattern = match function {
            Function::In | Function::NotIn => format!("%{}%", value),
            Function::StartsWith => format!("{}%", value),
            Function::EndsWith => format!("%{}", value),
            Function::ReMatch => format!("^{}", value),
            Function::ReSearch => value.to_string(),
        };

        match function {
            Function::ReMatch | Function::ReSearch => {
                let spelling = self.spelling();
                let mut lhs = self.operand(target);
                if let Some(coalesce) = spelling.coalesce {
                    lhs = Func::cust(SqlFunction(coalesce))
                        .arg(lhs)
                        .arg(Expr::cust("''"))
                        .into();
                }
                let op = if negated { spelling.not_regex } else { spelling.regex };
                SimpleExpr::Binary(Box::new(lhs), BinOper::Custom(op), Box::new(pattern.into()))
            }
            _ => {
                let lhs = Expr::expr(self.operand(target));
                if (function == Function::NotIn) != negated {
                    lhs.not_like(pattern)
                } else {
                    lhs.like(pattern)
                }
            }
        }
    }

    /// Turns a target into a plain expression, extracting JSON fields as text.
    pub fn operand(self, target: Target) -> SimpleExpr {
        match target {
            Target::Column(expr) => expr,
            Target::JsonField { document, key } => {
                let spelling = self.spelling();
                let document = match spelling.json_default {
                    Some(default) => Func::cust(SqlFunction(spelling.coalesce.unwrap_or("COALESCE")))
                        .arg(document)
                        .arg(Expr::cust(default))
                        .into(),
                    None => document,
                };
                let path = match spelling.json_path {
                    JsonPath::PathArray => format!("{{{}}}", key),
                    JsonPath::Key => key,
                };
                SimpleExpr::Binary(
                    Box::new(document),
                    BinOper::Custom(spelling.json_extract),
                    Box::new(path.into()),
                )
            }
        }
    }
}

/// Bound value for a literal. `None` has no value, it is rendered as `NULL` checks.
pub fn literal_value(literal: &Literal) -> Option<Value> {
    match literal {
        Literal::String(s) => Some(Value::String(Some(Box::new(s.clone())))),
        Literal::Integer(n) => Some(Value::BigInt(Some(*n))),
        Literal::Float(n) => Some(Value::Double(Some(*n))),
        Literal::Bool(b) => Some(Value::Bool(Some(*b))),
        Literal::None => None,
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            _ => Err(ConfigError::UnknownDialect(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{column, ColumnName, TableName};
    use pretty_assertions::assert_eq;
    use sea_query::Query;

    fn name_column() -> Target {
        Target::Column(column("runs", "name").into())
    }

    fn context_field() -> Target {
        Target::JsonField {
            document: column("contexts", "json").into(),
            key: "key1".to_string(),
        }
    }

    fn render(dialect: Dialect, condition: SimpleExpr) -> (String, Values) {
        let mut select = Query::select();
        select
            .column(ColumnName("run_uuid".to_string()))
            .from(TableName("runs".to_string()))
            .and_where(condition);
        dialect.build(&select)
    }

    #[test]
    fn test_dialect_names() {
        assert_eq!("postgres".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("pg".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("sqlite3".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert!(matches!("mysql".parse::<Dialect>(), Err(ConfigError::UnknownDialect(name)) if name == "mysql"));
        assert_eq!(Dialect::Sqlite.to_string(), "sqlite");
    }

    #[test]
    fn test_like_patterns() {
        let cases = [
            (Function::In, false, "LIKE", "%run%"),
            (Function::NotIn, false, "NOT LIKE", "%run%"),
            (Function::In, true, "NOT LIKE", "%run%"),
            (Function::NotIn, true, "LIKE", "%run%"),
            (Function::StartsWith, false, "LIKE", "run%"),
            (Function::EndsWith, true, "NOT LIKE", "%run"),
        ];

        for (function, negated, keyword, pattern) in cases {
            let (sql, values) = render(Dialect::Postgres, Dialect::Postgres.matches(name_column(), function, "run", negated));
            assert!(sql.contains(&format!(r#""runs"."name" {} $1"#, keyword)), "{}", sql);
            assert_eq!(values, Values(vec![Value::from(pattern)]));
        }
    }

    #[test]
    fn test_postgres_regex() {
        let (sql, values) = render(Dialect::Postgres, Dialect::Postgres.matches(name_column(), Function::ReMatch, "run", false));
        assert!(sql.contains(r#""runs"."name" ~ $1"#), "{}", sql);
        assert_eq!(values, Values(vec![Value::from("^run")]));

        let (sql, values) = render(Dialect::Postgres, Dialect::Postgres.matches(name_column(), Function::ReSearch, "run", true));
        assert!(sql.contains(r#""runs"."name" !~ $1"#), "{}", sql);
        assert_eq!(values, Values(vec![Value::from("run")]));
    }

    #[test]
    fn test_sqlite_regex() {
        let (sql, values) = render(Dialect::Sqlite, Dialect::Sqlite.matches(name_column(), Function::ReMatch, "run", false));
        assert!(sql.contains(r#"IFNULL("runs"."name", '') REGEXP ?"#), "{}", sql);
        assert_eq!(values, Values(vec![Value::from("^run")]));

        let (sql, _) = render(Dialect::Sqlite, Dialect::Sqlite.matches(name_column(), Function::ReSearch, "run", true));
        assert!(sql.contains(r#"IFNULL("runs"."name", '') NOT REGEXP ?"#), "{}", sql);
    }

    #[test]
    fn test_json_extraction() {
        let (sql, values) = render(Dialect::Postgres, Dialect::Postgres.compare(context_field(), CompOp::Eq, &Literal::String("value1".to_string())));
        assert!(sql.contains(r#""contexts"."json" #>> $1"#), "{}", sql);
        assert_eq!(values, Values(vec![Value::from("{key1}"), Value::from("value1")]));

        let (sql, values) = render(Dialect::Sqlite, Dialect::Sqlite.compare(context_field(), CompOp::NotEq, &Literal::String("value1".to_string())));
        assert!(sql.contains(r#"IFNULL("contexts"."json", JSON('{}')) ->> ?"#), "{}", sql);
        assert!(sql.contains("<> ?"), "{}", sql);
        assert_eq!(values, Values(vec![Value::from("key1"), Value::from("value1")]));
    }

    #[test]
    fn test_literal_typing() {
        let (_, values) = render(Dialect::Postgres, Dialect::Postgres.compare(name_column(), CompOp::Lt, &Literal::Integer(-1)));
        assert_eq!(values, Values(vec![Value::BigInt(Some(-1))]));

        let (_, values) = render(Dialect::Postgres, Dialect::Postgres.compare(name_column(), CompOp::Lt, &Literal::Float(-1.0)));
        assert_eq!(values, Values(vec![Value::Double(Some(-1.0))]));

        let (_, values) = render(Dialect::Sqlite, Dialect::Sqlite.compare(name_column(), CompOp::Eq, &Literal::Bool(true)));
        assert_eq!(values, Values(vec![Value::Bool(Some(true))]));
    }

    #[test]
    fn test_none_comparisons() {
        let (sql, values) = render(Dialect::Postgres, Dialect::Postgres.compare(name_column(), CompOp::Eq, &Literal::None));
        assert!(sql.contains(r#""runs"."name" IS NULL"#), "{}", sql);
        assert!(values.0.is_empty());

        let (sql, _) = render(Dialect::Sqlite, Dialect::Sqlite.compare(name_column(), CompOp::NotEq, &Literal::None));
        assert!(sql.contains(r#""runs"."name" IS NOT NULL"#), "{}", sql);
    }
}
