//! AST 定义：过滤表达式解析后的语法树

use std::fmt;

use crate::token::Span;

/// 过滤表达式树。解析完成后不可变。
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// 逻辑与运算 (and)
    And(Box<Expression>, Box<Expression>),
    /// 逻辑或运算 (or)
    Or(Box<Expression>, Box<Expression>),
    /// 逻辑非运算 (not)
    Not(Box<Expression>),
    /// 使用括号分组的表达式
    Grouped(Box<Expression>),
    /// 比较运算，属性总是在左侧, 例如：`run.name == 'run'`
    Comparison {
        op: CompOp,
        path: AttributePath,
        value: Literal,
    },
    /// 函数调用, 例如：`'run' in run.name`, `run.name.startswith('run')`
    Call {
        function: Function,
        path: AttributePath,
        value: Literal,
    },
    /// 单独作为条件使用的布尔属性, 例如：`not run.archived`
    Attribute(AttributePath),
}

impl Expression {
    /// 树高：and/or、not 与括号各算一层，叶子为 0
    pub fn height(&self) -> usize {
        match self {
            Expression::And(left, right) | Expression::Or(left, right) => 1 + left.height().max(right.height()),
            Expression::Not(inner) | Expression::Grouped(inner) => 1 + inner.height(),
            Expression::Comparison { .. } | Expression::Call { .. } | Expression::Attribute(_) => 0,
        }
    }
}

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Eq,    // ==
    NotEq, // !=
    Gt,    // >
    Lt,    // <
    Gte,   // >=
    Lte,   // <=
}

impl CompOp {
    /// 交换左右操作数后的等价运算符：`1 < x` 等价于 `x > 1`
    pub fn flip(self) -> Self {
        match self {
            CompOp::Eq => CompOp::Eq,
            CompOp::NotEq => CompOp::NotEq,
            CompOp::Gt => CompOp::Lt,
            CompOp::Lt => CompOp::Gt,
            CompOp::Gte => CompOp::Lte,
            CompOp::Lte => CompOp::Gte,
        }
    }

    /// 逻辑取反后的运算符：`not x < 1` 等价于 `x >= 1`
    pub fn negate(self) -> Self {
        match self {
            CompOp::Eq => CompOp::NotEq,
            CompOp::NotEq => CompOp::Eq,
            CompOp::Gt => CompOp::Lte,
            CompOp::Lt => CompOp::Gte,
            CompOp::Gte => CompOp::Lt,
            CompOp::Lte => CompOp::Gt,
        }
    }
}

/// 过滤语言支持的函数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// `'lit' in path`
    In,
    /// `'lit' not in path`
    NotIn,
    /// `path.startswith('lit')`
    StartsWith,
    /// `path.endswith('lit')`
    EndsWith,
    /// `re.match('lit', path)`
    ReMatch,
    /// `re.search('lit', path)`
    ReSearch,
}

impl Function {
    pub fn name(self) -> &'static str {
        match self {
            Function::In => "in",
            Function::NotIn => "not in",
            Function::StartsWith => "startswith",
            Function::EndsWith => "endswith",
            Function::ReMatch => "re.match",
            Function::ReSearch => "re.search",
        }
    }
}

/// 字面量值
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    None,
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "'{}'", s),
            Literal::Integer(n) => write!(f, "{}", n),
            Literal::Float(n) => write!(f, "{:?}", n),
            Literal::Bool(true) => f.write_str("True"),
            Literal::Bool(false) => f.write_str("False"),
            Literal::None => f.write_str("None"),
        }
    }
}

/// 属性路径中的一段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `.name`
    Field(String),
    /// `['key']`
    Index(String),
}

/// 属性路径, 例如：`run.name`, `run.metrics['loss'].last`, `metric.context.key1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePath {
    pub root: String,
    pub segments: Vec<Segment>,
    pub span: Span,
}

impl AttributePath {
    pub fn new(root: impl Into<String>, span: Span) -> Self {
        Self { root: root.into(), segments: Vec::new(), span }
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.segments.push(Segment::Field(name.into()));
        self
    }

    pub fn index(mut self, key: impl Into<String>) -> Self {
        self.segments.push(Segment::Index(key.into()));
        self
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for segment in &self.segments {
            match segment {
                Segment::Field(name) => write!(f, ".{}", name)?,
                Segment::Index(key) => write!(f, "['{}']", key)?,
            }
        }
        Ok(())
    }
}
