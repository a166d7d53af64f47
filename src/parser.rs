//! 过滤表达式的语法分析器
//!
//! ## 解析流程图
//!
//! ```text
//! parse()
//!   └─ parse_or_expression()
//!        ├─ parse_and_expression()
//!        │    ├─ parse_not_expression()
//!        │    │    ├─ "not" → 递归调用 parse_not_expression()
//!        │    │    └─ parse_comparison()
//!        │    │         ├─ parse_operand()
//!        │    │         │    ├─ "(" → 分组表达式 (递归调用 parse_or_expression)
//!        │    │         │    ├─ 字面值 (字符串、数字、True/False/None)
//!        │    │         │    └─ 标识符 → parse_postfix() → 属性路径 / parse_call()
//!        │    │         ├─ 比较运算符 → 比较操作
//!        │    │         ├─ "in" / "not in" → 包含检查
//!        │    │         ├─ "is" / "is not" → 空值检查
//!        │    │         └─ 其他 → 单独的布尔属性或函数调用
//!        │    │
//!        │    └─ 遇到 and 时，继续解析右侧 not 表达式，整条链组合成平衡树
//!        │
//!        └─ 遇到 or 时，继续解析右侧 and 表达式，整条链组合成平衡树
//! ```
//!
//! ## 语法优先级（从高到低）
//!
//! 1. **括号分组** `(expression)`
//! 2. **属性访问与调用** `run.name`, `run.metrics['loss'].last`, `run.name.startswith('a')`
//! 3. **比较操作** `==`, `!=`, `<`, `<=`, `>`, `>=`, `in`, `not in`, `is`, `is not`
//! 4. **not 操作**
//! 5. **and 操作**
//! 6. **or 操作**
//!
//! ## 解析示例
//!
//! ```text
//! run.name == 'run'
//! 'run' not in run.name
//! run.name.startswith('run') and run.metrics['loss'].last < -1.0
//! not (re.match('run', run.name))
//! metric.context.key1 != 'value1'
//! ```

use crate::ast::{AttributePath, CompOp, Expression, Function, Literal, Segment};
use crate::error::SyntaxError;
use crate::token::{Span, Token, TokenKind};

/// 默认允许的最大嵌套深度（括号、not 以及 and/or 组合后的树高）
pub const DEFAULT_MAX_DEPTH: usize = 64;

pub struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Token<'a>],
    position: usize,
    depth: usize,
    max_depth: usize,
}

/// 比较运算符两侧的操作数，组合成表达式之前的中间形态
#[derive(Debug)]
enum Operand {
    Path(AttributePath),
    Literal(Literal, Span),
    Call(Expression, Span),
    Group(Expression, Span),
}

impl Operand {
    fn span(&self) -> Span {
        match self {
            Operand::Path(path) => path.span,
            Operand::Literal(_, span) | Operand::Call(_, span) | Operand::Group(_, span) => *span,
        }
    }
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: &'a [Token<'a>]) -> Self {
        Self {
            source,
            tokens,
            position: 0,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// 返回当前 token，不推进位置
    fn peek(&self) -> Option<&'a Token<'a>> {
        self.tokens.get(self.position)
    }

    /// 返回当前位置之后第 n 个 token
    fn peek_nth(&self, n: usize) -> Option<&'a Token<'a>> {
        self.tokens.get(self.position + n)
    }

    /// 返回当前 token 并推进位置
    fn advance(&mut self) -> Option<&'a Token<'a>> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    /// 检查当前 token 是否匹配给定类型
    fn match_token(&self, kind: &TokenKind) -> bool {
        self.peek()
            .is_some_and(|token| std::mem::discriminant(&token.kind) == std::mem::discriminant(kind))
    }

    /// 期望特定类型的 token 并推进，否则返回错误
    fn expect(&mut self, expected: TokenKind) -> Result<&'a Token<'a>, SyntaxError> {
        match self.peek() {
            Some(token) if std::mem::discriminant(&token.kind) == std::mem::discriminant(&expected) => {
                self.position += 1;
                Ok(token)
            }
            Some(token) => Err(self.error_at(
                format!("expected {}, found {}", expected.describe(), token.kind.describe()),
                token.span,
            )),
            None => Err(self.end_of_input(&format!("expected {}", expected.describe()))),
        }
    }

    fn fragment(&self, span: Span) -> &'a str {
        self.source.get(span.start..span.end).unwrap_or_default()
    }

    fn error_at(&self, message: impl Into<String>, span: Span) -> SyntaxError {
        SyntaxError::at_position(message, self.fragment(span), span)
    }

    fn end_of_input(&self, message: &str) -> SyntaxError {
        let span = Span::new(self.source.len(), self.source.len());
        SyntaxError::at_position(format!("{}, but reached end of input", message), "", span)
    }

    /// 进入一层嵌套，超过上限时报错
    fn enter(&mut self, span: Span) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.error_at(
                format!("expression is nested deeper than {} levels", self.max_depth),
                span,
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    pub fn parse(&mut self) -> Result<Expression, SyntaxError> {
        if self.tokens.is_empty() {
            return Err(SyntaxError::new("empty filter expression", ""));
        }

        let expr = self.parse_or_expression()?;

        // 整个输入必须被消费完
        if let Some(token) = self.peek() {
            return Err(self.error_at(
                format!("unexpected {}", token.kind.describe()),
                token.span,
            ));
        }

        Ok(expr)
    }

    /// 解析 or 表达式 (最低优先级)
    ///
    /// 语法: `and_expr (or and_expr)*`
    fn parse_or_expression(&mut self) -> Result<Expression, SyntaxError> {
        let mut operands = vec![self.parse_and_expression()?];
        let mut operator = None;

        while let Some(token) = self.peek().filter(|t| t.kind == TokenKind::Or) {
            self.advance(); // 消费 or
            operator = Some(token.span);
            operands.push(self.parse_and_expression()?);
        }

        self.chain(operands, Expression::Or, operator)
    }

    /// 解析 and 表达式
    ///
    /// 语法: `not_expr (and not_expr)*`
    fn parse_and_expression(&mut self) -> Result<Expression, SyntaxError> {
        let mut operands = vec![self.parse_not_expression()?];
        let mut operator = None;

        while let Some(token) = self.peek().filter(|t| t.kind == TokenKind::And) {
            self.advance(); // 消费 and
            operator = Some(token.span);
            operands.push(self.parse_not_expression()?);
        }

        self.chain(operands, Expression::And, operator)
    }

    /// 把同一运算符连接的操作数组合成平衡树，保持从左到右的顺序
    ///
    /// `a or b or c` 仍然是 `(a or b) or c`，但长链的树高只随项数对数增长
    fn chain(
        &self,
        operands: Vec<Expression>,
        join: fn(Box<Expression>, Box<Expression>) -> Expression,
        operator: Option<Span>,
    ) -> Result<Expression, SyntaxError> {
        let expr = balance(operands, join).ok_or_else(|| self.end_of_input("expected an expression"))?;
        match operator {
            Some(span) => self.check_height(expr, span),
            None => Ok(expr),
        }
    }

    /// 树高超过上限时报错
    fn check_height(&self, expr: Expression, span: Span) -> Result<Expression, SyntaxError> {
        if expr.height() > self.max_depth {
            return Err(self.error_at(
                format!("expression is nested deeper than {} levels", self.max_depth),
                span,
            ));
        }
        Ok(expr)
    }

    /// 解析 not 表达式
    ///
    /// 语法: `not* comparison`
    /// 示例: `not run.archived`, `not (re.match('a', run.name))`
    fn parse_not_expression(&mut self) -> Result<Expression, SyntaxError> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Not => {
                self.advance(); // 消费 not
                self.enter(token.span)?;
                let expr = self.parse_not_expression()?; // 允许 not 链式调用
                self.leave();
                self.check_height(Expression::Not(Box::new(expr)), token.span)
            }
            _ => self.parse_comparison(),
        }
    }

    /// 解析比较、包含检查、空值检查，或单独的条件
    fn parse_comparison(&mut self) -> Result<Expression, SyntaxError> {
        let left = self.parse_operand()?;

        let Some(token) = self.peek() else {
            return self.into_condition(left);
        };

        match &token.kind {
            TokenKind::EqEq
            | TokenKind::NotEq
            | TokenKind::Gt
            | TokenKind::Lt
            | TokenKind::Gte
            | TokenKind::Lte => {
                let op = self.parse_comparison_operator()?;
                let right = self.parse_operand()?;
                self.build_comparison(op, left, right)
            }
            TokenKind::In => {
                self.advance(); // 消费 in
                let right = self.parse_operand()?;
                self.build_membership(Function::In, left, right)
            }
            TokenKind::Not if self.peek_nth(1).is_some_and(|t| t.kind == TokenKind::In) => {
                self.advance(); // 消费 not
                self.advance(); // 消费 in
                let right = self.parse_operand()?;
                self.build_membership(Function::NotIn, left, right)
            }
            TokenKind::Is => {
                self.advance(); // 消费 is
                let op = if self.match_token(&TokenKind::Not) {
                    self.advance(); // 消费 not
                    CompOp::NotEq
                } else {
                    CompOp::Eq
                };
                let right = self.parse_operand()?;
                match right {
                    Operand::Literal(Literal::None, _) => self.build_comparison(op, left, right),
                    other => Err(self.error_at("'is' can only be used with None", other.span())),
                }
            }
            _ => self.into_condition(left),
        }
    }

    fn parse_comparison_operator(&mut self) -> Result<CompOp, SyntaxError> {
        let Some(token) = self.advance() else {
            return Err(self.end_of_input("expected comparison operator"));
        };
        match &token.kind {
            TokenKind::EqEq => Ok(CompOp::Eq),
            TokenKind::NotEq => Ok(CompOp::NotEq),
            TokenKind::Gt => Ok(CompOp::Gt),
            TokenKind::Lt => Ok(CompOp::Lt),
            TokenKind::Gte => Ok(CompOp::Gte),
            TokenKind::Lte => Ok(CompOp::Lte),
            other => Err(self.error_at(
                format!("expected comparison operator, found {}", other.describe()),
                token.span,
            )),
        }
    }

    /// 没有运算符时，操作数本身必须能作为条件使用
    fn into_condition(&self, operand: Operand) -> Result<Expression, SyntaxError> {
        match operand {
            Operand::Path(path) => Ok(Expression::Attribute(path)),
            Operand::Call(expr, _) => Ok(expr),
            Operand::Group(expr, span) => self.check_height(Expression::Grouped(Box::new(expr)), span),
            Operand::Literal(_, span) => {
                Err(self.error_at("a literal cannot be used as a condition on its own", span))
            }
        }
    }

    fn build_comparison(&self, op: CompOp, left: Operand, right: Operand) -> Result<Expression, SyntaxError> {
        let span = left.span().to(right.span());
        let (op, path, value) = match (left, right) {
            (Operand::Path(path), Operand::Literal(value, _)) => (op, path, value),
            // 字面量在左侧时交换操作数
            (Operand::Literal(value, _), Operand::Path(path)) => (op.flip(), path, value),
            _ => {
                return Err(self.error_at(
                    "comparison needs an attribute on one side and a literal on the other",
                    span,
                ))
            }
        };

        if value == Literal::None && !matches!(op, CompOp::Eq | CompOp::NotEq) {
            return Err(self.error_at("None can only be compared with '==' or '!='", span));
        }

        Ok(Expression::Comparison { op, path, value })
    }

    /// `'lit' in path` / `'lit' not in path`
    fn build_membership(&self, function: Function, left: Operand, right: Operand) -> Result<Expression, SyntaxError> {
        let span = left.span().to(right.span());
        match (left, right) {
            (Operand::Literal(Literal::String(value), _), Operand::Path(path)) => Ok(Expression::Call {
                function,
                path,
                value: Literal::String(value),
            }),
            _ => Err(self.error_at(
                format!("'{}' expects a string literal on the left and an attribute on the right", function.name()),
                span,
            )),
        }
    }

    /// 解析操作数
    ///
    /// 支持的操作数类型:
    /// - `(expression)` - 分组表达式
    /// - `'text'`, `1`, `-1.5`, `True`, `False`, `None` - 字面值
    /// - `run.name`, `run.metrics['loss'].last` - 属性路径
    /// - `run.name.startswith('a')`, `re.match('a', run.name)` - 函数调用
    fn parse_operand(&mut self) -> Result<Operand, SyntaxError> {
        let Some(token) = self.advance() else {
            return Err(self.end_of_input("expected an attribute or a literal"));
        };

        match &token.kind {
            TokenKind::LParen => {
                self.enter(token.span)?;
                let expr = self.parse_or_expression()?;
                let close = self.expect(TokenKind::RParen)?;
                self.leave();
                Ok(Operand::Group(expr, token.span.to(close.span)))
            }
            TokenKind::Minus => {
                let Some(number) = self.advance() else {
                    return Err(self.end_of_input("expected a number after '-'"));
                };
                let span = token.span.to(number.span);
                let literal = match &number.kind {
                    TokenKind::Integer(digits) => self.parse_integer(&format!("-{}", digits), span)?,
                    TokenKind::Float(digits) => self.parse_float(&format!("-{}", digits), span)?,
                    other => {
                        return Err(self.error_at(
                            format!("expected a number after '-', found {}", other.describe()),
                            number.span,
                        ))
                    }
                };
                Ok(Operand::Literal(literal, span))
            }
            TokenKind::Integer(digits) => Ok(Operand::Literal(self.parse_integer(digits, token.span)?, token.span)),
            TokenKind::Float(digits) => Ok(Operand::Literal(self.parse_float(digits, token.span)?, token.span)),
            TokenKind::String(raw) => Ok(Operand::Literal(Literal::String(unescape(raw)), token.span)),
            TokenKind::True => Ok(Operand::Literal(Literal::Bool(true), token.span)),
            TokenKind::False => Ok(Operand::Literal(Literal::Bool(false), token.span)),
            TokenKind::None => Ok(Operand::Literal(Literal::None, token.span)),
            TokenKind::Identifier(name) => self.parse_postfix(AttributePath::new(*name, token.span)),
            TokenKind::UnterminatedString => Err(self.error_at("unterminated string literal", token.span)),
            other => Err(self.error_at(format!("unexpected {}", other.describe()), token.span)),
        }
    }

    fn parse_integer(&self, text: &str, span: Span) -> Result<Literal, SyntaxError> {
        text.parse::<i64>()
            .map(Literal::Integer)
            .map_err(|_| self.error_at("integer literal out of range", span))
    }

    fn parse_float(&self, text: &str, span: Span) -> Result<Literal, SyntaxError> {
        text.parse::<f64>()
            .map(Literal::Float)
            .map_err(|_| self.error_at("invalid float literal", span))
    }

    /// 解析属性访问链：`.field` 与 `['key']`，遇到 `(` 时转为函数调用
    fn parse_postfix(&mut self, mut path: AttributePath) -> Result<Operand, SyntaxError> {
        while let Some(token) = self.peek() {
            match &token.kind {
                TokenKind::Dot => {
                    self.advance(); // 消费 '.'
                    let field = self.expect(TokenKind::Identifier(""))?;
                    if let TokenKind::Identifier(name) = &field.kind {
                        path = path.field(*name);
                    }
                    path.span = path.span.to(field.span);
                }
                TokenKind::LBracket => {
                    self.advance(); // 消费 '['
                    let key = self.advance();
                    let key = match key.map(|t| (&t.kind, t.span)) {
                        Some((TokenKind::String(raw), _)) => unescape(raw),
                        Some((other, span)) => {
                            return Err(self.error_at(
                                format!("index must be a string literal, found {}", other.describe()),
                                span,
                            ))
                        }
                        None => return Err(self.end_of_input("expected a string index")),
                    };
                    let close = self.expect(TokenKind::RBracket)?;
                    path = path.index(key);
                    path.span = path.span.to(close.span);
                }
                TokenKind::LParen => return self.parse_call(path),
                _ => break,
            }
        }
        Ok(Operand::Path(path))
    }

    /// 解析函数调用
    ///
    /// - 自由函数: `re.match(pattern, path)`, `re.search(pattern, path)`
    /// - 方法调用: `path.startswith(text)`, `path.endswith(text)`
    fn parse_call(&mut self, mut callee: AttributePath) -> Result<Operand, SyntaxError> {
        let open = self.expect(TokenKind::LParen)?;
        self.enter(open.span)?;

        let mut args = Vec::new();
        if !self.match_token(&TokenKind::RParen) {
            loop {
                args.push(self.parse_operand()?);
                if self.match_token(&TokenKind::RParen) {
                    break;
                }
                self.expect(TokenKind::Comma)?;
            }
        }
        let close = self.expect(TokenKind::RParen)?;
        self.leave();

        let span = callee.span.to(close.span);
        let callee_text = callee.to_string();

        let regex = match (callee.root.as_str(), callee.segments.as_slice()) {
            ("re", [Segment::Field(name)]) if name == "match" => Some(Function::ReMatch),
            ("re", [Segment::Field(name)]) if name == "search" => Some(Function::ReSearch),
            _ => None,
        };

        if let Some(function) = regex {
            let mut args = args.into_iter();
            return match (args.next(), args.next(), args.next()) {
                (Some(Operand::Literal(Literal::String(pattern), _)), Some(Operand::Path(path)), None) => {
                    Ok(Operand::Call(
                        Expression::Call { function, path, value: Literal::String(pattern) },
                        span,
                    ))
                }
                _ => Err(self.error_at(
                    format!("{}() expects a string pattern and an attribute", callee_text),
                    span,
                )),
            };
        }

        // 方法调用：最后一段是方法名，前面的部分是接收者
        let function = match callee.segments.pop() {
            Some(Segment::Field(method)) if method == "startswith" => Function::StartsWith,
            Some(Segment::Field(method)) if method == "endswith" => Function::EndsWith,
            _ => return Err(self.error_at(format!("unknown function '{}'", callee_text), span)),
        };

        if callee.segments.is_empty() {
            return Err(self.error_at(
                format!("{}() must be called on an attribute", function.name()),
                span,
            ));
        }

        let mut args = args.into_iter();
        match (args.next(), args.next()) {
            (Some(Operand::Literal(Literal::String(text), _)), None) => Ok(Operand::Call(
                Expression::Call { function, path: callee, value: Literal::String(text) },
                span,
            )),
            _ => Err(self.error_at(
                format!("{}() expects exactly one string argument", function.name()),
                span,
            )),
        }
    }
}

fn balance(
    mut operands: Vec<Expression>,
    join: fn(Box<Expression>, Box<Expression>) -> Expression,
) -> Option<Expression> {
    if operands.len() <= 1 {
        return operands.pop();
    }
    let right = operands.split_off(operands.len().div_ceil(2));
    Some(join(Box::new(balance(operands, join)?), Box::new(balance(right, join)?)))
}

/// 处理字符串中的反斜杠转义
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(escaped @ ('\\' | '\'' | '"')) => out.push(escaped),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use pretty_assertions::assert_eq;

    fn parse_string(input: &str) -> Result<Expression, SyntaxError> {
        let tokens: Vec<_> = Lexer::new(input).collect();
        Parser::new(input, &tokens).parse()
    }

    fn path(text: &str) -> Vec<Segment> {
        let tokens: Vec<_> = Lexer::new(text).collect();
        match Parser::new(text, &tokens).parse().unwrap() {
            Expression::Attribute(path) => path.segments,
            other => panic!("Expected attribute, got {:?}", other),
        }
    }

    #[test]
    fn test_simple_comparison() {
        let result = parse_string("run.name == 'run'").unwrap();

        if let Expression::Comparison { op, path, value } = result {
            assert_eq!(op, CompOp::Eq);
            assert_eq!(path.root, "run");
            assert_eq!(path.segments, vec![Segment::Field("name".to_string())]);
            assert_eq!(value, Literal::String("run".to_string()));
        } else {
            panic!("Expected comparison");
        }
    }

    #[test]
    fn test_literal_on_left_is_flipped() {
        let result = parse_string("1 < run.metrics['loss'].last").unwrap();
        if let Expression::Comparison { op, value, .. } = result {
            assert_eq!(op, CompOp::Gt);
            assert_eq!(value, Literal::Integer(1));
        } else {
            panic!("Expected comparison");
        }
    }

    #[test]
    fn test_negative_numbers_keep_their_type() {
        let int = parse_string("run.metrics['my_metric'].last < -1").unwrap();
        let float = parse_string("run.metrics['my_metric'].last < -1.0").unwrap();

        match (int, float) {
            (
                Expression::Comparison { value: Literal::Integer(i), .. },
                Expression::Comparison { value: Literal::Float(f), .. },
            ) => {
                assert_eq!(i, -1);
                assert_eq!(f, -1.0);
            }
            other => panic!("Unexpected literals: {:?}", other),
        }
    }

    #[test]
    fn test_metric_path_segments() {
        assert_eq!(
            path("run.metrics['my_metric'].last"),
            vec![
                Segment::Field("metrics".to_string()),
                Segment::Index("my_metric".to_string()),
                Segment::Field("last".to_string()),
            ]
        );
    }

    #[test]
    fn test_membership() {
        let result = parse_string("'run' in run.name").unwrap();
        assert!(matches!(result, Expression::Call { function: Function::In, .. }));

        let result = parse_string("'run' not in run.name").unwrap();
        assert!(matches!(result, Expression::Call { function: Function::NotIn, .. }));
    }

    #[test]
    fn test_membership_requires_literal_on_the_left() {
        assert!(parse_string("run.name in 'run'").is_err());
        assert!(parse_string("1 in run.name").is_err());
    }

    #[test]
    fn test_method_calls() {
        let result = parse_string("(run.name.startswith('run'))").unwrap();
        if let Expression::Grouped(inner) = result {
            if let Expression::Call { function, path, value } = *inner {
                assert_eq!(function, Function::StartsWith);
                assert_eq!(path.to_string(), "run.name");
                assert_eq!(value, Literal::String("run".to_string()));
            } else {
                panic!("Expected call inside group");
            }
        } else {
            panic!("Expected grouped expression");
        }

        let result = parse_string("run.name.endswith('run')").unwrap();
        assert!(matches!(result, Expression::Call { function: Function::EndsWith, .. }));
    }

    #[test]
    fn test_regex_calls() {
        let result = parse_string("re.match('run', run.name)").unwrap();
        assert!(matches!(result, Expression::Call { function: Function::ReMatch, .. }));

        let result = parse_string("not (re.search('run', run.name))").unwrap();
        if let Expression::Not(inner) = result {
            if let Expression::Grouped(call) = *inner {
                assert!(matches!(*call, Expression::Call { function: Function::ReSearch, .. }));
            } else {
                panic!("Expected group inside not");
            }
        } else {
            panic!("Expected not");
        }
    }

    #[test]
    fn test_bad_call_arguments() {
        assert!(parse_string("re.match(run.name, 'run')").is_err());
        assert!(parse_string("re.match('run')").is_err());
        assert!(parse_string("run.name.startswith(1)").is_err());
        assert!(parse_string("run.name.startswith('a', 'b')").is_err());
        assert!(parse_string("startswith('a')").is_err());
        assert!(parse_string("run.name.lower('a')").is_err());
    }

    #[test]
    fn test_precedence_not_and_or() {
        // not > and > or
        let result = parse_string("not run.archived and run.name == 'a' or run.name == 'b'").unwrap();
        if let Expression::Or(left, _) = result {
            if let Expression::And(not, _) = *left {
                assert!(matches!(*not, Expression::Not(_)));
            } else {
                panic!("Expected and on the left of or");
            }
        } else {
            panic!("Expected or at the top");
        }
    }

    #[test]
    fn test_not_binds_looser_than_comparison() {
        let result = parse_string("not run.name == 'a'").unwrap();
        if let Expression::Not(inner) = result {
            assert!(matches!(*inner, Expression::Comparison { .. }));
        } else {
            panic!("Expected not");
        }
    }

    #[test]
    fn test_is_none() {
        let result = parse_string("run.end_time is None").unwrap();
        assert!(matches!(result, Expression::Comparison { op: CompOp::Eq, value: Literal::None, .. }));

        let result = parse_string("run.end_time is not None").unwrap();
        assert!(matches!(result, Expression::Comparison { op: CompOp::NotEq, value: Literal::None, .. }));

        assert!(parse_string("run.end_time is 1").is_err());
        assert!(parse_string("run.end_time < None").is_err());
    }

    #[test]
    fn test_string_escapes() {
        let result = parse_string(r"run.name == 'it\'s'").unwrap();
        if let Expression::Comparison { value, .. } = result {
            assert_eq!(value, Literal::String("it's".to_string()));
        } else {
            panic!("Expected comparison");
        }
    }

    #[test]
    fn test_syntax_errors_carry_fragment() {
        let err = parse_string("run.name = 'a'").unwrap_err();
        assert_eq!(err.fragment, "=");
        assert_eq!(err.span, Some(Span::new(9, 10)));

        let err = parse_string("run.name == 'a' )").unwrap_err();
        assert_eq!(err.fragment, ")");

        let err = parse_string("run.name == 'abc").unwrap_err();
        assert_eq!(err.message, "unterminated string literal");
    }

    #[test]
    fn test_unbalanced_parentheses() {
        assert!(parse_string("(run.name == 'a'").is_err());
        assert!(parse_string("run.name == 'a')").is_err());
        assert!(parse_string("((run.name == 'a')").is_err());
    }

    #[test]
    fn test_invalid_forms() {
        assert!(parse_string("").is_err());
        assert!(parse_string("'a' == 'b'").is_err());
        assert!(parse_string("run.name == run.status").is_err());
        assert!(parse_string("'a'").is_err());
        assert!(parse_string("run.metrics[0].last < 1").is_err());
        assert!(parse_string("run.name == 99999999999999999999").is_err());
        assert!(parse_string("run.name == - 'a'").is_err());
        assert!(parse_string("run.name ==").is_err());
    }

    #[test]
    fn test_max_depth() {
        let input = format!("{}run.archived{}", "(".repeat(5), ")".repeat(5));
        let tokens: Vec<_> = Lexer::new(&input).collect();
        assert!(Parser::new(&input, &tokens).with_max_depth(5).parse().is_ok());
        assert!(Parser::new(&input, &tokens).with_max_depth(4).parse().is_err());

        let input = "not not not run.archived";
        let tokens: Vec<_> = Lexer::new(input).collect();
        assert!(Parser::new(input, &tokens).with_max_depth(2).parse().is_err());
    }

    #[test]
    fn test_chains_count_toward_depth() {
        let parse_with = |input: &str, max_depth| {
            let tokens: Vec<_> = Lexer::new(input).collect();
            Parser::new(input, &tokens).with_max_depth(max_depth).parse()
        };

        let terms = |n| vec!["run.archived"; n].join(" or ");
        assert!(parse_with(&terms(4), 2).is_ok());
        let err = parse_with(&terms(5), 2).unwrap_err();
        assert_eq!(err.fragment, "or");

        // 括号与 and/or 叠加计算
        assert!(parse_with("(run.archived or run.archived) and run.archived", 3).is_ok());
        assert!(parse_with("(run.archived or run.archived) and run.archived", 2).is_err());
    }

    #[test]
    fn test_long_chains_are_balanced() {
        let input = vec!["run.name == 'a'"; 420].join(" or ");
        let result = parse_string(&input).unwrap();
        assert_eq!(result.height(), 9);

        // 短链保持从左到右的结构
        let result = parse_string("run.name == 'a' or run.name == 'b' or run.name == 'c'").unwrap();
        match result {
            Expression::Or(left, right) => {
                assert!(matches!(*left, Expression::Or(_, _)));
                assert!(matches!(*right, Expression::Comparison { value: Literal::String(ref v), .. } if v == "c"));
            }
            other => panic!("Expected or at the top, got {:?}", other),
        }
    }

    #[test]
    fn test_complex_query() {
        let input = "run.name.startswith('exp') and (run.metrics['loss'].last < 0.5 or 'bert' in run.name)";
        let result = parse_string(input).unwrap();

        if let Expression::And(left, right) = result {
            assert!(matches!(*left, Expression::Call { function: Function::StartsWith, .. }));
            if let Expression::Grouped(inner) = *right {
                assert!(matches!(*inner, Expression::Or(_, _)));
            } else {
                panic!("Expected grouped or on the right");
            }
        } else {
            panic!("Expected and at the top");
        }
    }
}
