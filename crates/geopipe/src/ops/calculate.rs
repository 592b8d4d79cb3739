//! Calculated columns.
//!
//! A calculate descriptor appends new columns computed from a restricted
//! arithmetic expression over existing columns: numeric literals, `+ - * /`,
//! right-associative `**`, unary minus, parentheses, the comparison operators
//! (`== != > < >= <=`, yielding 1.0/0.0) and a fixed whitelist of unary
//! numeric functions. Expressions are compiled once at construction time and
//! evaluated column-at-a-time; there is no general code-evaluation mechanism
//! behind this, the grammar below is all there is.
//!
//! Out-of-domain arithmetic (division by zero, `log` of a non-positive
//! value) produces the IEEE `inf`/`NaN` sentinels in the affected cells and
//! never aborts the pipeline.

use polars::prelude::*;
use serde::Deserialize;
use tracing::debug;

use crate::config::{Params, parse_params};
use crate::dataset::Dataset;
use crate::error::{ProcessingError, Result};
use crate::ops::Operator;
use crate::utils::to_f64_chunked;

/// Unary numeric functions available inside expressions.
const FUNCTIONS: [&str; 8] = ["log", "log10", "sqrt", "sin", "cos", "tan", "abs", "exp"];

#[derive(Debug, Clone, Deserialize)]
struct Calculation {
    new_column: String,
    expression: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CalculateParams {
    new_column: Option<String>,
    expression: Option<String>,
    calculations: Option<Vec<Calculation>>,
}

/// Appends expression-derived columns, in descriptor order. A later
/// expression may reference a column produced by an earlier one.
#[derive(Debug, Clone)]
pub struct CalculateOp {
    calculations: Vec<Compiled>,
}

#[derive(Debug, Clone)]
struct Compiled {
    new_column: String,
    expression: String,
    ast: Node,
}

impl CalculateOp {
    pub fn from_params(params: &Params) -> Result<Self> {
        let raw: CalculateParams = parse_params("calculate", params)?;

        let calculations = match raw.calculations {
            Some(list) => list,
            None => {
                let (Some(new_column), Some(expression)) = (raw.new_column, raw.expression) else {
                    return Err(ProcessingError::InvalidConfig(
                        "'calculate' descriptor requires either 'calculations' or \
                         'new_column' + 'expression'"
                            .to_string(),
                    ));
                };
                vec![Calculation {
                    new_column,
                    expression,
                }]
            }
        };

        let calculations = calculations
            .into_iter()
            .map(|c| {
                let ast = parse(&c.expression)?;
                Ok(Compiled {
                    new_column: c.new_column,
                    expression: c.expression,
                    ast,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { calculations })
    }
}

impl Operator for CalculateOp {
    fn name(&self) -> &'static str {
        "calculate"
    }

    fn apply(&self, dataset: &Dataset) -> Result<Dataset> {
        let mut df = dataset.df().clone();
        for calc in &self.calculations {
            let context = format!("calculate expression '{}'", calc.expression);
            let evaluated = eval(&calc.ast, &df, &context)?;
            let column = match evaluated {
                Evaluated::Column(ca) => ca,
                Evaluated::Scalar(v) => Float64Chunked::full("scalar".into(), v, df.height()),
            };
            let series = column.with_name(calc.new_column.as_str().into()).into_series();
            df.with_column(series)?;
            debug!("calculated column '{}'", calc.new_column);
        }
        Ok(dataset.derive(df))
    }
}

// =============================================================================
// Expression grammar
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl BinOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Pow => a.powf(b),
            Self::Eq => indicator(a == b),
            Self::Ne => indicator(a != b),
            Self::Gt => indicator(a > b),
            Self::Lt => indicator(a < b),
            Self::Ge => indicator(a >= b),
            Self::Le => indicator(a <= b),
        }
    }
}

fn indicator(condition: bool) -> f64 {
    if condition { 1.0 } else { 0.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Log,
    Log10,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Abs,
    Exp,
}

impl Func {
    fn apply(self, v: f64) -> f64 {
        match self {
            Self::Log => v.ln(),
            Self::Log10 => v.log10(),
            Self::Sqrt => v.sqrt(),
            Self::Sin => v.sin(),
            Self::Cos => v.cos(),
            Self::Tan => v.tan(),
            Self::Abs => v.abs(),
            Self::Exp => v.exp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Column(String),
    Neg(Box<Node>),
    Binary {
        op: BinOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Call {
        func: Func,
        arg: Box<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleStar,
    LParen,
    RParen,
    EqEq,
    NotEq,
    Gt,
    Lt,
    Ge,
    Le,
}

fn syntax_error(expression: &str, reason: impl Into<String>) -> ProcessingError {
    ProcessingError::ExpressionSyntax {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::DoubleStar);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(syntax_error(src, "single '=' is not an operator"));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    return Err(syntax_error(src, "unexpected '!'"));
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Scientific notation: 1e-3, 2.5E+6
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    i += 1;
                    if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
                        i += 1;
                    }
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| syntax_error(src, format!("invalid number '{text}'")))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(syntax_error(src, format!("unexpected character '{other}'"))),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

fn parse(expression: &str) -> Result<Node> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(syntax_error(expression, "empty expression"));
    }
    let mut parser = Parser {
        src: expression,
        tokens,
        pos: 0,
    };
    let node = parser.comparison()?;
    if parser.pos != parser.tokens.len() {
        return Err(syntax_error(expression, "trailing input after expression"));
    }
    Ok(node)
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn comparison(&mut self) -> Result<Node> {
        let mut lhs = self.additive()?;
        while let Some(op) = match self.peek() {
            Some(Token::EqEq) => Some(BinOp::Eq),
            Some(Token::NotEq) => Some(BinOp::Ne),
            Some(Token::Gt) => Some(BinOp::Gt),
            Some(Token::Lt) => Some(BinOp::Lt),
            Some(Token::Ge) => Some(BinOp::Ge),
            Some(Token::Le) => Some(BinOp::Le),
            _ => None,
        } {
            self.bump();
            let rhs = self.additive()?;
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Node> {
        let mut lhs = self.multiplicative()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinOp::Add),
            Some(Token::Minus) => Some(BinOp::Sub),
            _ => None,
        } {
            self.bump();
            let rhs = self.multiplicative()?;
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Node> {
        let mut lhs = self.unary()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinOp::Mul),
            Some(Token::Slash) => Some(BinOp::Div),
            _ => None,
        } {
            self.bump();
            let rhs = self.unary()?;
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Node> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.bump();
            // Power binds tighter than unary minus: -x**2 == -(x**2)
            return Ok(Node::Neg(Box::new(self.unary()?)));
        }
        self.power()
    }

    fn power(&mut self) -> Result<Node> {
        let base = self.primary()?;
        if matches!(self.peek(), Some(Token::DoubleStar)) {
            self.bump();
            // Right-associative: a ** b ** c == a ** (b ** c)
            let exponent = self.unary()?;
            return Ok(Node::Binary {
                op: BinOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Node> {
        match self.bump() {
            Some(Token::Number(value)) => Ok(Node::Number(value)),
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    let func = match name.as_str() {
                        "log" => Func::Log,
                        "log10" => Func::Log10,
                        "sqrt" => Func::Sqrt,
                        "sin" => Func::Sin,
                        "cos" => Func::Cos,
                        "tan" => Func::Tan,
                        "abs" => Func::Abs,
                        "exp" => Func::Exp,
                        other => {
                            return Err(syntax_error(
                                self.src,
                                format!("unknown function '{other}' (available: {FUNCTIONS:?})"),
                            ));
                        }
                    };
                    self.bump(); // consume '('
                    let arg = self.comparison()?;
                    match self.bump() {
                        Some(Token::RParen) => Ok(Node::Call {
                            func,
                            arg: Box::new(arg),
                        }),
                        _ => Err(syntax_error(self.src, "missing ')' after function argument")),
                    }
                } else {
                    Ok(Node::Column(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.comparison()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(syntax_error(self.src, "missing closing ')'")),
                }
            }
            other => Err(syntax_error(
                self.src,
                format!("expected a value, found {other:?}"),
            )),
        }
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Result of evaluating a subtree: either a scalar (broadcast lazily) or a
/// full column. Nulls propagate through every operation.
enum Evaluated {
    Scalar(f64),
    Column(Float64Chunked),
}

fn eval(node: &Node, df: &DataFrame, context: &str) -> Result<Evaluated> {
    match node {
        Node::Number(value) => Ok(Evaluated::Scalar(*value)),
        Node::Column(name) => {
            let column = df.column(name).map_err(|_| ProcessingError::MissingColumn {
                column: name.clone(),
                context: context.to_string(),
            })?;
            let ca = to_f64_chunked(column.as_materialized_series(), context)?;
            Ok(Evaluated::Column(ca))
        }
        Node::Neg(inner) => Ok(match eval(inner, df, context)? {
            Evaluated::Scalar(v) => Evaluated::Scalar(-v),
            Evaluated::Column(ca) => {
                Evaluated::Column((&ca).into_iter().map(|v| v.map(|x| -x)).collect())
            }
        }),
        Node::Call { func, arg } => Ok(match eval(arg, df, context)? {
            Evaluated::Scalar(v) => Evaluated::Scalar(func.apply(v)),
            Evaluated::Column(ca) => {
                Evaluated::Column((&ca).into_iter().map(|v| v.map(|x| func.apply(x))).collect())
            }
        }),
        Node::Binary { op, lhs, rhs } => {
            let lhs = eval(lhs, df, context)?;
            let rhs = eval(rhs, df, context)?;
            Ok(apply_binary(*op, lhs, rhs))
        }
    }
}

fn apply_binary(op: BinOp, lhs: Evaluated, rhs: Evaluated) -> Evaluated {
    match (lhs, rhs) {
        (Evaluated::Scalar(a), Evaluated::Scalar(b)) => Evaluated::Scalar(op.apply(a, b)),
        (Evaluated::Column(ca), Evaluated::Scalar(b)) => {
            Evaluated::Column((&ca).into_iter().map(|v| v.map(|a| op.apply(a, b))).collect())
        }
        (Evaluated::Scalar(a), Evaluated::Column(cb)) => {
            Evaluated::Column((&cb).into_iter().map(|v| v.map(|b| op.apply(a, b))).collect())
        }
        (Evaluated::Column(ca), Evaluated::Column(cb)) => Evaluated::Column(
            (&ca)
                .into_iter()
                .zip((&cb).into_iter())
                .map(|(a, b)| match (a, b) {
                    (Some(a), Some(b)) => Some(op.apply(a, b)),
                    _ => None,
                })
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset() -> Dataset {
        let df = df!(
            "population" => [1000.0f64, 2500.0, 400.0],
            "area" => [10.0f64, 0.0, 8.0],
        )
        .unwrap();
        Dataset::new(df)
    }

    fn calculate(params: serde_json::Value) -> Result<CalculateOp> {
        let serde_json::Value::Object(params) = params else {
            panic!("params must be an object");
        };
        CalculateOp::from_params(&params)
    }

    fn column_values(ds: &Dataset, name: &str) -> Vec<f64> {
        ds.column(name, "test")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect()
    }

    #[test]
    fn test_density_with_division_by_zero() {
        let op = calculate(json!({
            "new_column": "density",
            "expression": "population / area"
        }))
        .unwrap();
        let out = op.apply(&dataset()).unwrap();
        let density = column_values(&out, "density");
        assert_eq!(density[0], 100.0);
        // area == 0 yields the infinite sentinel, not an abort
        assert!(density[1].is_infinite());
        assert_eq!(density[2], 50.0);
    }

    #[test]
    fn test_operator_precedence() {
        let op = calculate(json!({"new_column": "x", "expression": "2 + 3 * 4"})).unwrap();
        assert_eq!(column_values(&op.apply(&dataset()).unwrap(), "x"), vec![14.0; 3]);
    }

    #[test]
    fn test_power_right_associative() {
        let op = calculate(json!({"new_column": "x", "expression": "2 ** 3 ** 2"})).unwrap();
        assert_eq!(column_values(&op.apply(&dataset()).unwrap(), "x"), vec![512.0; 3]);
    }

    #[test]
    fn test_unary_minus_binds_looser_than_power() {
        let op = calculate(json!({"new_column": "x", "expression": "-2 ** 2"})).unwrap();
        assert_eq!(column_values(&op.apply(&dataset()).unwrap(), "x"), vec![-4.0; 3]);
    }

    #[test]
    fn test_log_of_negative_is_nan() {
        let op = calculate(json!({"new_column": "x", "expression": "log(0 - population)"})).unwrap();
        let values = column_values(&op.apply(&dataset()).unwrap(), "x");
        assert!(values.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_chained_calculations_see_earlier_columns() {
        let op = calculate(json!({
            "calculations": [
                {"new_column": "density", "expression": "population / area"},
                {"new_column": "log_density", "expression": "log10(density)"}
            ]
        }))
        .unwrap();
        let out = op.apply(&dataset()).unwrap();
        assert_eq!(column_values(&out, "log_density")[0], 2.0);
    }

    #[test]
    fn test_noop_expression_copies_column() {
        let op = calculate(json!({"new_column": "copy", "expression": "population"})).unwrap();
        let ds = dataset();
        let out = op.apply(&ds).unwrap();
        assert_eq!(column_values(&out, "copy"), column_values(&ds, "population"));

        // Idempotent: applying again changes nothing but the copy itself
        let again = op.apply(&out).unwrap();
        assert_eq!(column_values(&again, "copy"), column_values(&ds, "population"));
    }

    #[test]
    fn test_comparison_yields_indicator() {
        let op = calculate(json!({"new_column": "big", "expression": "population > 500"})).unwrap();
        assert_eq!(
            column_values(&op.apply(&dataset()).unwrap(), "big"),
            vec![1.0, 1.0, 0.0]
        );
    }

    #[test]
    fn test_unknown_column() {
        let op = calculate(json!({"new_column": "x", "expression": "altitude * 2"})).unwrap();
        let err = op.apply(&dataset()).unwrap_err();
        assert_eq!(err.error_code(), "MISSING_COLUMN");
        assert!(err.to_string().contains("altitude"));
    }

    #[test]
    fn test_syntax_error_at_construction() {
        let err = calculate(json!({"new_column": "x", "expression": "population +"})).unwrap_err();
        assert_eq!(err.error_code(), "EXPRESSION_SYNTAX");

        let err = calculate(json!({"new_column": "x", "expression": "foo(population)"})).unwrap_err();
        assert_eq!(err.error_code(), "EXPRESSION_SYNTAX");
        assert!(err.to_string().contains("foo"));
    }

    #[test]
    fn test_scalar_expression_broadcasts() {
        let op = calculate(json!({"new_column": "x", "expression": "sqrt(16) + 1"})).unwrap();
        assert_eq!(column_values(&op.apply(&dataset()).unwrap(), "x"), vec![5.0; 3]);
    }
}
