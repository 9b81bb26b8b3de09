//! Branch condition language.
//!
//! A condition is `<path> <operator> <literal>`:
//!
//! ```text
//! steps.0.output.score > 80
//! accumulated_context.step_0.requires_insights == true
//! metadata.pause_reason contains 'budget'
//! ```
//!
//! The path is a dotted walk into `ChainContext::to_evaluation_value()`.
//! Operators: `==`, `!=`, `>`, `<`, `>=`, `<=`, `contains`, `not_contains`.
//! The literal is the rest of the expression, optionally quoted with `'` or
//! `"`. An unquoted literal that itself contains a standalone operator is
//! rejected as ambiguous; quote it instead.
//!
//! Evaluation never fails: a missing path or a type mismatch is `false`.

use std::fmt;
use std::str::FromStr;

use agentflow_types::chain::ChainContext;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from parsing a condition string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    #[error("empty condition")]
    Empty,

    #[error("expected '<path> <operator> <literal>', got '{0}'")]
    Incomplete(String),

    #[error("invalid path '{0}'")]
    InvalidPath(String),

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("unterminated quote in '{0}'")]
    UnterminatedQuote(String),

    #[error("ambiguous literal '{0}': contains an operator, quote it")]
    AmbiguousLiteral(String),

    #[error("unexpected input after quoted literal: '{0}'")]
    TrailingInput(String),
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
    NotContains,
}

impl Operator {
    pub const ALL: [Operator; 8] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Lt,
        Operator::Ge,
        Operator::Le,
        Operator::Contains,
        Operator::NotContains,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == token)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub path: Vec<String>,
    pub operator: Operator,
    pub literal: String,
}

impl Condition {
    pub fn parse(expr: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(expr)?;
        if tokens.is_empty() {
            return Err(ConditionError::Empty);
        }
        if tokens.len() < 3 {
            return Err(ConditionError::Incomplete(expr.trim().to_string()));
        }

        let path_token = &tokens[0];
        if path_token.quoted || Operator::from_token(&path_token.text).is_some() {
            return Err(ConditionError::InvalidPath(path_token.text.clone()));
        }
        let path: Vec<String> = path_token.text.split('.').map(str::to_string).collect();
        if path.iter().any(|segment| segment.is_empty()) {
            return Err(ConditionError::InvalidPath(path_token.text.clone()));
        }

        let op_token = &tokens[1];
        let operator = match (op_token.quoted, Operator::from_token(&op_token.text)) {
            (false, Some(op)) => op,
            _ => return Err(ConditionError::UnknownOperator(op_token.text.clone())),
        };

        let rest = &tokens[2..];
        let literal = if rest[0].quoted {
            if rest.len() > 1 {
                return Err(ConditionError::TrailingInput(
                    expr[rest[1].start..].trim().to_string(),
                ));
            }
            rest[0].text.clone()
        } else {
            let raw = expr[rest[0].start..].trim().to_string();
            if rest.iter().any(|t| t.quoted || Operator::from_token(&t.text).is_some()) {
                return Err(ConditionError::AmbiguousLiteral(raw));
            }
            raw
        };

        Ok(Self {
            path,
            operator,
            literal,
        })
    }

    /// Evaluate against a JSON document. Missing paths and type mismatches
    /// are `false` for every operator.
    pub fn evaluate(&self, root: &Value) -> bool {
        let Some(actual) = resolve(root, &self.path) else {
            return false;
        };

        match self.operator {
            Operator::Eq => stringify(actual) == self.literal,
            Operator::Ne => stringify(actual) != self.literal,
            Operator::Gt | Operator::Lt | Operator::Ge | Operator::Le => {
                let (Some(lhs), Ok(rhs)) = (as_number(actual), self.literal.trim().parse::<f64>())
                else {
                    return false;
                };
                match self.operator {
                    Operator::Gt => lhs > rhs,
                    Operator::Lt => lhs < rhs,
                    Operator::Ge => lhs >= rhs,
                    _ => lhs <= rhs,
                }
            }
            Operator::Contains => actual
                .as_str()
                .is_some_and(|s| s.contains(self.literal.as_str())),
            Operator::NotContains => actual
                .as_str()
                .is_some_and(|s| !s.contains(self.literal.as_str())),
        }
    }
}

impl FromStr for Condition {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} '{}'", self.path.join("."), self.operator, self.literal)
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Token {
    text: String,
    quoted: bool,
    /// Byte offset of the token's first character in the source.
    start: usize,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, ConditionError> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '\'' || c == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            for (_, ch) in chars.by_ref() {
                if ch == c {
                    closed = true;
                    break;
                }
                text.push(ch);
            }
            if !closed {
                return Err(ConditionError::UnterminatedQuote(expr.to_string()));
            }
            tokens.push(Token {
                text,
                quoted: true,
                start,
            });
            continue;
        }

        let mut text = String::new();
        while let Some(&(_, ch)) = chars.peek() {
            if ch.is_whitespace() {
                break;
            }
            text.push(ch);
            chars.next();
        }
        tokens.push(Token {
            text,
            quoted: false,
            start,
        });
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Evaluation helpers
// ---------------------------------------------------------------------------

fn resolve<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ConditionEvaluator
// ---------------------------------------------------------------------------

/// Evaluates condition strings against a `ChainContext` snapshot.
///
/// Unparseable conditions evaluate to `false` and are logged at warn so a
/// typo in a branch does not go unnoticed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, expr: &str, chain: &ChainContext) -> bool {
        match Condition::parse(expr) {
            Ok(condition) => self.evaluate_parsed(&condition, chain),
            Err(e) => {
                tracing::warn!(condition = expr, error = %e, "unparseable condition, treating as false");
                false
            }
        }
    }

    pub fn evaluate_parsed(&self, condition: &Condition, chain: &ChainContext) -> bool {
        let result = condition.evaluate(&chain.to_evaluation_value());
        tracing::trace!(condition = %condition, result, "evaluated condition");
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
