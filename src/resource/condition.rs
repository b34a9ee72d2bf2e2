//! Conditions gating whether a configuration applies.

use crate::context::ExecutionContext;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Boolean expression evaluated against an execution context.
pub trait ConditionEvaluator: Send + Sync + fmt::Debug {
    /// Evaluate the condition.
    fn eval(&self, ctx: &ExecutionContext) -> bool;

    /// Source expression.
    fn expression(&self) -> &str;

    /// Evaluator kind name.
    fn kind(&self) -> &str;
}

/// Builds an evaluator from an expression and an optional subject.
pub type ConditionFactory =
    fn(&str, Option<&str>) -> Result<Arc<dyn ConditionEvaluator>, ConditionError>;

/// Errors raised while building conditions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("Unsupported condition evaluator '{kind}'")]
    UnsupportedKind { kind: String },

    #[error("Duplicate condition id '{id}'")]
    DuplicateId { id: String },

    #[error("Unknown condition id '{id}'")]
    UnknownId { id: String },

    #[error("Invalid condition expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },
}

impl ConditionError {
    fn invalid(expression: &str, reason: impl Into<String>) -> Self {
        Self::InvalidExpression {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Var(String),
    Literal(String),
}

impl Value {
    fn resolve(&self, ctx: &ExecutionContext) -> String {
        match self {
            Value::Var(name) => ctx.resolve(name).unwrap_or_default(),
            Value::Literal(value) => value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Term {
    negated: bool,
    left: Value,
    comparison: Option<(bool, Value)>,
}

impl Term {
    fn eval(&self, ctx: &ExecutionContext) -> bool {
        let left = self.left.resolve(ctx);
        let result = match &self.comparison {
            Some((equal, right)) => (left == right.resolve(ctx)) == *equal,
            None => is_truthy(&left),
        };
        result != self.negated
    }
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !value.eq_ignore_ascii_case("false") && value != "0"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Join {
    And,
    Or,
}

/// Context variable expression: `${env} == 'prod' && !${dry_run}`.
///
/// Terms are `${var}`, quoted literals, or bare words, optionally compared
/// with `==` / `!=` and negated with `!`. Terms are combined with `&&` and
/// `||` strictly left to right.
#[derive(Debug, Clone)]
pub struct ContextExpression {
    expression: String,
    first: Term,
    rest: Vec<(Join, Term)>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Value(Value),
    Eq,
    Ne,
    Not,
    And,
    Or,
}

impl ContextExpression {
    pub fn parse(expression: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(expression)?;
        let mut iter = tokens.into_iter().peekable();

        let first = parse_term(&mut iter, expression)?;
        let mut rest = Vec::new();
        while let Some(token) = iter.next() {
            let join = match token {
                Token::And => Join::And,
                Token::Or => Join::Or,
                other => {
                    return Err(ConditionError::invalid(
                        expression,
                        format!("expected '&&' or '||', found {:?}", other),
                    ))
                }
            };
            rest.push((join, parse_term(&mut iter, expression)?));
        }

        Ok(Self {
            expression: expression.to_string(),
            first,
            rest,
        })
    }
}

fn parse_term<I>(iter: &mut std::iter::Peekable<I>, expression: &str) -> Result<Term, ConditionError>
where
    I: Iterator<Item = Token>,
{
    let mut negated = false;
    while iter.peek() == Some(&Token::Not) {
        iter.next();
        negated = !negated;
    }

    let left = match iter.next() {
        Some(Token::Value(value)) => value,
        _ => return Err(ConditionError::invalid(expression, "expected a value")),
    };

    let comparison = match iter.peek() {
        Some(Token::Eq) | Some(Token::Ne) => {
            let equal = iter.next() == Some(Token::Eq);
            match iter.next() {
                Some(Token::Value(right)) => Some((equal, right)),
                _ => {
                    return Err(ConditionError::invalid(
                        expression,
                        "expected a value after comparison",
                    ))
                }
            }
        }
        _ => None,
    };

    Ok(Term {
        negated,
        left,
        comparison,
    })
}

fn tokenize(expression: &str) -> Result<Vec<Token>, ConditionError> {
    let mut tokens = Vec::new();
    let mut rest = expression.trim_start();

    while !rest.is_empty() {
        let (token, len) = if let Some(var) = rest.strip_prefix("${") {
            let end = var
                .find('}')
                .ok_or_else(|| ConditionError::invalid(expression, "unterminated '${'"))?;
            (Token::Value(Value::Var(var[..end].trim().to_string())), end + 3)
        } else if rest.starts_with('\'') || rest.starts_with('"') {
            let quote = &rest[..1];
            let end = rest[1..]
                .find(quote)
                .ok_or_else(|| ConditionError::invalid(expression, "unterminated literal"))?;
            (Token::Value(Value::Literal(rest[1..end + 1].to_string())), end + 2)
        } else if rest.starts_with("==") {
            (Token::Eq, 2)
        } else if rest.starts_with("!=") {
            (Token::Ne, 2)
        } else if rest.starts_with("&&") {
            (Token::And, 2)
        } else if rest.starts_with("||") {
            (Token::Or, 2)
        } else if rest.starts_with('!') {
            (Token::Not, 1)
        } else {
            let end = rest
                .find(|c: char| c.is_whitespace() || matches!(c, '!' | '=' | '&' | '|'))
                .unwrap_or(rest.len());
            if end == 0 {
                return Err(ConditionError::invalid(
                    expression,
                    format!("unexpected '{}'", &rest[..1]),
                ));
            }
            (Token::Value(Value::Literal(rest[..end].to_string())), end)
        };
        tokens.push(token);
        rest = rest[len..].trim_start();
    }

    if tokens.is_empty() {
        return Err(ConditionError::invalid(expression, "empty expression"));
    }
    Ok(tokens)
}

impl ConditionEvaluator for ContextExpression {
    fn eval(&self, ctx: &ExecutionContext) -> bool {
        self.rest
            .iter()
            .fold(self.first.eval(ctx), |acc, (join, term)| match join {
                Join::And => acc && term.eval(ctx),
                Join::Or => acc || term.eval(ctx),
            })
    }

    fn expression(&self) -> &str {
        &self.expression
    }

    fn kind(&self) -> &str {
        "context"
    }
}

/// Matches an interpolated subject against a regular expression.
#[derive(Debug, Clone)]
pub struct RegexCondition {
    expression: String,
    subject: String,
    regex: Regex,
}

impl RegexCondition {
    /// Subject used when none is given.
    pub const DEFAULT_SUBJECT: &'static str = "${document}";

    pub fn new(pattern: &str, subject: Option<&str>) -> Result<Self, ConditionError> {
        let regex = Regex::new(pattern).map_err(|e| ConditionError::invalid(pattern, e.to_string()))?;
        Ok(Self {
            expression: pattern.to_string(),
            subject: subject.unwrap_or(Self::DEFAULT_SUBJECT).to_string(),
            regex,
        })
    }
}

impl ConditionEvaluator for RegexCondition {
    fn eval(&self, ctx: &ExecutionContext) -> bool {
        self.regex.is_match(&ctx.interpolate(&self.subject))
    }

    fn expression(&self) -> &str {
        &self.expression
    }

    fn kind(&self) -> &str {
        "regex"
    }
}

/// Evaluator kinds and named conditions.
#[derive(Clone)]
pub struct ConditionRegistry {
    kinds: HashMap<String, ConditionFactory>,
    named: HashMap<String, Arc<dyn ConditionEvaluator>>,
}

impl fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.kinds.keys().collect();
        kinds.sort();
        let mut named: Vec<&String> = self.named.keys().collect();
        named.sort();
        f.debug_struct("ConditionRegistry")
            .field("kinds", &kinds)
            .field("named", &named)
            .finish()
    }
}

impl Default for ConditionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionRegistry {
    /// A registry with the `context` and `regex` kinds.
    pub fn new() -> Self {
        let mut registry = Self {
            kinds: HashMap::new(),
            named: HashMap::new(),
        };
        registry.register_kind("context", |expression, _| {
            Ok(Arc::new(ContextExpression::parse(expression)?))
        });
        registry.register_kind("regex", |expression, subject| {
            Ok(Arc::new(RegexCondition::new(expression, subject)?))
        });
        registry
    }

    pub fn register_kind(&mut self, kind: &str, factory: ConditionFactory) {
        self.kinds.insert(kind.to_ascii_lowercase(), factory);
    }

    /// Build an anonymous condition.
    pub fn create(
        &self,
        kind: &str,
        expression: &str,
        subject: Option<&str>,
    ) -> Result<Arc<dyn ConditionEvaluator>, ConditionError> {
        let factory = self
            .kinds
            .get(&kind.to_ascii_lowercase())
            .ok_or_else(|| ConditionError::UnsupportedKind {
                kind: kind.to_string(),
            })?;
        factory(expression, subject)
    }

    /// Build and register a named condition.
    pub fn define(
        &mut self,
        id: &str,
        kind: &str,
        expression: &str,
        subject: Option<&str>,
    ) -> Result<Arc<dyn ConditionEvaluator>, ConditionError> {
        if self.named.contains_key(id) {
            return Err(ConditionError::DuplicateId { id: id.to_string() });
        }
        let condition = self.create(kind, expression, subject)?;
        self.named.insert(id.to_string(), Arc::clone(&condition));
        Ok(condition)
    }

    /// Look up a named condition.
    pub fn get(&self, id: &str) -> Result<Arc<dyn ConditionEvaluator>, ConditionError> {
        self.named
            .get(id)
            .cloned()
            .ok_or_else(|| ConditionError::UnknownId { id: id.to_string() })
    }
}
