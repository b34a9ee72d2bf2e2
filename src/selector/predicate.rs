//! Step predicates.
//!
//! A small XPath subset evaluated against a single node:
//!
//! ```text
//! expr    := and ("or" and)*
//! and     := cmp ("and" cmp)*
//! cmp     := "(" expr ")" | operand (op operand)?
//! operand := "@" qname | "text()" | 'literal' | "literal" | number
//! op      := "=" | "!=" | "<" | ">" | "<=" | ">="
//! ```
//!
//! A bare number is positional. Anything else outside the subset (functions
//! other than `text()`, child element values, axes, paths) is rejected.

use super::{NamespaceMappings, QName, SelectorError};
use crate::context::ExecutionContext;
use crate::node::Node;
use std::borrow::Cow;
use std::fmt;

/// A compiled step predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// No filtering. Attached to steps built by the legacy tokenizer.
    PassThru,
    /// 1-based position among same-named siblings.
    Position(usize),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Attribute(QName),
    Text,
    Literal(String),
    Number(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompareOp {
    fn is_ordering(self) -> bool {
        matches!(self, Self::Lt | Self::Gt | Self::Le | Self::Ge)
    }

    fn compare_numbers(self, left: f64, right: f64) -> bool {
        match self {
            Self::Eq => left == right,
            Self::Ne => left != right,
            Self::Lt => left < right,
            Self::Gt => left > right,
            Self::Le => left <= right,
            Self::Ge => left >= right,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
        }
    }
}

impl Predicate {
    /// Parse the content of one `[...]` predicate.
    pub fn parse(expr: &str, selector: &str) -> Result<Self, SelectorError> {
        let tokens = tokenize(expr, selector)?;
        if tokens.is_empty() {
            return Err(SelectorError::parse(selector, "empty predicate"));
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            selector,
        };
        let predicate = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            return Err(SelectorError::parse(
                selector,
                format!("unexpected token in predicate '{}'", expr),
            ));
        }
        Ok(predicate)
    }

    /// Conjunction of two predicates. `PassThru` is the identity.
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::PassThru, p) | (p, Predicate::PassThru) => p,
            (l, r) => Predicate::And(Box::new(l), Box::new(r)),
        }
    }

    /// Evaluate against a node.
    pub fn evaluate<N: Node>(&self, node: &N, ctx: &ExecutionContext) -> bool {
        match self {
            Predicate::PassThru => true,
            Predicate::Position(position) => node.position() == *position,
            Predicate::And(l, r) => l.evaluate(node, ctx) && r.evaluate(node, ctx),
            Predicate::Or(l, r) => l.evaluate(node, ctx) || r.evaluate(node, ctx),
            Predicate::Compare { left, op, right } => compare(left, *op, right, node, ctx),
        }
    }

    /// Whether `text()` appears anywhere in the predicate.
    pub fn uses_text(&self) -> bool {
        match self {
            Predicate::Compare { left, right, .. } => {
                matches!(left, Operand::Text) || matches!(right, Operand::Text)
            }
            Predicate::And(l, r) | Predicate::Or(l, r) => l.uses_text() || r.uses_text(),
            _ => false,
        }
    }

    pub(crate) fn bind(
        &mut self,
        mappings: &NamespaceMappings,
        selector: &str,
    ) -> Result<(), SelectorError> {
        match self {
            Predicate::Compare { left, right, .. } => {
                for operand in [left, right] {
                    if let Operand::Attribute(name) = operand {
                        name.bind(mappings, selector)?;
                    }
                }
                Ok(())
            }
            Predicate::And(l, r) | Predicate::Or(l, r) => {
                l.bind(mappings, selector)?;
                r.bind(mappings, selector)
            }
            _ => Ok(()),
        }
    }

    /// Re-parseable source form (the content of a `[...]`).
    pub fn to_source(&self) -> String {
        fn nested(p: &Predicate) -> String {
            match p {
                Predicate::And(..) | Predicate::Or(..) => format!("({})", p.to_source()),
                _ => p.to_source(),
            }
        }

        match self {
            Predicate::PassThru => String::new(),
            Predicate::Position(position) => position.to_string(),
            Predicate::Compare { left, op, right } => {
                format!("{} {} {}", left, op.as_str(), right)
            }
            Predicate::And(l, r) => format!("{} and {}", nested(l), nested(r)),
            Predicate::Or(l, r) => format!("{} or {}", nested(l), nested(r)),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::PassThru => Ok(()),
            Predicate::Position(position) => write!(f, "[{}]", position),
            Predicate::Compare { left, op, right } => {
                write!(f, "({} {} {})", left, op.as_str(), right)
            }
            Predicate::And(l, r) => write!(f, "({} and {})", l, r),
            Predicate::Or(l, r) => write!(f, "({} or {})", l, r),
        }
    }
}

impl Operand {
    fn resolve<'a, N: Node>(
        &'a self,
        node: &'a N,
        ctx: &ExecutionContext,
    ) -> Option<Cow<'a, str>> {
        match self {
            Operand::Attribute(name) => node
                .attribute(name.local_part(), name.namespace())
                .map(Cow::Borrowed),
            Operand::Text => node.text().map(Cow::Owned),
            Operand::Literal(value) if value.contains("${") => {
                Some(Cow::Owned(ctx.interpolate(value)))
            }
            Operand::Literal(value) => Some(Cow::Borrowed(value)),
            Operand::Number(n) => Some(Cow::Owned(n.to_string())),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Attribute(name) => write!(f, "@{}", name.to_source()),
            Operand::Text => f.write_str("text()"),
            Operand::Literal(value) if value.contains('\'') => write!(f, "\"{}\"", value),
            Operand::Literal(value) => write!(f, "'{}'", value),
            Operand::Number(n) => write!(f, "{}", n),
        }
    }
}

fn compare<N: Node>(
    left: &Operand,
    op: CompareOp,
    right: &Operand,
    node: &N,
    ctx: &ExecutionContext,
) -> bool {
    let numeric = op.is_ordering()
        || matches!(left, Operand::Number(_))
        || matches!(right, Operand::Number(_));

    let (Some(l), Some(r)) = (left.resolve(node, ctx), right.resolve(node, ctx)) else {
        return false;
    };

    if numeric {
        match (l.trim().parse::<f64>(), r.trim().parse::<f64>()) {
            (Ok(l), Ok(r)) => op.compare_numbers(l, r),
            _ => false,
        }
    } else {
        match op {
            CompareOp::Eq => l == r,
            CompareOp::Ne => l != r,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    At,
    Name(String),
    Call(String),
    Str(String),
    Num(f64),
    Op(CompareOp),
}

fn tokenize(expr: &str, selector: &str) -> Result<Vec<Token>, SelectorError> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '@' => {
                tokens.push(Token::At);
                i += 1;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|ch| *ch == c)
                    .ok_or_else(|| SelectorError::parse(selector, "unterminated string literal"))?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '=' => {
                tokens.push(Token::Op(CompareOp::Eq));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CompareOp::Ne));
                i += 2;
            }
            '<' | '>' => {
                let or_equal = chars.get(i + 1) == Some(&'=');
                let op = match (c, or_equal) {
                    ('<', false) => CompareOp::Lt,
                    ('<', true) => CompareOp::Le,
                    (_, false) => CompareOp::Gt,
                    (_, true) => CompareOp::Ge,
                };
                tokens.push(Token::Op(op));
                i += if or_equal { 2 } else { 1 };
            }
            c if c.is_ascii_digit()
                || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) =>
            {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text.parse::<f64>().map_err(|_| {
                    SelectorError::parse(selector, format!("invalid number '{}'", text))
                })?;
                tokens.push(Token::Num(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '-' | '.' | ':'))
                {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                if name.contains("::") {
                    return Err(SelectorError::parse(
                        selector,
                        format!("unsupported axis in '{}'", name),
                    ));
                }

                if name == "and" || name == "or" {
                    tokens.push(Token::Name(name));
                    continue;
                }

                let mut j = i;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if chars.get(j) == Some(&'(') {
                    let mut k = j + 1;
                    while k < chars.len() && chars[k].is_whitespace() {
                        k += 1;
                    }
                    if chars.get(k) != Some(&')') {
                        return Err(SelectorError::parse(
                            selector,
                            format!("unsupported function arguments in '{}()'", name),
                        ));
                    }
                    tokens.push(Token::Call(name));
                    i = k + 1;
                } else {
                    tokens.push(Token::Name(name));
                }
            }
            '/' | '.' => {
                return Err(SelectorError::parse(
                    selector,
                    "paths are not supported inside predicates",
                ));
            }
            other => {
                return Err(SelectorError::parse(
                    selector,
                    format!("unexpected character '{}' in predicate", other),
                ));
            }
        }
    }

    Ok(tokens)
}

struct Parser<'s> {
    tokens: Vec<Token>,
    pos: usize,
    selector: &'s str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(name)) if name == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, reason: impl Into<String>) -> SelectorError {
        SelectorError::parse(self.selector, reason)
    }

    fn parse_or(&mut self) -> Result<Predicate, SelectorError> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Predicate, SelectorError> {
        let mut left = self.parse_cmp()?;
        while self.eat_keyword("and") {
            let right = self.parse_cmp()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_cmp(&mut self) -> Result<Predicate, SelectorError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            if self.next() != Some(Token::RParen) {
                return Err(self.error("unbalanced parentheses in predicate"));
            }
            return Ok(inner);
        }

        let left = self.parse_operand()?;
        if let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.parse_operand()?;
            return Ok(Predicate::Compare { left, op, right });
        }

        match left {
            Operand::Number(n) if n >= 1.0 && n.fract() == 0.0 => {
                Ok(Predicate::Position(n as usize))
            }
            Operand::Number(n) => Err(self.error(format!("invalid position '{}'", n))),
            other => Err(self.error(format!("unsupported expr token '{}'", other))),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, SelectorError> {
        match self.next() {
            Some(Token::At) => match self.next() {
                Some(Token::Name(name)) => Ok(Operand::Attribute(QName::parse(&name))),
                _ => Err(self.error("expected attribute name after '@'")),
            },
            Some(Token::Call(name)) if name == "text" => Ok(Operand::Text),
            Some(Token::Call(name)) => Err(self.error(format!("unsupported function '{}()'", name))),
            Some(Token::Str(value)) => Ok(Operand::Literal(value)),
            Some(Token::Num(n)) => Ok(Operand::Number(n)),
            Some(Token::Name(name)) => Err(self.error(format!("unsupported expr token '{}'", name))),
            Some(other) => Err(self.error(format!("unexpected token {:?}", other))),
            None => Err(self.error("unexpected end of predicate")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tree::TreeNode;
    use crate::profile::ProfileSet;

    fn parse(expr: &str) -> Result<Predicate, SelectorError> {
        Predicate::parse(expr, expr)
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(ProfileSet::new("test")).with_attribute("env", "prod")
    }

    #[test]
    fn test_parse_comparison() {
        let predicate = parse("@d = '23'").unwrap();
        assert_eq!(predicate.to_string(), "(@d = '23')");
        assert_eq!(predicate.to_source(), "@d = '23'");
    }

    #[test]
    fn test_parse_position_and_comparison() {
        let predicate = parse("2 and @a = 's'").unwrap();
        assert_eq!(predicate.to_string(), "([2] and (@a = 's'))");
        assert!(matches!(parse("2").unwrap(), Predicate::Position(2)));
    }

    #[test]
    fn test_parse_grouped_operands() {
        let predicate = parse("@a = '1' and (@b = '2' or @c = '3')").unwrap();
        assert_eq!(
            predicate.to_string(),
            "((@a = '1') and ((@b = '2') or (@c = '3')))"
        );
        assert_eq!(predicate.to_source(), "@a = '1' and (@b = '2' or @c = '3')");
        assert_eq!(parse(&predicate.to_source()).unwrap(), predicate);

        let predicate = parse("(2 or 3) and @k = 'a'").unwrap();
        assert_eq!(parse(&predicate.to_source()).unwrap(), predicate);
        assert!(parse("or(@a = '1')").is_err());
    }

    #[test]
    fn test_rejects_unsupported() {
        for expr in [
            "title=\"Introduction\"",
            "last()",
            "@secretary and @assistant",
            "@a",
            "'x'",
            "text()",
            "child::a",
            "/a",
            "0",
            "@a = ",
            "(@a = 'x'",
        ] {
            assert!(parse(expr).is_err(), "expected '{}' to be rejected", expr);
        }
    }

    #[test]
    fn test_evaluate() {
        let doc = roxmltree::Document::parse(
            r#"<r><i n="1" k="a">x</i><i n="5" k="b">y</i></r>"#,
        )
        .unwrap();
        let items: Vec<TreeNode> = doc
            .root_element()
            .children()
            .filter(|n| n.is_element())
            .map(TreeNode::new)
            .collect();
        let ctx = ctx();

        let p = parse("@n > 2").unwrap();
        assert!(!p.evaluate(&items[0], &ctx));
        assert!(p.evaluate(&items[1], &ctx));

        let p = parse("@k = 'a' or @k = 'z'").unwrap();
        assert!(p.evaluate(&items[0], &ctx));
        assert!(!p.evaluate(&items[1], &ctx));

        let p = parse("2").unwrap();
        assert!(!p.evaluate(&items[0], &ctx));
        assert!(p.evaluate(&items[1], &ctx));

        let p = parse("text() = 'y'").unwrap();
        assert!(p.evaluate(&items[1], &ctx));

        let p = parse("@missing != 'a'").unwrap();
        assert!(!p.evaluate(&items[0], &ctx));

        let p = parse("@k > 'a'").unwrap();
        assert!(!p.evaluate(&items[0], &ctx));
    }

    #[test]
    fn test_literal_interpolation() {
        let doc = roxmltree::Document::parse(r#"<r env="prod"/>"#).unwrap();
        let node = TreeNode::new(doc.root_element());
        let p = parse("@env = '${env}'").unwrap();
        assert!(p.evaluate(&node, &ctx()));
    }

    #[test]
    fn test_pass_thru_is_and_identity() {
        let p = parse("@a = '1'").unwrap();
        assert_eq!(Predicate::PassThru.and(p.clone()), p);
    }
}
