//! A single compiled selector step.

use super::{NamespaceMappings, Predicate, QName, SelectorError, DOCUMENT_FRAGMENT_SELECTOR};
use crate::context::ExecutionContext;
use crate::node::Node;
use std::fmt;
use tracing::debug;

/// What a step matches by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// A literal element name.
    Named,
    /// `*`: any single element.
    Star,
    /// `**`: zero or more ancestor levels.
    StarStar,
}

/// One path segment of a compiled selector.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorStep {
    expression: String,
    target: QName,
    attribute: Option<QName>,
    kind: StepKind,
    rooted: bool,
    predicate: Option<Predicate>,
}

impl SelectorStep {
    /// Build a step for a literal name, `*` or `**`.
    pub fn new(expression: impl Into<String>, name: &str) -> Self {
        let kind = match name {
            "*" => StepKind::Star,
            "**" => StepKind::StarStar,
            _ => StepKind::Named,
        };
        let target = if name == DOCUMENT_FRAGMENT_SELECTOR {
            QName::local(name)
        } else {
            QName::parse(name)
        };

        Self {
            expression: expression.into(),
            target,
            attribute: None,
            kind,
            rooted: false,
            predicate: None,
        }
    }

    /// The document root marker step.
    pub fn document() -> Self {
        let mut step = Self::new(DOCUMENT_FRAGMENT_SELECTOR, DOCUMENT_FRAGMENT_SELECTOR);
        step.rooted = true;
        step
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.add_predicate(predicate);
        self
    }

    pub(crate) fn add_predicate(&mut self, predicate: Predicate) {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
    }

    pub(crate) fn set_attribute(&mut self, attribute: QName) {
        self.attribute = Some(attribute);
    }

    pub(crate) fn set_rooted(&mut self, rooted: bool) {
        self.rooted = rooted && self.kind != StepKind::StarStar;
    }

    pub(crate) fn append_expression(&mut self, suffix: &str) {
        self.expression.push('/');
        self.expression.push_str(suffix);
    }

    /// Source text of this step.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn target(&self) -> &QName {
        &self.target
    }

    pub fn attribute(&self) -> Option<&QName> {
        self.attribute.as_ref()
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn is_star(&self) -> bool {
        self.kind == StepKind::Star
    }

    pub fn is_star_star(&self) -> bool {
        self.kind == StepKind::StarStar
    }

    pub fn is_rooted(&self) -> bool {
        self.rooted
    }

    /// Is this the `#document` marker step.
    pub fn is_document(&self) -> bool {
        self.kind == StepKind::Named && self.target.local_part() == DOCUMENT_FRAGMENT_SELECTOR
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// Name test only. Wildcard steps match any name.
    pub fn matches_name(&self, local_name: &str) -> bool {
        match self.kind {
            StepKind::Star | StepKind::StarStar => true,
            StepKind::Named => self.target.local_part().eq_ignore_ascii_case(local_name),
        }
    }

    /// Namespace test. A step without a bound namespace accepts any namespace.
    pub fn is_targeted_at_namespace(&self, namespace: Option<&str>) -> bool {
        match (self.kind, self.target.namespace()) {
            (StepKind::Star | StepKind::StarStar, _) | (_, None) => true,
            (_, Some(ns)) => namespace == Some(ns),
        }
    }

    /// Name and namespace test against a node.
    pub fn is_targeted_at_element<N: Node>(&self, node: &N) -> bool {
        self.matches_name(node.local_name()) && self.is_targeted_at_namespace(node.namespace())
    }

    /// Evaluate this step's predicate. A step without one does not filter.
    pub fn evaluate_predicate<N: Node>(&self, node: &N, ctx: &ExecutionContext) -> bool {
        match &self.predicate {
            Some(predicate) => predicate.evaluate(node, ctx),
            None => {
                debug!(step = %self.expression, "No predicate evaluator on step");
                true
            }
        }
    }

    /// Resolve namespace prefixes on the step name, attribute and predicate.
    pub fn bind_namespaces(
        &mut self,
        mappings: &NamespaceMappings,
        selector: &str,
    ) -> Result<(), SelectorError> {
        if self.kind == StepKind::Named && !self.is_document() {
            self.target.bind(mappings, selector)?;
        }
        if let Some(attribute) = self.attribute.as_mut() {
            attribute.bind(mappings, selector)?;
        }
        if let Some(predicate) = self.predicate.as_mut() {
            predicate.bind(mappings, selector)?;
        }
        Ok(())
    }

    /// Re-parseable source form of this step.
    pub(crate) fn to_source(&self) -> String {
        let mut source = match self.kind {
            StepKind::Star => "*".to_string(),
            StepKind::StarStar => "**".to_string(),
            StepKind::Named => self.target.to_source(),
        };
        if let Some(predicate) = &self.predicate {
            if *predicate != Predicate::PassThru {
                source.push('[');
                source.push_str(&predicate.to_source());
                source.push(']');
            }
        }
        source
    }
}

impl fmt::Display for SelectorStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StepKind::Star => f.write_str("*")?,
            StepKind::StarStar => f.write_str("**")?,
            StepKind::Named => f.write_str(&self.target.to_source())?,
        }
        if let Some(attribute) = &self.attribute {
            write!(f, "{{@{}}}", attribute.to_source())?;
        }
        if let Some(predicate) = &self.predicate {
            write!(f, "{}", predicate)?;
        }
        Ok(())
    }
}
