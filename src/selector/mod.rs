//! Selector compilation.
//!
//! A selector string such as `order/order-header`, `a/**/c`, `x/y[@d='23']/@e`
//! or `#document` is compiled into an ordered chain of [`SelectorStep`]s. The
//! last step is the target step; the steps before it must match successive
//! ancestors of the target.

mod builder;
mod predicate;
mod step;

pub use builder::{build_steps, contextual_selector, steps_to_string, to_selector_string};
pub use predicate::{CompareOp, Operand, Predicate};
pub use step::{SelectorStep, StepKind};

use std::collections::BTreeMap;
use std::fmt;

/// Selector targeting the document fragment itself.
pub const DOCUMENT_FRAGMENT_SELECTOR: &str = "#document";

/// Older spelling of [`DOCUMENT_FRAGMENT_SELECTOR`], normalized on parse.
pub const LEGACY_DOCUMENT_FRAGMENT_SELECTOR: &str = "$document";

/// Selector used by configurations that target nothing in particular.
pub const SELECTOR_NONE: &str = "none";

/// Prefix marking a selector as an XML definition reference.
pub const XML_DEF_PREFIX: &str = "xmldef:";

/// A possibly namespaced name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    namespace: Option<String>,
    prefix: Option<String>,
    local: String,
}

impl QName {
    /// An unprefixed, unbound name.
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            prefix: None,
            local: local.into(),
        }
    }

    /// A name bound to a namespace URI.
    pub fn namespaced(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            prefix: None,
            local: local.into(),
        }
    }

    /// Parse `prefix:local` (or `local`). The prefix is bound later.
    pub fn parse(name: &str) -> Self {
        match name.split_once(':') {
            Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => Self {
                namespace: None,
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
            },
            _ => Self::local(name),
        }
    }

    pub fn local_part(&self) -> &str {
        &self.local
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Resolve the prefix (if any) against the mappings.
    pub(crate) fn bind(
        &mut self,
        mappings: &NamespaceMappings,
        selector: &str,
    ) -> Result<(), SelectorError> {
        let Some(prefix) = self.prefix.as_deref() else {
            return Ok(());
        };
        match mappings.get(prefix) {
            Some(uri) => {
                self.namespace = Some(uri.to_string());
                Ok(())
            }
            None => Err(SelectorError::UnboundPrefix {
                prefix: prefix.to_string(),
                selector: selector.to_string(),
            }),
        }
    }

    /// Source form, `prefix:local` when prefixed.
    pub fn to_source(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local),
            None => self.local.clone(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => f.write_str(&self.to_source()),
        }
    }
}

/// Prefix to namespace URI mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceMappings {
    mappings: BTreeMap<String, String>,
}

impl NamespaceMappings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping (builder form).
    pub fn with(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.insert(prefix, uri);
        self
    }

    pub fn insert(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.mappings.insert(prefix.into(), uri.into());
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.mappings.get(prefix).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.mappings
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Add every mapping from `other`, overriding existing prefixes.
    pub fn extend(&mut self, other: &NamespaceMappings) {
        for (prefix, uri) in other.iter() {
            self.insert(prefix, uri);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for NamespaceMappings
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut mappings = Self::new();
        for (prefix, uri) in iter {
            mappings.insert(prefix, uri);
        }
        mappings
    }
}

/// Errors raised while compiling or binding a selector.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectorError {
    #[error("Empty selector")]
    Empty,

    #[error("Invalid selector '{selector}': {reason}")]
    Parse { selector: String, reason: String },

    #[error("Unbound namespace prefix '{prefix}' in selector '{selector}'")]
    UnboundPrefix { prefix: String, selector: String },

    #[error("Invalid selector '{selector}': '#document' may only be the first step")]
    DocumentNotFirst { selector: String },

    #[error("Invalid selector '{selector}': text() may only be used on the last step")]
    TextNotLast { selector: String },
}

impl SelectorError {
    pub(crate) fn parse(selector: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qname_parse() {
        let name = QName::parse("a:order");
        assert_eq!(name.prefix(), Some("a"));
        assert_eq!(name.local_part(), "order");
        assert_eq!(name.to_source(), "a:order");

        let name = QName::parse("order");
        assert_eq!(name.prefix(), None);
        assert_eq!(name.to_string(), "order");
    }

    #[test]
    fn test_qname_bind() {
        let mappings = NamespaceMappings::new().with("a", "http://a");
        let mut name = QName::parse("a:order");
        name.bind(&mappings, "a:order").unwrap();
        assert_eq!(name.namespace(), Some("http://a"));
        assert_eq!(name.to_string(), "{http://a}order");

        let mut name = QName::parse("b:order");
        assert!(matches!(
            name.bind(&mappings, "b:order"),
            Err(SelectorError::UnboundPrefix { .. })
        ));
    }
}
