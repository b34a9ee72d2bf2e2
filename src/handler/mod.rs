//! Content handlers.
//!
//! A resource string is turned into a handler by the factory registered for
//! the configuration's resource type: `class` resources name a registered
//! handler constructor, template resources are rendered text.

mod class;
mod template;

pub use class::{ClassHandlerFactory, HandlerConstructor, LogVisitor, LOG_VISITOR};
pub use template::{TemplateHandler, TemplateHandlerFactory, VisitPhase};

use crate::context::ExecutionContext;
use crate::node::{depth, element_path, Node};
use crate::resource::ResourceConfig;
use crate::selector::DOCUMENT_FRAGMENT_SELECTOR;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Owned snapshot of the fragment being visited.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitedElement {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub path: String,
    pub depth: usize,
    pub position: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<(String, String)>,
    #[serde(skip)]
    pub text: Option<String>,
}

impl VisitedElement {
    pub fn from_node<N: Node>(node: &N) -> Self {
        Self {
            name: node.local_name().to_string(),
            namespace: node.namespace().map(str::to_string),
            path: element_path(node),
            depth: depth(node),
            position: node.position(),
            attributes: node.attributes(),
            text: node.text(),
        }
    }

    /// The document fragment itself.
    pub fn document() -> Self {
        Self {
            name: DOCUMENT_FRAGMENT_SELECTOR.to_string(),
            namespace: None,
            path: String::new(),
            depth: 0,
            position: 1,
            attributes: Vec::new(),
            text: None,
        }
    }

    pub fn is_document(&self) -> bool {
        self.name == DOCUMENT_FRAGMENT_SELECTOR
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Resolve `element.*` variables.
    ///
    /// Supports `element.name`, `element.namespace`, `element.path`,
    /// `element.depth`, `element.position`, `element.text` and
    /// `element.attr.<name>`.
    pub fn resolve(&self, expr: &str) -> Option<String> {
        let path = expr.trim().strip_prefix("element.")?;
        let parts: Vec<&str> = path.splitn(2, '.').collect();

        match parts[0] {
            "name" => Some(self.name.clone()),
            "namespace" => self.namespace.clone(),
            "path" => Some(self.path.clone()),
            "depth" => Some(self.depth.to_string()),
            "position" => Some(self.position.to_string()),
            "text" => self.text.clone(),
            "attr" => self.attribute(parts.get(1)?).map(str::to_string),
            _ => None,
        }
    }
}

/// Handler errors. Logged and counted by the driver, never fatal to a run.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("No handler factory for resource type '{resource_type}'")]
    UnsupportedType { resource_type: String },

    #[error("Configuration '{selector}' has no resource")]
    MissingResource { selector: String },

    #[error("Unknown handler class '{class}'")]
    UnknownClass { class: String },

    #[error("Failed to read template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Handler '{handler}' failed: {reason}")]
    Failed { handler: String, reason: String },
}

/// A visitor applied to targeted fragments.
pub trait ContentHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Called when the fragment starts.
    fn visit_before(
        &self,
        element: &VisitedElement,
        ctx: &mut ExecutionContext,
    ) -> Result<(), HandlerError>;

    /// Called when the fragment ends.
    fn visit_after(
        &self,
        _element: &VisitedElement,
        _ctx: &mut ExecutionContext,
    ) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Creates handlers for one family of resource types.
pub trait ContentHandlerFactory: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Resource types this factory serves.
    fn resource_types(&self) -> &[&'static str];

    fn create(&self, config: &Arc<ResourceConfig>) -> Result<Arc<dyn ContentHandler>, HandlerError>;
}

/// Resource type to factory map.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    factories: HashMap<String, Arc<dyn ContentHandlerFactory>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<(&str, &str)> = self
            .factories
            .iter()
            .map(|(t, factory)| (t.as_str(), factory.kind()))
            .collect();
        types.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("factories", &types)
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Class and template factories. Relative template paths resolve against `template_dir`.
    pub fn standard(template_dir: Option<PathBuf>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ClassHandlerFactory::standard()));
        registry.register(Arc::new(TemplateHandlerFactory::new(template_dir)));
        registry
    }

    /// Register a factory for each of its resource types, replacing earlier ones.
    pub fn register(&mut self, factory: Arc<dyn ContentHandlerFactory>) {
        for resource_type in factory.resource_types() {
            self.factories
                .insert(resource_type.to_string(), Arc::clone(&factory));
        }
    }

    pub fn factory(&self, resource_type: &str) -> Option<&Arc<dyn ContentHandlerFactory>> {
        self.factories.get(&resource_type.to_ascii_lowercase())
    }

    /// Create the handler for a configuration.
    pub fn create(&self, config: &Arc<ResourceConfig>) -> Result<Arc<dyn ContentHandler>, HandlerError> {
        if config.resource().is_none() && config.resource_bytes().is_none() {
            return Err(HandlerError::MissingResource {
                selector: config.selector().to_string(),
            });
        }
        let resource_type = config.resource_type().unwrap_or_default();
        let factory = self
            .factory(&resource_type)
            .ok_or(HandlerError::UnsupportedType { resource_type })?;
        factory.create(config)
    }
}
