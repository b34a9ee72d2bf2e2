//! Handlers identified by a registered class name.

use super::{ContentHandler, ContentHandlerFactory, HandlerError, VisitedElement};
use crate::context::ExecutionContext;
use crate::resource::{ResourceConfig, CLASS_RESOURCE_TYPE};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Built-in visitor logging each targeted fragment.
pub const LOG_VISITOR: &str = "zentinel.visitor.Log";

/// Builds a handler from its configuration.
pub type HandlerConstructor =
    fn(&Arc<ResourceConfig>) -> Result<Arc<dyn ContentHandler>, HandlerError>;

/// Class name to constructor map.
#[derive(Clone, Default)]
pub struct ClassHandlerFactory {
    constructors: HashMap<String, HandlerConstructor>,
}

impl fmt::Debug for ClassHandlerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut classes: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        classes.sort_unstable();
        f.debug_struct("ClassHandlerFactory")
            .field("classes", &classes)
            .finish()
    }
}

impl ClassHandlerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory knowing the built-in visitors.
    pub fn standard() -> Self {
        let mut factory = Self::new();
        factory.register(LOG_VISITOR, |config| Ok(Arc::new(LogVisitor::new(config))));
        factory
    }

    pub fn register(&mut self, class: &str, constructor: HandlerConstructor) {
        self.constructors.insert(class.to_string(), constructor);
    }

    pub fn contains(&self, class: &str) -> bool {
        self.constructors.contains_key(class)
    }
}

impl ContentHandlerFactory for ClassHandlerFactory {
    fn kind(&self) -> &'static str {
        CLASS_RESOURCE_TYPE
    }

    fn resource_types(&self) -> &[&'static str] {
        &[CLASS_RESOURCE_TYPE]
    }

    fn create(&self, config: &Arc<ResourceConfig>) -> Result<Arc<dyn ContentHandler>, HandlerError> {
        let class = config
            .resource()
            .ok_or_else(|| HandlerError::MissingResource {
                selector: config.selector().to_string(),
            })?;
        let constructor = self
            .constructors
            .get(class)
            .ok_or_else(|| HandlerError::UnknownClass {
                class: class.to_string(),
            })?;
        debug!(class, selector = config.selector(), "Creating class handler");
        constructor(config)
    }
}

/// Logs each visited fragment and appends a line to the context output.
///
/// Parameters (local, then global):
/// - `message`: line template, default `visit ${element.path}`
/// - `level`: `info` (default), `debug` or `warn`
/// - `visitAfter`: also log at fragment end
pub struct LogVisitor {
    config: Arc<ResourceConfig>,
}

impl LogVisitor {
    pub const DEFAULT_MESSAGE: &'static str = "visit ${element.path}";

    pub fn new(config: &Arc<ResourceConfig>) -> Self {
        Self {
            config: Arc::clone(config),
        }
    }

    fn log(&self, element: &VisitedElement, ctx: &mut ExecutionContext, phase: &str) {
        let message = ctx
            .parameter(&self.config, "message")
            .map_or(Self::DEFAULT_MESSAGE, |p| p.value())
            .to_string();
        let level = ctx
            .parameter(&self.config, "level")
            .map_or("info", |p| p.value())
            .to_ascii_lowercase();
        let line = ctx.interpolate_with(&message, |var| element.resolve(var));

        match level.as_str() {
            "debug" => debug!(selector = self.config.selector(), phase, "{}", line),
            "warn" => warn!(selector = self.config.selector(), phase, "{}", line),
            _ => info!(selector = self.config.selector(), phase, "{}", line),
        }
        ctx.emit(line);
    }
}

impl ContentHandler for LogVisitor {
    fn name(&self) -> &str {
        LOG_VISITOR
    }

    fn visit_before(
        &self,
        element: &VisitedElement,
        ctx: &mut ExecutionContext,
    ) -> Result<(), HandlerError> {
        self.log(element, ctx, "before");
        Ok(())
    }

    fn visit_after(
        &self,
        element: &VisitedElement,
        ctx: &mut ExecutionContext,
    ) -> Result<(), HandlerError> {
        let visit_after = ctx
            .parameter(&self.config, "visitAfter")
            .is_some_and(|p| p.value().trim().eq_ignore_ascii_case("true"));
        if visit_after {
            self.log(element, ctx, "after");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileSet;
    use crate::resource::{Parameter, Parameters};

    fn element() -> VisitedElement {
        VisitedElement {
            name: "item".to_string(),
            namespace: None,
            path: "/order/item".to_string(),
            depth: 1,
            position: 1,
            attributes: vec![("id".to_string(), "7".to_string())],
            text: None,
        }
    }

    #[test]
    fn test_unknown_class() {
        let factory = ClassHandlerFactory::standard();
        let config = Arc::new(ResourceConfig::new("a").unwrap().with_resource("com.acme.Missing"));
        assert!(matches!(
            factory.create(&config),
            Err(HandlerError::UnknownClass { class }) if class == "com.acme.Missing"
        ));
        assert!(factory.contains(LOG_VISITOR));
    }

    #[test]
    fn test_log_visitor_output() {
        let factory = ClassHandlerFactory::standard();
        let config = Arc::new(
            ResourceConfig::new("item")
                .unwrap()
                .with_resource(LOG_VISITOR)
                .with_parameter("message", "${element.name}#${element.attr.id} for ${profile.base}")
                .with_parameter("visitAfter", "true"),
        );
        let handler = factory.create(&config).unwrap();
        let mut ctx = ExecutionContext::new(ProfileSet::new("producer-A"));

        handler.visit_before(&element(), &mut ctx).unwrap();
        handler.visit_after(&element(), &mut ctx).unwrap();
        assert_eq!(ctx.output(), ["item#7 for producer-A", "item#7 for producer-A"]);
    }

    #[test]
    fn test_log_visitor_global_message() {
        let mut global = Parameters::new();
        global.add(Parameter::new("message", "global ${element.path}"));
        let mut ctx =
            ExecutionContext::new(ProfileSet::new("p")).with_global_params(Arc::new(global));

        let config = Arc::new(ResourceConfig::new("item").unwrap().with_resource(LOG_VISITOR));
        let handler = LogVisitor::new(&config);
        handler.visit_before(&element(), &mut ctx).unwrap();
        handler.visit_after(&element(), &mut ctx).unwrap();
        assert_eq!(ctx.output(), ["global /order/item"]);
    }
}
