//! Text template handlers.

use super::{ContentHandler, ContentHandlerFactory, HandlerError, VisitedElement};
use crate::context::ExecutionContext;
use crate::resource::ResourceConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// When a template is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisitPhase {
    #[default]
    Before,
    After,
}

impl VisitPhase {
    /// From the `visitPhase` parameter value. Unknown values mean `Before`.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("after") {
            Self::After
        } else {
            Self::Before
        }
    }
}

/// Serves `template`, `tpl` and `txt` resources.
#[derive(Debug, Clone, Default)]
pub struct TemplateHandlerFactory {
    template_dir: Option<PathBuf>,
}

impl TemplateHandlerFactory {
    pub fn new(template_dir: Option<PathBuf>) -> Self {
        Self { template_dir }
    }

    fn template_path(&self, resource: &str) -> PathBuf {
        let path = Path::new(resource);
        match &self.template_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ContentHandlerFactory for TemplateHandlerFactory {
    fn kind(&self) -> &'static str {
        "template"
    }

    fn resource_types(&self) -> &[&'static str] {
        &["template", "tpl", "txt"]
    }

    fn create(&self, config: &Arc<ResourceConfig>) -> Result<Arc<dyn ContentHandler>, HandlerError> {
        let template = match config.resource_bytes() {
            Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            None => {
                let resource = config
                    .resource()
                    .ok_or_else(|| HandlerError::MissingResource {
                        selector: config.selector().to_string(),
                    })?;
                let path = self.template_path(resource);
                debug!(path = %path.display(), "Loading template");
                std::fs::read_to_string(&path)
                    .map_err(|source| HandlerError::Template { path, source })?
            }
        };

        let phase = config
            .parameter("visitPhase")
            .map_or(VisitPhase::Before, |p| VisitPhase::parse(p.value()));

        Ok(Arc::new(TemplateHandler {
            name: format!("template[{}]", config.selector()),
            config: Arc::clone(config),
            template,
            phase,
        }))
    }
}

/// Renders its template into the context output.
///
/// Variables: `${element.*}`, `${param.<name>}` and the context variables.
pub struct TemplateHandler {
    name: String,
    config: Arc<ResourceConfig>,
    template: String,
    phase: VisitPhase,
}

impl TemplateHandler {
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn phase(&self) -> VisitPhase {
        self.phase
    }

    fn render(&self, element: &VisitedElement, ctx: &mut ExecutionContext) {
        let rendered = ctx.interpolate_with(&self.template, |var| {
            element.resolve(var).or_else(|| {
                let name = var.trim().strip_prefix("param.")?;
                ctx.parameter(&self.config, name).map(|p| p.value().to_string())
            })
        });
        ctx.emit(rendered);
    }
}

impl ContentHandler for TemplateHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn visit_before(
        &self,
        element: &VisitedElement,
        ctx: &mut ExecutionContext,
    ) -> Result<(), HandlerError> {
        if self.phase == VisitPhase::Before {
            self.render(element, ctx);
        }
        Ok(())
    }

    fn visit_after(
        &self,
        element: &VisitedElement,
        ctx: &mut ExecutionContext,
    ) -> Result<(), HandlerError> {
        if self.phase == VisitPhase::After {
            self.render(element, ctx);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileSet;
    use std::io::Write;

    fn element() -> VisitedElement {
        VisitedElement {
            name: "item".to_string(),
            namespace: None,
            path: "/order/item".to_string(),
            depth: 1,
            position: 3,
            attributes: Vec::new(),
            text: None,
        }
    }

    #[test]
    fn test_file_template_from_template_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("item.tpl")).unwrap();
        file.write_all(b"${element.name} #${element.position}").unwrap();

        let factory = TemplateHandlerFactory::new(Some(dir.path().to_path_buf()));
        let config = Arc::new(ResourceConfig::new("item").unwrap().with_resource("item.tpl"));
        let handler = factory.create(&config).unwrap();

        let mut ctx = ExecutionContext::new(ProfileSet::new("p"));
        handler.visit_before(&element(), &mut ctx).unwrap();
        assert_eq!(ctx.output(), ["item #3"]);
    }

    #[test]
    fn test_missing_template_file() {
        let dir = tempfile::tempdir().unwrap();
        let factory = TemplateHandlerFactory::new(Some(dir.path().to_path_buf()));
        let config = Arc::new(ResourceConfig::new("item").unwrap().with_resource("missing.tpl"));
        assert!(matches!(
            factory.create(&config),
            Err(HandlerError::Template { .. })
        ));
    }

    #[test]
    fn test_after_phase_and_params() {
        let factory = TemplateHandlerFactory::default();
        let config = Arc::new(
            ResourceConfig::new("item")
                .unwrap()
                .with_resource("x.txt")
                .with_parameter("resdata", "end ${element.name} ${param.tag}")
                .with_parameter("tag", "t1")
                .with_parameter("visitPhase", "after"),
        );
        let handler = factory.create(&config).unwrap();

        let mut ctx = ExecutionContext::new(ProfileSet::new("p"));
        handler.visit_before(&element(), &mut ctx).unwrap();
        assert!(ctx.output().is_empty());
        handler.visit_after(&element(), &mut ctx).unwrap();
        assert_eq!(ctx.output(), ["end item t1"]);
    }
}
