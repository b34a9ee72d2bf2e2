//! Filter driver.
//!
//! Runs one document through the tree or stream front end, resolves the
//! configurations targeted at the document fragment and every element, and
//! optionally applies their content handlers.

use crate::config::{ConfigError, FilterMode, ResourceConfigFile, Settings};
use crate::context::ExecutionContext;
use crate::handler::{ContentHandler, HandlerRegistry, VisitedElement};
use crate::node::stream::{StreamError, StreamEvent, StreamParser};
use crate::node::tree::TreeNode;
use crate::resolver::ResourceResolver;
use crate::resource::ResourceConfig;
use crate::specificity::specificity;
use crate::store::ConfigStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A configuration matched at one fragment.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedResource {
    pub selector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    pub target_profile: String,
    pub specificity: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub default_resource: bool,
}

/// A fragment with at least one match.
#[derive(Debug, Clone, Serialize)]
pub struct Visit {
    pub element: VisitedElement,
    pub matched: Vec<MatchedResource>,
}

/// Result of filtering one document.
#[derive(Debug, Clone, Serialize)]
pub struct FilterReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    pub profile_set: String,
    pub correlation_id: String,
    pub mode: FilterMode,
    /// Elements visited (the document fragment not included)
    pub elements: usize,
    pub visits: Vec<Visit>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<String>,
    pub handler_errors: usize,
    pub duration_ms: u64,
}

impl FilterReport {
    /// Selectors matched at the fragment with display path `path` (`""` for the document).
    pub fn selectors_at(&self, path: &str) -> Vec<&str> {
        self.visits
            .iter()
            .filter(|visit| visit.element.path == path)
            .flat_map(|visit| visit.matched.iter().map(|m| m.selector.as_str()))
            .collect()
    }
}

/// Driver counters.
#[derive(Debug, Default)]
pub struct DriverStats {
    documents_total: AtomicU64,
    documents_failed: AtomicU64,
    elements_visited: AtomicU64,
    matches_total: AtomicU64,
    handler_errors: AtomicU64,
}

/// Point-in-time copy of [`DriverStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub documents_total: u64,
    pub documents_failed: u64,
    pub elements_visited: u64,
    pub matches_total: u64,
    pub handler_errors: u64,
}

impl DriverStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            documents_total: self.documents_total.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            elements_visited: self.elements_visited.load(Ordering::Relaxed),
            matches_total: self.matches_total.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
        }
    }
}

/// Driver errors.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("XML parse error: {0}")]
    Parse(#[from] roxmltree::Error),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Filters documents against a shared store.
pub struct FilterDriver {
    store: Arc<ConfigStore>,
    handlers: HandlerRegistry,
    settings: Settings,
    stats: DriverStats,
}

impl FilterDriver {
    pub fn new(store: Arc<ConfigStore>, settings: Settings) -> Self {
        let handlers = HandlerRegistry::standard(settings.template_dir.clone());
        info!(
            configs = store.len(),
            apply_handlers = settings.apply_handlers,
            mode = ?settings.default_mode,
            "Filter driver initialized"
        );
        Self {
            store,
            handlers,
            settings,
            stats: DriverStats::default(),
        }
    }

    /// Build a driver over a fresh store holding the file's configurations.
    pub fn from_config(config: &ResourceConfigFile) -> Result<Self, ConfigError> {
        let store = Arc::new(ConfigStore::new());
        store.add_list(config.build_list("config")?);
        Ok(Self::new(store, config.settings.clone()))
    }

    /// Create from a YAML configuration string.
    pub fn from_yaml(yaml: &str) -> Result<Self, DriverError> {
        let config = ResourceConfigFile::from_yaml(yaml)?;
        Ok(Self::from_config(&config)?)
    }

    /// Create from a JSON configuration string.
    pub fn from_json(json: &str) -> Result<Self, DriverError> {
        let config = ResourceConfigFile::from_json(json)?;
        Ok(Self::from_config(&config)?)
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    /// Filter with an explicit front end, or the configured default.
    pub fn filter(
        &self,
        xml: &str,
        ctx: ExecutionContext,
        mode: Option<FilterMode>,
    ) -> Result<FilterReport, DriverError> {
        match mode.unwrap_or(self.settings.default_mode) {
            FilterMode::Tree => self.filter_tree(xml, ctx),
            FilterMode::Stream => self.filter_stream(xml, ctx),
        }
    }

    /// Filter a document parsed with `roxmltree`.
    pub fn filter_tree(&self, xml: &str, ctx: ExecutionContext) -> Result<FilterReport, DriverError> {
        let start = Instant::now();
        let document = roxmltree::Document::parse(xml).map_err(|e| {
            self.fail(&ctx);
            e
        })?;

        let mut run = self.begin(ctx);
        run.document_before();
        run.walk(TreeNode::root(&document));
        run.document_after();
        Ok(run.finish(FilterMode::Tree, start))
    }

    /// Filter a document with the `quick-xml` event front end.
    ///
    /// Handlers already applied to earlier elements are not rolled back when
    /// the document turns out to be malformed.
    pub fn filter_stream(&self, xml: &str, ctx: ExecutionContext) -> Result<FilterReport, DriverError> {
        let start = Instant::now();
        let mut run = self.begin(ctx);
        let mut open: Vec<(VisitedElement, Vec<Arc<ResourceConfig>>)> = Vec::new();

        run.document_before();
        for event in StreamParser::new(xml) {
            let event = match event {
                Ok(event) => event,
                Err(err) => {
                    self.fail(&run.ctx);
                    return Err(err.into());
                }
            };
            match event {
                StreamEvent::Start(node) => {
                    let matched = run.resolver.resolve(&node, &run.ctx);
                    let element = VisitedElement::from_node(&node);
                    run.before(&element, &matched);
                    open.push((element, matched));
                }
                StreamEvent::End(_) => {
                    if let Some((element, matched)) = open.pop() {
                        run.after(&element, &matched);
                    }
                }
            }
        }
        run.document_after();
        Ok(run.finish(FilterMode::Stream, start))
    }

    fn begin(&self, mut ctx: ExecutionContext) -> Run<'_> {
        self.stats.documents_total.fetch_add(1, Ordering::Relaxed);
        let resolver = self.store.resolver(&ctx.profile_set);
        ctx.set_global_params(Arc::clone(resolver.global_params()));
        debug!(
            correlation_id = %ctx.correlation_id,
            profile_set = %ctx.profile_set,
            configs = resolver.len(),
            "Filtering document"
        );
        Run {
            driver: self,
            resolver,
            ctx,
            handlers: HashMap::new(),
            visits: Vec::new(),
            elements: 0,
            handler_errors: 0,
        }
    }

    fn fail(&self, ctx: &ExecutionContext) {
        self.stats.documents_failed.fetch_add(1, Ordering::Relaxed);
        warn!(
            correlation_id = %ctx.correlation_id,
            document = ?ctx.document,
            "Document could not be parsed"
        );
    }
}

/// State of one document run.
struct Run<'d> {
    driver: &'d FilterDriver,
    resolver: Arc<ResourceResolver>,
    ctx: ExecutionContext,
    /// Handlers created so far, keyed by configuration identity. `None` if creation failed.
    handlers: HashMap<usize, Option<Arc<dyn ContentHandler>>>,
    visits: Vec<Visit>,
    elements: usize,
    handler_errors: usize,
}

impl Run<'_> {
    fn walk(&mut self, node: TreeNode<'_, '_>) {
        let matched = self.resolver.resolve(&node, &self.ctx);
        let element = VisitedElement::from_node(&node);
        self.before(&element, &matched);
        for child in node.child_elements() {
            self.walk(child);
        }
        self.after(&element, &matched);
    }

    fn document_before(&mut self) {
        let matched = self.resolver.resolve_document(&self.ctx);
        if !matched.is_empty() {
            self.record(&VisitedElement::document(), &matched);
            self.apply(&VisitedElement::document(), &matched, true);
        }
    }

    fn document_after(&mut self) {
        let matched = self.resolver.resolve_document(&self.ctx);
        self.apply(&VisitedElement::document(), &matched, false);
    }

    fn before(&mut self, element: &VisitedElement, matched: &[Arc<ResourceConfig>]) {
        self.elements += 1;
        self.driver
            .stats
            .elements_visited
            .fetch_add(1, Ordering::Relaxed);
        if matched.is_empty() {
            return;
        }
        self.record(element, matched);
        self.apply(element, matched, true);
    }

    fn after(&mut self, element: &VisitedElement, matched: &[Arc<ResourceConfig>]) {
        self.apply(element, matched, false);
    }

    fn record(&mut self, element: &VisitedElement, matched: &[Arc<ResourceConfig>]) {
        self.driver
            .stats
            .matches_total
            .fetch_add(matched.len() as u64, Ordering::Relaxed);
        let profile_set = &self.ctx.profile_set;
        self.visits.push(Visit {
            element: element.clone(),
            matched: matched
                .iter()
                .map(|config| MatchedResource {
                    selector: config.selector().to_string(),
                    resource: config.resource().map(str::to_string),
                    resource_type: config.resource_type(),
                    target_profile: config.target_profile().to_string(),
                    specificity: specificity(config, profile_set),
                    default_resource: config.is_default_resource(),
                })
                .collect(),
        });
    }

    fn apply(&mut self, element: &VisitedElement, matched: &[Arc<ResourceConfig>], before: bool) {
        if !self.driver.settings.apply_handlers {
            return;
        }
        for config in matched {
            let Some(handler) = self.handler(config) else {
                continue;
            };
            let result = if before {
                handler.visit_before(element, &mut self.ctx)
            } else {
                handler.visit_after(element, &mut self.ctx)
            };
            if let Err(err) = result {
                self.handler_failed(config, err.to_string());
            }
        }
    }

    fn handler(&mut self, config: &Arc<ResourceConfig>) -> Option<Arc<dyn ContentHandler>> {
        let key = Arc::as_ptr(config) as usize;
        if let Some(cached) = self.handlers.get(&key) {
            return cached.clone();
        }
        let handler = match self.driver.handlers.create(config) {
            Ok(handler) => Some(handler),
            Err(err) => {
                self.handler_failed(config, err.to_string());
                None
            }
        };
        self.handlers.insert(key, handler.clone());
        handler
    }

    fn handler_failed(&mut self, config: &ResourceConfig, error: String) {
        self.handler_errors += 1;
        self.driver
            .stats
            .handler_errors
            .fetch_add(1, Ordering::Relaxed);
        warn!(
            correlation_id = %self.ctx.correlation_id,
            selector = config.selector(),
            error = %error,
            "Content handler failed"
        );
    }

    fn finish(mut self, mode: FilterMode, start: Instant) -> FilterReport {
        let report = FilterReport {
            document: self.ctx.document.clone(),
            profile_set: self.ctx.profile_set.to_string(),
            correlation_id: self.ctx.correlation_id.clone(),
            mode,
            elements: self.elements,
            visits: std::mem::take(&mut self.visits),
            output: self.ctx.take_output(),
            handler_errors: self.handler_errors,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!(
            correlation_id = %report.correlation_id,
            elements = report.elements,
            visits = report.visits.len(),
            handler_errors = report.handler_errors,
            "Document filtered"
        );
        report
    }
}
