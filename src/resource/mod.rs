//! Resource configurations.
//!
//! A [`ResourceConfig`] ties a resource (handler class name, template path or
//! inline text) to the document fragments it applies to: a compiled selector,
//! an optional selector namespace, profile targeting expressions and an
//! optional condition.

mod condition;
mod param;

pub use condition::{
    ConditionError, ConditionEvaluator, ConditionFactory, ConditionRegistry, ContextExpression,
    RegexCondition,
};
pub use param::{DataDecoder, DecodeError, DecoderRegistry, ParamValue, Parameter, Parameters};

use crate::context::ExecutionContext;
use crate::node::Node;
use crate::profile::{parse_target_profile, ProfileError, ProfileSet, ProfileTargetingExpression};
use crate::selector::{
    self, NamespaceMappings, QName, SelectorError, SelectorStep, StepKind,
    DOCUMENT_FRAGMENT_SELECTOR, XML_DEF_PREFIX,
};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Selector of the configurations holding store-wide parameters.
pub const GLOBAL_PARAMETERS: &str = "global-parameters";

/// Parameter overriding the inferred resource type.
pub const PARAM_RESTYPE: &str = "restype";

/// Parameter carrying inline resource data.
pub const PARAM_RESDATA: &str = "resdata";

/// Resource type reported for handler class names.
pub const CLASS_RESOURCE_TYPE: &str = "class";

/// Errors raised while building a resource configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResourceError {
    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error(transparent)]
    Profile(#[from] ProfileError),
}

/// One resource configuration.
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    selector: String,
    steps: Vec<SelectorStep>,
    selector_namespace: Option<String>,
    target_profile: String,
    profile_expressions: Vec<ProfileTargetingExpression>,
    resource: Option<String>,
    resource_type: Option<String>,
    default_resource: bool,
    condition: Option<Arc<dyn ConditionEvaluator>>,
    params: Parameters,
    extended_config_ns: Option<String>,
}

impl ResourceConfig {
    /// Create a configuration for `selector`, targeted at every profile.
    pub fn new(selector: &str) -> Result<Self, ResourceError> {
        let mut config = Self {
            selector: String::new(),
            steps: Vec::new(),
            selector_namespace: None,
            target_profile: crate::profile::DEFAULT_PROFILE.to_string(),
            profile_expressions: parse_target_profile(crate::profile::DEFAULT_PROFILE)?,
            resource: None,
            resource_type: None,
            default_resource: false,
            condition: None,
            params: Parameters::new(),
            extended_config_ns: None,
        };
        config.set_selector(selector)?;
        Ok(config)
    }

    /// Create a configuration with a resource.
    pub fn with_selector_and_resource(selector: &str, resource: &str) -> Result<Self, ResourceError> {
        Ok(Self::new(selector)?.with_resource(resource))
    }

    /// Replace the selector, recompiling its steps.
    pub fn set_selector(&mut self, selector: &str) -> Result<(), ResourceError> {
        let selector = selector.trim();
        let steps = if selector.starts_with(XML_DEF_PREFIX) {
            vec![SelectorStep::new(selector, selector)]
        } else {
            selector::build_steps(selector)?
        };
        self.selector = selector.to_string();
        self.steps = steps;
        Ok(())
    }

    /// Set the target profile (builder form).
    pub fn with_target_profile(mut self, target_profile: &str) -> Result<Self, ResourceError> {
        self.set_target_profile(target_profile)?;
        Ok(self)
    }

    /// Replace the target profile, reparsing its expressions.
    pub fn set_target_profile(&mut self, target_profile: &str) -> Result<(), ResourceError> {
        let target_profile = if target_profile.trim().is_empty() {
            crate::profile::DEFAULT_PROFILE
        } else {
            target_profile.trim()
        };
        self.profile_expressions = parse_target_profile(target_profile).map_err(|err| match err {
            ProfileError::EmptyExpression => ProfileError::EmptyTargetProfile {
                selector: self.selector.clone(),
            },
            other => other,
        })?;
        self.target_profile = target_profile.to_string();
        Ok(())
    }

    /// Set the selector namespace. `*` or an empty string clears it.
    pub fn with_selector_namespace(mut self, namespace: &str) -> Self {
        self.set_selector_namespace(Some(namespace));
        self
    }

    pub fn set_selector_namespace(&mut self, namespace: Option<&str>) {
        self.selector_namespace = namespace
            .map(str::trim)
            .filter(|ns| !ns.is_empty() && *ns != "*")
            .map(str::to_string);
    }

    pub fn with_resource(mut self, resource: &str) -> Self {
        self.resource = Some(resource.to_string()).filter(|r| !r.trim().is_empty());
        self
    }

    pub fn with_resource_type(mut self, resource_type: &str) -> Self {
        self.resource_type = Some(resource_type.trim().to_ascii_lowercase()).filter(|t| !t.is_empty());
        self
    }

    pub fn with_default_resource(mut self, default_resource: bool) -> Self {
        self.default_resource = default_resource;
        self
    }

    pub fn with_condition(mut self, condition: Arc<dyn ConditionEvaluator>) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_parameter(mut self, name: &str, value: &str) -> Self {
        self.params.add(Parameter::new(name, value));
        self
    }

    pub fn with_typed_parameter(mut self, name: &str, value: &str, param_type: &str) -> Self {
        self.params.add(Parameter::typed(name, value, param_type));
        self
    }

    pub fn with_extended_config_ns(mut self, namespace: &str) -> Self {
        self.extended_config_ns = Some(namespace.to_string());
        self
    }

    pub fn add_parameter(&mut self, param: Parameter) {
        self.params.add(param);
    }

    /// Add every parameter of `params` not already present here.
    pub fn add_parameters(&mut self, params: &Parameters) {
        self.params.merge(params);
    }

    /// Merge another configuration's parameters into this one.
    pub fn merge(&mut self, other: &ResourceConfig) {
        self.add_parameters(&other.params);
    }

    /// Resolve namespace prefixes in the selector steps.
    pub fn bind_namespaces(&mut self, mappings: &NamespaceMappings) -> Result<(), SelectorError> {
        if self.is_xml_def() {
            return Ok(());
        }
        for step in &mut self.steps {
            step.bind_namespaces(mappings, &self.selector)?;
        }
        Ok(())
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn steps(&self) -> &[SelectorStep] {
        &self.steps
    }

    /// The last step, matched directly against the candidate node.
    pub fn target_step(&self) -> &SelectorStep {
        // Steps are never empty: `set_selector` rejects selectors without steps.
        &self.steps[self.steps.len() - 1]
    }

    /// Local name of the target element (`*`, `**` or `#document` for those targets).
    pub fn target_element(&self) -> &str {
        let target = self.target_step();
        match target.kind() {
            StepKind::Star => "*",
            StepKind::StarStar => "**",
            StepKind::Named => target.target().local_part(),
        }
    }

    pub fn target_attribute(&self) -> Option<&QName> {
        self.target_step().attribute()
    }

    /// Step names plus a trailing `@attr`.
    pub fn contextual_selector(&self) -> Vec<String> {
        selector::contextual_selector(&self.steps)
    }

    pub fn is_selector_contextual(&self) -> bool {
        self.contextual_selector().len() > 1
    }

    pub fn selector_namespace(&self) -> Option<&str> {
        self.selector_namespace.as_deref()
    }

    pub fn target_profile(&self) -> &str {
        &self.target_profile
    }

    pub fn profile_expressions(&self) -> &[ProfileTargetingExpression] {
        &self.profile_expressions
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn is_default_resource(&self) -> bool {
        self.default_resource
    }

    pub fn condition(&self) -> Option<&Arc<dyn ConditionEvaluator>> {
        self.condition.as_ref()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.params.get(name)
    }

    pub fn parameter_values<'a>(&'a self, name: &'a str) -> Vec<&'a str> {
        self.params.get_all(name).map(Parameter::value).collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.params.len()
    }

    pub fn string_parameter<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.parameter(name).map_or(default, Parameter::value)
    }

    /// `true`/`false` after trimming; anything else yields `default`.
    pub fn bool_parameter(&self, name: &str, default: bool) -> bool {
        match self.parameter(name).map(|p| p.value().trim()) {
            Some(v) if v.eq_ignore_ascii_case("true") => true,
            Some(v) if v.eq_ignore_ascii_case("false") => false,
            _ => default,
        }
    }

    pub fn extended_config_ns(&self) -> Option<&str> {
        self.extended_config_ns.as_deref()
    }

    pub fn is_xml_def(&self) -> bool {
        self.selector.starts_with(XML_DEF_PREFIX)
    }

    pub fn is_global_parameters(&self) -> bool {
        self.selector == GLOBAL_PARAMETERS
    }

    /// Does the configuration target the document fragment itself.
    pub fn is_document_targeted(&self) -> bool {
        self.steps.len() == 1 && self.steps[0].is_document()
    }

    /// Is the resource inline text rather than a reference.
    ///
    /// Resources containing characters not allowed in a URI reference are
    /// treated as inline.
    pub fn is_inline(&self) -> bool {
        self.resource.as_deref().is_some_and(|resource| {
            resource.chars().any(|c| {
                c.is_whitespace()
                    || matches!(c, '<' | '>' | '{' | '}' | '"' | '|' | '\\' | '^' | '`')
            })
        })
    }

    /// Resource type: the `restype` parameter, then the declared type, then
    /// `class` for handler class names, then the resource file extension.
    pub fn resource_type(&self) -> Option<String> {
        if let Some(restype) = self.parameter(PARAM_RESTYPE) {
            let restype = restype.value().trim();
            if !restype.is_empty() {
                return Some(restype.to_ascii_lowercase());
            }
        }
        if let Some(declared) = &self.resource_type {
            return Some(declared.clone());
        }

        let resource = self.resource.as_deref()?;
        if self.is_inline() {
            return None;
        }
        if is_class_name(resource) {
            return Some(CLASS_RESOURCE_TYPE.to_string());
        }
        let file_name = resource.rsplit('/').next().unwrap_or(resource);
        file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }

    /// Inline resource data: the `resdata` parameter, else inline resource text.
    pub fn resource_bytes(&self) -> Option<Vec<u8>> {
        if let Some(data) = self.parameter(PARAM_RESDATA) {
            return Some(data.value().as_bytes().to_vec());
        }
        if self.is_inline() {
            return self.resource.as_ref().map(|r| r.as_bytes().to_vec());
        }
        None
    }

    /// Does any of the profile expressions match the profile set.
    pub fn is_targeted_at_profile(&self, profile_set: &ProfileSet) -> bool {
        self.profile_expressions
            .iter()
            .any(|expression| expression.is_match(profile_set))
    }

    /// Is this configuration targeted at `node` in `ctx`.
    ///
    /// The condition is checked first, then the namespace (the selector
    /// namespace when set, else the target step's bound namespace), the
    /// target step's name, attribute and predicate, and finally the ancestor
    /// chain for contextual selectors.
    pub fn is_targeted_at_element<N: Node>(&self, node: &N, ctx: &ExecutionContext) -> bool {
        if !self.evaluate_condition(ctx) {
            return false;
        }

        let target = self.target_step();
        if target.is_document() {
            return false;
        }
        if !target.matches_name(node.local_name()) {
            return false;
        }

        let namespace_matches = match &self.selector_namespace {
            Some(ns) => node.namespace() == Some(ns.as_str()),
            None => target.is_targeted_at_namespace(node.namespace()),
        };
        if !namespace_matches {
            debug!(selector = %self.selector, element = node.local_name(), "Namespace mismatch");
            return false;
        }

        if target.is_rooted() && node.parent().is_some() {
            return false;
        }
        if let Some(attribute) = target.attribute() {
            if node
                .attribute(attribute.local_part(), attribute.namespace())
                .is_none()
            {
                return false;
            }
        }
        if !target.evaluate_predicate(node, ctx) {
            return false;
        }

        if self.steps.len() > 1 {
            return self.is_targeted_at_element_context(node, ctx);
        }
        true
    }

    /// Is this configuration targeted at the document fragment in `ctx`.
    pub fn is_targeted_at_document(&self, ctx: &ExecutionContext) -> bool {
        self.is_document_targeted() && self.evaluate_condition(ctx)
    }

    fn evaluate_condition(&self, ctx: &ExecutionContext) -> bool {
        match &self.condition {
            Some(condition) if !condition.eval(ctx) => {
                debug!(
                    selector = %self.selector,
                    condition = condition.expression(),
                    "Condition not satisfied"
                );
                false
            }
            _ => true,
        }
    }

    /// Walk the ancestors of `node` backwards through the selector steps.
    ///
    /// The target step has already been matched. `**` absorbs ancestors until
    /// one matches the step before it.
    pub fn is_targeted_at_element_context<N: Node>(&self, node: &N, ctx: &ExecutionContext) -> bool {
        let steps = &self.steps;
        let last = steps.len() - 1;
        let mut index = if steps[last].is_star_star() { last } else { last - 1 };
        let mut current = node.parent();

        while let Some(element) = current {
            let parent = element.parent();
            let step = &steps[index];

            if step.is_rooted() && !step.is_document() && parent.is_some() {
                return false;
            }

            match step.kind() {
                StepKind::Star => {
                    if index == 0 {
                        return true;
                    }
                    index -= 1;
                }
                StepKind::StarStar => {
                    if index == 0 {
                        return true;
                    }
                    let previous = &steps[index - 1];
                    if previous.is_document() {
                        if parent.is_none() {
                            return true;
                        }
                    } else if previous.is_targeted_at_element(&element)
                        && (!previous.is_rooted() || parent.is_none())
                        && previous.evaluate_predicate(&element, ctx)
                    {
                        if index == 1 {
                            return true;
                        }
                        index -= 2;
                    }
                }
                StepKind::Named => {
                    if step.is_document()
                        || !step.is_targeted_at_element(&element)
                        || !step.evaluate_predicate(&element, ctx)
                    {
                        return false;
                    }
                    if index == 0 {
                        return true;
                    }
                    index -= 1;
                }
            }

            current = parent;
        }

        steps[..=index]
            .iter()
            .all(|step| step.is_star_star() || step.is_document())
    }
}

/// Dotted identifier path ending in a capitalized type name, e.g. `zentinel.visitor.Log`.
fn is_class_name(resource: &str) -> bool {
    let segments: Vec<&str> = resource.split('.').collect();
    segments.len() > 1
        && segments.iter().all(|s| {
            let mut chars = s.chars();
            chars
                .next()
                .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        })
        && segments
            .last()
            .and_then(|s| s.chars().next())
            .is_some_and(char::is_uppercase)
}

impl fmt::Display for ResourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Target Profile: [{}], Selector: [{}], Selector Namespace: [{}], Resource: [{}], Num Params: [{}]",
            self.target_profile,
            self.selector,
            self.selector_namespace.as_deref().unwrap_or("-"),
            self.resource.as_deref().unwrap_or("-"),
            self.params.len()
        )
    }
}

impl PartialEq for ResourceConfig {
    fn eq(&self, other: &Self) -> bool {
        self.selector == other.selector
            && self.selector_namespace == other.selector_namespace
            && self.target_profile == other.target_profile
            && self.resource == other.resource
            && self.resource_type == other.resource_type
            && self.default_resource == other.default_resource
            && self.params == other.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tree::TreeNode;

    fn find<'a, 'input>(doc: &'a roxmltree::Document<'input>, name: &str) -> TreeNode<'a, 'input> {
        doc.descendants()
            .find(|n| n.is_element() && n.tag_name().name() == name)
            .map(TreeNode::new)
            .unwrap()
    }

    fn all<'a, 'input>(doc: &'a roxmltree::Document<'input>, name: &str) -> Vec<TreeNode<'a, 'input>> {
        doc.descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == name)
            .map(TreeNode::new)
            .collect()
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(ProfileSet::new("message-producer-A")).with_attribute("env", "prod")
    }

    fn targeted(selector: &str, xml: &str, element: &str) -> bool {
        let doc = roxmltree::Document::parse(xml).unwrap();
        let config = ResourceConfig::new(selector).unwrap();
        config.is_targeted_at_element(&find(&doc, element), &ctx())
    }

    #[test]
    fn test_contextual_parent_required() {
        let xml = "<root><order><order-header/></order><order-header/></root>";
        let doc = roxmltree::Document::parse(xml).unwrap();
        let config = ResourceConfig::new("order/order-header")
            .unwrap()
            .with_target_profile("message-producer-A")
            .unwrap();
        let headers = all(&doc, "order-header");

        assert!(config.is_targeted_at_element(&headers[0], &ctx()));
        assert!(!config.is_targeted_at_element(&headers[1], &ctx()));
    }

    #[test]
    fn test_rooted_star_star() {
        let xml = "<a><b><c/></b></a>";
        assert!(targeted("#document/a/**/c", xml, "c"));
        assert!(targeted("#document/a/**/b", xml, "b"));
        assert!(!targeted("#document/b/**/c", xml, "c"));
        assert!(targeted("a/**/c", xml, "c"));
        assert!(targeted("a/b/c", xml, "c"));
        assert!(!targeted("/b/c", xml, "c"));
        assert!(targeted("/a", xml, "a"));
        assert!(!targeted("/b", xml, "b"));
    }

    #[test]
    fn test_star_star_anchoring() {
        assert!(targeted("a/**/b", "<a><x><y><b/></y></x></a>", "b"));
        assert!(!targeted("a/**/b", "<b/>", "b"));
        assert!(!targeted("a/**/b", "<z><x><b/></x></z>", "b"));
        assert!(targeted("**/b", "<b/>", "b"));
        assert!(targeted("a/**", "<a><x><y/></x></a>", "y"));
        assert!(!targeted("a/**", "<z><x><y/></x></z>", "y"));
    }

    #[test]
    fn test_rooted_star_star_targets_every_element() {
        let config = ResourceConfig::new("#document/**").unwrap();
        assert_eq!(config.steps().len(), 1);
        assert!(config.steps()[0].is_star_star());
        assert!(targeted("#document/**", "<a><b/></a>", "a"));
        assert!(targeted("#document/**", "<a><b/></a>", "b"));
    }

    #[test]
    fn test_star_step() {
        let xml = "<a><b><c/></b></a>";
        assert!(targeted("a/*/c", xml, "c"));
        assert!(!targeted("a/*/c", "<a><c/></a>", "c"));
        assert!(targeted("*", xml, "b"));
    }

    #[test]
    fn test_legacy_document_steps() {
        let xml = "<a1><b2/></a1>";
        assert!(targeted("/a1 b2/@x", "<a1><b2 x='1'/></a1>", "b2"));
        assert!(!targeted("/a1 b2/@x", xml, "b2"));
        assert!(!targeted("/a1 b2/@x", "<r><a1><b2 x='1'/></a1></r>", "b2"));
    }

    #[test]
    fn test_predicates_in_context() {
        let xml = r#"<x><y d="23"><z/></y><y d="24"><z/></y></x>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let config = ResourceConfig::new("x/y[@d = '23']/*").unwrap();
        let zs = all(&doc, "z");
        assert!(config.is_targeted_at_element(&zs[0], &ctx()));
        assert!(!config.is_targeted_at_element(&zs[1], &ctx()));

        let config = ResourceConfig::new("x/y[2]/z").unwrap();
        assert!(!config.is_targeted_at_element(&zs[0], &ctx()));
        assert!(config.is_targeted_at_element(&zs[1], &ctx()));
    }

    #[test]
    fn test_attribute_target() {
        assert!(targeted("a/@id", r#"<a id="1"/>"#, "a"));
        assert!(!targeted("a/@id", "<a/>", "a"));
        assert!(targeted("@id", r#"<q id="1"/>"#, "q"));
    }

    #[test]
    fn test_selector_namespace() {
        let xml = r#"<r xmlns:a="http://a"><a:item/><item/></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let items = all(&doc, "item");
        let config = ResourceConfig::new("item")
            .unwrap()
            .with_selector_namespace("http://a");
        assert!(config.is_targeted_at_element(&items[0], &ctx()));
        assert!(!config.is_targeted_at_element(&items[1], &ctx()));

        let wildcard = ResourceConfig::new("item").unwrap().with_selector_namespace("*");
        assert_eq!(wildcard.selector_namespace(), None);
        assert!(wildcard.is_targeted_at_element(&items[1], &ctx()));
    }

    #[test]
    fn test_bound_step_namespace() {
        let xml = r#"<r xmlns:a="http://a" xmlns:b="http://b"><a:item/><b:item/></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let items = all(&doc, "item");
        let mut config = ResourceConfig::new("x:item").unwrap();
        config
            .bind_namespaces(&NamespaceMappings::new().with("x", "http://b"))
            .unwrap();
        assert!(!config.is_targeted_at_element(&items[0], &ctx()));
        assert!(config.is_targeted_at_element(&items[1], &ctx()));
    }

    #[test]
    fn test_condition_short_circuits() {
        let xml = "<a/>";
        let doc = roxmltree::Document::parse(xml).unwrap();
        let node = find(&doc, "a");
        let registry = ConditionRegistry::new();

        let config = ResourceConfig::new("a")
            .unwrap()
            .with_condition(registry.create("context", "${env} == 'dev'", None).unwrap());
        assert!(!config.is_targeted_at_element(&node, &ctx()));

        let config = ResourceConfig::new("a")
            .unwrap()
            .with_condition(registry.create("context", "${env} == 'prod'", None).unwrap());
        assert!(config.is_targeted_at_element(&node, &ctx()));
    }

    #[test]
    fn test_profile_targeting() {
        let config = ResourceConfig::new("a")
            .unwrap()
            .with_target_profile("not:profileX")
            .unwrap();
        assert!(!config.is_targeted_at_profile(&ProfileSet::new("profileX")));
        assert!(config.is_targeted_at_profile(&ProfileSet::new("profileY")));

        let config = ResourceConfig::new("a").unwrap().with_target_profile("  ").unwrap();
        assert_eq!(config.target_profile(), "*");
        assert!(config.is_targeted_at_profile(&ProfileSet::new("anything")));

        assert!(matches!(
            ResourceConfig::new("a").unwrap().with_target_profile(", ,"),
            Err(ResourceError::Profile(_))
        ));
    }

    #[test]
    fn test_invalid_selector_is_an_error() {
        assert!(matches!(
            ResourceConfig::new("chapter[title=\"Introduction\"]"),
            Err(ResourceError::Selector(_))
        ));
        assert!(ResourceConfig::new("").is_err());
    }

    #[test]
    fn test_document_target() {
        let config = ResourceConfig::new("#document").unwrap();
        assert!(config.is_document_targeted());
        assert!(config.is_targeted_at_document(&ctx()));
        assert!(!targeted("#document", "<a/>", "a"));
        assert_eq!(config.target_element(), "#document");
    }

    #[test]
    fn test_resource_type_inference() {
        let config = ResourceConfig::new("a").unwrap().with_resource("zentinel.visitor.Log");
        assert_eq!(config.resource_type().as_deref(), Some("class"));
        assert!(!config.is_inline());

        let config = ResourceConfig::new("a").unwrap().with_resource("templates/order.tpl");
        assert_eq!(config.resource_type().as_deref(), Some("tpl"));

        let config = ResourceConfig::new("a")
            .unwrap()
            .with_resource("<b>${element.name}</b>")
            .with_resource_type("template");
        assert!(config.is_inline());
        assert_eq!(config.resource_type().as_deref(), Some("template"));
        assert_eq!(
            config.resource_bytes(),
            Some(b"<b>${element.name}</b>".to_vec())
        );

        let config = ResourceConfig::new("a")
            .unwrap()
            .with_resource("x.tpl")
            .with_parameter(PARAM_RESTYPE, "TXT")
            .with_parameter(PARAM_RESDATA, "hello");
        assert_eq!(config.resource_type().as_deref(), Some("txt"));
        assert_eq!(config.resource_bytes(), Some(b"hello".to_vec()));
    }

    #[test]
    fn test_parameter_accessors() {
        let config = ResourceConfig::new("a")
            .unwrap()
            .with_parameter("flag", " TRUE ")
            .with_parameter("name", "x")
            .with_parameter("name", "y")
            .with_typed_parameter("n", "3", "int");

        assert!(config.bool_parameter("flag", false));
        assert!(config.bool_parameter("missing", true));
        assert!(!config.bool_parameter("name", false));
        assert_eq!(config.string_parameter("name", "d"), "x");
        assert_eq!(config.string_parameter("missing", "d"), "d");
        assert_eq!(config.parameter_values("name"), vec!["x", "y"]);
        assert_eq!(config.parameter_count(), 4);
        assert_eq!(
            config.parameter("n").unwrap().typed_value(),
            Ok(&ParamValue::Integer(3))
        );
    }

    #[test]
    fn test_contextual_selector() {
        let config = ResourceConfig::new("table tr td").unwrap();
        assert_eq!(config.contextual_selector(), vec!["table", "tr", "td"]);
        assert!(config.is_selector_contextual());
        assert_eq!(config.target_element(), "td");

        let config = ResourceConfig::new("a/@b").unwrap();
        assert!(config.is_selector_contextual());
        assert_eq!(config.target_attribute().map(QName::local_part), Some("b"));
    }

    #[test]
    fn test_xml_def_selector() {
        let config = ResourceConfig::new("xmldef:selector").unwrap();
        assert!(config.is_xml_def());
        assert_eq!(config.steps().len(), 1);
        assert!(!config.is_selector_contextual());
    }

    #[test]
    fn test_merge() {
        let mut config = ResourceConfig::new("a").unwrap().with_parameter("x", "1");
        let other = ResourceConfig::new("b")
            .unwrap()
            .with_parameter("x", "2")
            .with_parameter("y", "3");
        config.merge(&other);
        assert_eq!(config.string_parameter("x", ""), "1");
        assert_eq!(config.string_parameter("y", ""), "3");
    }

    #[test]
    fn test_display() {
        let config = ResourceConfig::new("a/b")
            .unwrap()
            .with_resource("zentinel.visitor.Log")
            .with_parameter("x", "1");
        assert_eq!(
            config.to_string(),
            "Target Profile: [*], Selector: [a/b], Selector Namespace: [-], Resource: [zentinel.visitor.Log], Num Params: [1]"
        );
    }
}
