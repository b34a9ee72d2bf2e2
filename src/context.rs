//! Execution context for variable resolution and interpolation.

use crate::profile::ProfileSet;
use crate::resource::{Parameter, Parameters, ResourceConfig};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// Regex for matching variable expressions like ${...}
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// State available while one document is filtered.
///
/// Passed explicitly to conditions, predicates and handlers.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Profiles active for this run
    pub profile_set: ProfileSet,
    /// Caller supplied attributes
    pub attributes: HashMap<String, String>,
    /// Name of the document being filtered
    pub document: Option<String>,
    /// Context creation time
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Correlation ID
    pub correlation_id: String,
    /// Store-wide parameter defaults
    global_params: Arc<Parameters>,
    /// Lines emitted by handlers
    output: Vec<String>,
}

impl ExecutionContext {
    /// Create a new execution context.
    pub fn new(profile_set: ProfileSet) -> Self {
        let timestamp = chrono::Utc::now();
        Self {
            profile_set,
            attributes: HashMap::new(),
            document: None,
            correlation_id: format!("{:x}", timestamp.timestamp_nanos_opt().unwrap_or_default()),
            timestamp,
            global_params: Arc::new(Parameters::new()),
            output: Vec::new(),
        }
    }

    /// Set the correlation ID.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Add one attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Add attributes.
    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Set the document name.
    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    /// Set the global parameter layer.
    pub fn with_global_params(mut self, params: Arc<Parameters>) -> Self {
        self.global_params = params;
        self
    }

    pub(crate) fn set_global_params(&mut self, params: Arc<Parameters>) {
        self.global_params = params;
    }

    /// Look up a parameter on a configuration, falling back to the global layer.
    pub fn parameter<'a>(&'a self, config: &'a ResourceConfig, name: &str) -> Option<&'a Parameter> {
        config
            .parameters()
            .get(name)
            .or_else(|| self.global_params.get(name))
    }

    /// Global parameter layer.
    pub fn global_params(&self) -> &Parameters {
        &self.global_params
    }

    /// Append a line of handler output.
    pub fn emit(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    /// Handler output so far.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Drain handler output.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// Resolve a variable expression.
    ///
    /// Supports:
    /// - `${profile.base}` - Base profile name
    /// - `${profile.set}` - Profile set summary
    /// - `${profile.has.name}` - `true` if `name` is a member profile
    /// - `${attr.name}` or `${name}` - Context attribute
    /// - `${document}` - Document name
    /// - `${correlation_id}` - Correlation ID
    /// - `${now}` - Context timestamp (ISO 8601)
    pub fn resolve(&self, expr: &str) -> Option<String> {
        let parts: Vec<&str> = expr.trim().splitn(2, '.').collect();

        match parts[0] {
            "profile" => self.resolve_profile(parts.get(1).unwrap_or(&"")),
            "attr" => {
                let key = parts.get(1)?;
                self.attributes.get(*key).cloned()
            }
            "document" => self.document.clone(),
            "correlation_id" => Some(self.correlation_id.clone()),
            "now" => Some(self.timestamp.to_rfc3339()),
            _ => self.attributes.get(expr.trim()).cloned(),
        }
    }

    /// Interpolate all ${...} variables in a string.
    pub fn interpolate(&self, template: &str) -> String {
        self.interpolate_with(template, |_| None)
    }

    /// Interpolate, consulting `lookup` before the context's own variables.
    pub fn interpolate_with<F>(&self, template: &str, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        VAR_REGEX
            .replace_all(template, |caps: &regex::Captures| {
                let var_name = &caps[1];
                lookup(var_name)
                    .or_else(|| self.resolve(var_name))
                    .unwrap_or_default()
            })
            .to_string()
    }

    fn resolve_profile(&self, path: &str) -> Option<String> {
        let parts: Vec<&str> = path.splitn(2, '.').collect();

        match parts[0] {
            "base" => Some(self.profile_set.base_profile().to_string()),
            "set" => Some(self.profile_set.to_string()),
            "has" => {
                let name = parts.get(1)?;
                Some(self.profile_set.is_member(name).to_string())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_context() -> ExecutionContext {
        let profile_set = ProfileSet::new("message-producer-A").with_profiles(["producers"]);
        ExecutionContext::new(profile_set)
            .with_correlation_id("test-correlation-id")
            .with_attribute("env", "prod")
            .with_attribute("region", "eu")
            .with_document("order.xml")
    }

    #[test]
    fn test_resolve_profile() {
        let ctx = make_context();

        assert_eq!(
            ctx.resolve("profile.base"),
            Some("message-producer-A".to_string())
        );
        assert_eq!(ctx.resolve("profile.has.producers"), Some("true".to_string()));
        assert_eq!(ctx.resolve("profile.has.consumers"), Some("false".to_string()));
        assert_eq!(ctx.resolve("profile.unknown"), None);
    }

    #[test]
    fn test_resolve_attributes() {
        let ctx = make_context();

        assert_eq!(ctx.resolve("attr.env"), Some("prod".to_string()));
        assert_eq!(ctx.resolve("region"), Some("eu".to_string()));
        assert_eq!(ctx.resolve("missing"), None);
        assert_eq!(ctx.resolve("document"), Some("order.xml".to_string()));
    }

    #[test]
    fn test_interpolate() {
        let ctx = make_context();

        let result = ctx.interpolate("${profile.base}/${env}/${missing}");
        assert_eq!(result, "message-producer-A/prod/");

        let result =
            ctx.interpolate_with("${element.name} in ${env}", |var| {
                (var == "element.name").then(|| "order".to_string())
            });
        assert_eq!(result, "order in prod");
    }

    #[test]
    fn test_correlation_id() {
        let ctx = make_context();
        assert_eq!(
            ctx.resolve("correlation_id"),
            Some("test-correlation-id".to_string())
        );
        assert!(!ExecutionContext::new(ProfileSet::new("p")).correlation_id.is_empty());
    }

    #[test]
    fn test_parameter_falls_back_to_global() {
        let mut global = Parameters::new();
        global.add(Parameter::new("timeout", "30"));
        global.add(Parameter::new("mode", "global"));
        let ctx = make_context().with_global_params(Arc::new(global));

        let config = ResourceConfig::new("order")
            .unwrap()
            .with_parameter("mode", "local");

        assert_eq!(ctx.parameter(&config, "mode").map(Parameter::value), Some("local"));
        assert_eq!(ctx.parameter(&config, "timeout").map(Parameter::value), Some("30"));
        assert!(ctx.parameter(&config, "missing").is_none());
    }

    #[test]
    fn test_output() {
        let mut ctx = make_context();
        ctx.emit("one");
        ctx.emit("two");
        assert_eq!(ctx.output(), ["one", "two"]);
        assert_eq!(ctx.take_output().len(), 2);
        assert!(ctx.output().is_empty());
    }
}
