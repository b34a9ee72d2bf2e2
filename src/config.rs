//! Configuration file model.
//!
//! A file declares namespaces, profile sets, named conditions and resource
//! configurations. [`ResourceConfigFile::build_list`] compiles it into a
//! [`ResourceConfigList`]; any invalid entry aborts the whole file.

use crate::profile::{Profile, ProfileSet};
use crate::resource::{ConditionError, ConditionRegistry, ResourceConfig, ResourceError};
use crate::selector::{NamespaceMappings, SelectorError, SELECTOR_NONE};
use crate::store::ResourceConfigList;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Example configuration printed by `--example-config`.
pub const EXAMPLE_CONFIG: &str = r#"# Resource configuration example
version: "1"

settings:
  # Invoke content handlers for matched resources
  apply_handlers: true
  # Base directory for relative template resources
  template_dir: "/etc/zentinel/templates"
  # Front end used when none is given on the command line: tree or stream
  default_mode: tree

namespaces:
  ord: "http://zentinel.example/orders"

profiles:
  - base: "message-producer-A"
    sub_profiles: ["producers", "eu;q=0.5"]

conditions:
  - id: "prod"
    evaluator: context
    expression: "${env} == 'prod'"

resources:
  # Log every order header below an order
  - selector: "ord:order/ord:order-header"
    target_profile: "producers"
    resource: "zentinel.visitor.Log"
    params:
      - { name: "message", value: "header ${element.path} for ${profile.base}" }

  # Render a template for each item, production only
  - selector: "order/**/item[@qty > 10]"
    condition: "prod"
    resource: "bulk ${element.attr.sku}"
    resource_type: template

  # Fallback when nothing more specific matches
  - selector: "*"
    default_resource: true
    resource: "zentinel.visitor.Log"
    params:
      - { name: "level", value: "debug" }

  # Parameters visible to every resource
  - selector: "global-parameters"
    params:
      - { name: "stream.filter.type", value: "SAX" }
"#;

/// A resource configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfigFile {
    /// Configuration version
    pub version: String,
    /// Global settings
    pub settings: Settings,
    /// Prefix to namespace URI mappings used by selectors
    pub namespaces: BTreeMap<String, String>,
    /// Declared profile sets
    pub profiles: Vec<ProfileSetEntry>,
    /// Named conditions
    pub conditions: Vec<ConditionEntry>,
    /// Resource configurations, in registration order
    pub resources: Vec<ResourceEntry>,
}

impl Default for ResourceConfigFile {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            settings: Settings::default(),
            namespaces: BTreeMap::new(),
            profiles: vec![],
            conditions: vec![],
            resources: vec![],
        }
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Invoke content handlers for matched resources
    pub apply_handlers: bool,
    /// Template directory path
    pub template_dir: Option<PathBuf>,
    /// Default front end
    pub default_mode: FilterMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            apply_handlers: true,
            template_dir: Some(PathBuf::from("/etc/zentinel/templates")),
            default_mode: FilterMode::Tree,
        }
    }
}

/// Document front end.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Parse the whole document with `roxmltree`
    #[default]
    Tree,
    /// Pull events with `quick-xml`
    Stream,
}

/// A declared profile set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSetEntry {
    /// Base profile
    pub base: String,
    /// Sub-profiles, optionally weighted (`name;q=0.5`)
    #[serde(default)]
    pub sub_profiles: Vec<String>,
}

impl ProfileSetEntry {
    pub fn to_profile_set(&self) -> ProfileSet {
        let mut profile_set = ProfileSet::new(self.base.trim());
        for sub_profile in &self.sub_profiles {
            profile_set.add_profile(Profile::parse(sub_profile));
        }
        profile_set
    }
}

/// A named condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionEntry {
    /// Condition id referenced by resources
    pub id: String,
    #[serde(flatten)]
    pub condition: InlineCondition,
}

/// Condition body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineCondition {
    /// Evaluator kind: context or regex
    #[serde(default = "default_evaluator")]
    pub evaluator: String,
    /// Expression (or pattern)
    pub expression: String,
    /// Interpolated subject for regex conditions
    #[serde(default)]
    pub subject: Option<String>,
}

fn default_evaluator() -> String {
    "context".to_string()
}

/// Condition reference on a resource: a named condition id or an inline body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionRef {
    Id(String),
    Inline(InlineCondition),
}

/// One resource entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEntry {
    /// Selector, or several separated by commas
    #[serde(default = "default_selector")]
    pub selector: String,
    /// Namespace the target element must be in (`*` for any)
    #[serde(default)]
    pub selector_namespace: Option<String>,
    /// Target profile expressions
    #[serde(default)]
    pub target_profile: Option<String>,
    /// Resource payload
    #[serde(default)]
    pub resource: Option<String>,
    /// Declared resource type
    #[serde(default)]
    pub resource_type: Option<String>,
    /// Apply only when nothing else matches
    #[serde(default)]
    pub default_resource: bool,
    /// Gate condition
    #[serde(default)]
    pub condition: Option<ConditionRef>,
    /// Parameters
    #[serde(default)]
    pub params: Vec<ParamEntry>,
    /// Namespace of the extension that produced this entry
    #[serde(default)]
    pub extended_config_ns: Option<String>,
}

fn default_selector() -> String {
    SELECTOR_NONE.to_string()
}

/// One parameter. Scalar values are kept as text, lists are comma joined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamEntry {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default, rename = "type")]
    pub param_type: Option<String>,
}

impl ParamEntry {
    pub fn value_string(&self) -> String {
        value_string(&self.value)
    }
}

fn value_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(value_string)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid resource '{selector}': {source}")]
    Resource {
        selector: String,
        #[source]
        source: ResourceError,
    },

    #[error("Invalid condition on '{selector}': {source}")]
    Condition {
        selector: String,
        #[source]
        source: ConditionError,
    },

    #[error(transparent)]
    Selector(#[from] SelectorError),
}

impl ResourceConfigFile {
    /// Parse a YAML configuration.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a file; `.json` files are JSON, anything else YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if path.extension().is_some_and(|e| e == "json") {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    pub fn namespace_mappings(&self) -> NamespaceMappings {
        self.namespaces
            .iter()
            .map(|(prefix, uri)| (prefix.clone(), uri.clone()))
            .collect()
    }

    /// Compile every entry into a list named `name`.
    ///
    /// Comma-separated selectors yield one configuration each.
    pub fn build_list(&self, name: &str) -> Result<ResourceConfigList, ConfigError> {
        let mut conditions = ConditionRegistry::new();
        for entry in &self.conditions {
            let c = &entry.condition;
            conditions
                .define(&entry.id, &c.evaluator, &c.expression, c.subject.as_deref())
                .map_err(|source| ConfigError::Condition {
                    selector: format!("condition:{}", entry.id),
                    source,
                })?;
        }

        let mappings = self.namespace_mappings();
        let mut list = ResourceConfigList::new(name);

        for entry in &self.profiles {
            list.add_profile_set(entry.to_profile_set());
        }

        for entry in &self.resources {
            let selectors: Vec<&str> = entry
                .selector
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            if selectors.is_empty() {
                return Err(ConfigError::Resource {
                    selector: entry.selector.clone(),
                    source: ResourceError::Selector(SelectorError::Empty),
                });
            }

            let condition = match &entry.condition {
                None => None,
                Some(ConditionRef::Id(id)) => Some(conditions.get(id)),
                Some(ConditionRef::Inline(c)) => Some(conditions.create(
                    &c.evaluator,
                    &c.expression,
                    c.subject.as_deref(),
                )),
            }
            .transpose()
            .map_err(|source| ConfigError::Condition {
                selector: entry.selector.clone(),
                source,
            })?;

            for selector in selectors {
                let mut config = build_config(entry, selector).map_err(|source| {
                    ConfigError::Resource {
                        selector: selector.to_string(),
                        source,
                    }
                })?;
                if let Some(condition) = &condition {
                    config = config.with_condition(Arc::clone(condition));
                }
                config.bind_namespaces(&mappings)?;
                debug!(config = %config, "Compiled resource configuration");
                list.add(config);
            }
        }

        info!(
            list = name,
            configs = list.len(),
            profiles = list.profile_sets().len(),
            conditions = self.conditions.len(),
            "Resource configuration loaded"
        );
        Ok(list)
    }
}

fn build_config(entry: &ResourceEntry, selector: &str) -> Result<ResourceConfig, ResourceError> {
    let mut config = ResourceConfig::new(selector)?
        .with_target_profile(entry.target_profile.as_deref().unwrap_or_default())?
        .with_default_resource(entry.default_resource);

    if let Some(namespace) = &entry.selector_namespace {
        config = config.with_selector_namespace(namespace);
    }
    if let Some(resource) = &entry.resource {
        config = config.with_resource(resource);
    }
    if let Some(resource_type) = &entry.resource_type {
        config = config.with_resource_type(resource_type);
    }
    if let Some(namespace) = &entry.extended_config_ns {
        config = config.with_extended_config_ns(namespace);
    }
    for param in &entry.params {
        let value = param.value_string();
        config = match &param.param_type {
            Some(param_type) => config.with_typed_parameter(&param.name, &value, param_type),
            None => config.with_parameter(&param.name, &value),
        };
    }
    Ok(config)
}
