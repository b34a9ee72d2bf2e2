//! Resource configuration targeting for Zentinel document transforms.
//!
//! Declarative rules (`selector` + `target-profile` + `namespace` +
//! `condition`) are compiled into matchers, and the configurations that apply
//! to each document fragment are resolved in specificity order:
//!
//! - Profile sets and profile targeting expressions (`producer-A AND not:test`)
//! - Selector steps with `*`, `**`, `#document`, `@attr` and predicates
//! - Specificity ordering, most specific first, stable on ties
//! - A copy-on-write configuration store with global parameters
//! - Tree (`roxmltree`) and event (`quick-xml`) front ends over one matcher
//!
//! ## Configuration Example
//!
//! ```yaml
//! namespaces:
//!   ord: "http://zentinel.example/orders"
//! resources:
//!   - selector: "ord:order/**/ord:item[@qty > 10]"
//!     target_profile: "producers AND not:test"
//!     resource: "zentinel.visitor.Log"
//! ```

pub mod config;
pub mod context;
pub mod driver;
pub mod handler;
pub mod node;
pub mod profile;
pub mod resolver;
pub mod resource;
pub mod selector;
pub mod specificity;
pub mod store;

pub use config::{ConfigError, FilterMode, ResourceConfigFile, Settings, EXAMPLE_CONFIG};
pub use context::ExecutionContext;
pub use driver::{DriverError, FilterDriver, FilterReport, MatchedResource, Visit};
pub use handler::{ContentHandler, ContentHandlerFactory, HandlerError, HandlerRegistry};
pub use node::Node;
pub use profile::{
    Profile, ProfileError, ProfileSet, ProfileStore, ProfileTargetingExpression, DEFAULT_PROFILE,
};
pub use resolver::ResourceResolver;
pub use resource::{
    ConditionError, ConditionEvaluator, ConditionRegistry, DecodeError, Parameter, Parameters,
    ResourceConfig, ResourceError,
};
pub use selector::{build_steps, NamespaceMappings, SelectorError, SelectorStep};
pub use specificity::{compare, sort_by_specificity, specificity};
pub use store::{ConfigSearch, ConfigStore, ResourceConfigList};
