//! Configuration store.
//!
//! Lists of resource configurations are published as immutable snapshots.
//! Readers load the current snapshot without locking; writers build a new
//! snapshot and swap it in. A traversal that loaded a snapshot keeps using it
//! even if the store is reconfigured meanwhile.

use crate::profile::{ProfileSet, ProfileStore};
use crate::resolver::ResourceResolver;
use crate::resource::{Parameters, ResourceConfig};
use crate::selector::{NamespaceMappings, SelectorError};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Name of the list `register` appends to.
pub const DEFAULT_LIST_NAME: &str = "default";

/// A named, ordered collection of configurations, e.g. one loaded file.
#[derive(Debug, Clone, Default)]
pub struct ResourceConfigList {
    name: String,
    configs: Vec<Arc<ResourceConfig>>,
    profiles: Vec<ProfileSet>,
    system: bool,
}

impl ResourceConfigList {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// A list of built-in configurations, excluded from [`ConfigStore::user_defined`].
    pub fn system(name: impl Into<String>) -> Self {
        Self {
            system: true,
            ..Self::new(name)
        }
    }

    pub fn add(&mut self, config: ResourceConfig) {
        self.configs.push(Arc::new(config));
    }

    pub fn add_shared(&mut self, config: Arc<ResourceConfig>) {
        self.configs.push(config);
    }

    /// Declare a profile set alongside the configurations.
    pub fn add_profile_set(&mut self, profile_set: ProfileSet) {
        self.profiles.push(profile_set);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn configs(&self) -> &[Arc<ResourceConfig>] {
        &self.configs
    }

    pub fn profile_sets(&self) -> &[ProfileSet] {
        &self.profiles
    }

    pub fn is_system(&self) -> bool {
        self.system
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Bind namespace prefixes on every configuration.
    pub fn bind_namespaces(&mut self, mappings: &NamespaceMappings) -> Result<(), SelectorError> {
        for config in &mut self.configs {
            Arc::make_mut(config).bind_namespaces(mappings)?;
        }
        Ok(())
    }
}

/// Search criteria for [`ConfigStore::lookup`]. Every field given must match.
#[derive(Debug, Clone, Default)]
pub struct ConfigSearch {
    config_namespace: Option<String>,
    selector: Option<String>,
    selector_namespace: Option<String>,
    resource: Option<String>,
    params: Vec<(String, String)>,
}

impl ConfigSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match configurations whose extension namespace starts with `namespace`.
    pub fn config_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config_namespace = Some(namespace.into());
        self
    }

    /// Match the selector, ignoring ASCII case.
    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn selector_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.selector_namespace = Some(namespace.into());
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Some value of parameter `name` must equal `value`.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn matches(&self, config: &ResourceConfig) -> bool {
        if let Some(prefix) = &self.config_namespace {
            if !config
                .extended_config_ns()
                .is_some_and(|ns| ns.starts_with(prefix.as_str()))
            {
                return false;
            }
        }
        if let Some(selector) = &self.selector {
            if !config.selector().eq_ignore_ascii_case(selector) {
                return false;
            }
        }
        if let Some(namespace) = &self.selector_namespace {
            if config.selector_namespace() != Some(namespace.as_str()) {
                return false;
            }
        }
        if let Some(resource) = &self.resource {
            if config.resource() != Some(resource.as_str()) {
                return false;
            }
        }
        self.params
            .iter()
            .all(|(name, value)| config.parameter_values(name).contains(&value.as_str()))
    }
}

/// One published state of the store.
#[derive(Debug, Default)]
struct Snapshot {
    lists: Vec<Arc<ResourceConfigList>>,
    profiles: ProfileStore,
    global_params: Arc<Parameters>,
    generation: u64,
}

impl Snapshot {
    fn publish(lists: Vec<Arc<ResourceConfigList>>, generation: u64) -> Self {
        let mut profiles = ProfileStore::new();
        for list in &lists {
            for profile_set in list.profile_sets() {
                profiles.add(profile_set.clone());
            }
        }

        // Later registrations take precedence.
        let mut global_params = Parameters::new();
        for config in lists
            .iter()
            .flat_map(|list| list.configs())
            .rev()
            .filter(|config| config.is_global_parameters())
        {
            global_params.merge(config.parameters());
        }

        Self {
            lists,
            profiles,
            global_params: Arc::new(global_params),
            generation,
        }
    }
}

#[derive(Debug, Default)]
struct ResolverCache {
    generation: u64,
    resolvers: HashMap<String, Arc<ResourceResolver>>,
}

/// Shared, long-lived store of configuration lists.
#[derive(Debug)]
pub struct ConfigStore {
    snapshot: ArcSwap<Snapshot>,
    resolvers: ArcSwap<ResolverCache>,
    writer: Mutex<()>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    /// Create a store holding one empty default list.
    pub fn new() -> Self {
        let lists = vec![Arc::new(ResourceConfigList::new(DEFAULT_LIST_NAME))];
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::publish(lists, 0)),
            resolvers: ArcSwap::from_pointee(ResolverCache::default()),
            writer: Mutex::new(()),
        }
    }

    /// Append a configuration to the default list.
    pub fn register(&self, config: ResourceConfig) {
        debug!(config = %config, "Registering resource configuration");
        self.update(|lists| {
            let default = lists
                .iter_mut()
                .find(|list| list.name() == DEFAULT_LIST_NAME && !list.is_system());
            match default {
                Some(list) => Arc::make_mut(list).add(config),
                None => {
                    let mut list = ResourceConfigList::new(DEFAULT_LIST_NAME);
                    list.add(config);
                    lists.insert(0, Arc::new(list));
                }
            }
        });
    }

    /// Add a whole list, e.g. one loaded configuration file.
    pub fn add_list(&self, list: ResourceConfigList) {
        info!(
            list = list.name(),
            configs = list.len(),
            profiles = list.profile_sets().len(),
            system = list.is_system(),
            "Adding resource configuration list"
        );
        self.update(|lists| {
            lists.push(Arc::new(list));
        });
    }

    /// Rebind namespace prefixes on every configuration in every list.
    ///
    /// Nothing is published if any selector fails to bind.
    pub fn bind_namespaces(&self, mappings: &NamespaceMappings) -> Result<(), SelectorError> {
        self.try_update(|lists| {
            for list in lists.iter_mut() {
                Arc::make_mut(list).bind_namespaces(mappings)?;
            }
            Ok(())
        })
    }

    fn update<F>(&self, mutate: F)
    where
        F: FnOnce(&mut Vec<Arc<ResourceConfigList>>),
    {
        let _ = self.try_update(|lists| {
            mutate(lists);
            Ok::<_, Infallible>(())
        });
    }

    fn try_update<F, E>(&self, mutate: F) -> Result<(), E>
    where
        F: FnOnce(&mut Vec<Arc<ResourceConfigList>>) -> Result<(), E>,
    {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot.load();
        let mut lists = current.lists.clone();
        mutate(&mut lists)?;
        self.snapshot
            .store(Arc::new(Snapshot::publish(lists, current.generation + 1)));
        Ok(())
    }

    /// Snapshot of all lists.
    pub fn lists(&self) -> Vec<Arc<ResourceConfigList>> {
        self.snapshot.load().lists.clone()
    }

    /// Every configuration whose profile expressions match `profile_set`, unsorted.
    pub fn configurations(&self, profile_set: &ProfileSet) -> Vec<Arc<ResourceConfig>> {
        self.snapshot
            .load()
            .lists
            .iter()
            .flat_map(|list| list.configs())
            .filter(|config| config.is_targeted_at_profile(profile_set))
            .cloned()
            .collect()
    }

    /// Configurations matching every given search field.
    pub fn lookup(&self, search: &ConfigSearch) -> Vec<Arc<ResourceConfig>> {
        self.snapshot
            .load()
            .lists
            .iter()
            .flat_map(|list| list.configs())
            .filter(|config| search.matches(config))
            .cloned()
            .collect()
    }

    /// Configurations from non-system lists.
    pub fn user_defined(&self) -> Vec<Arc<ResourceConfig>> {
        self.snapshot
            .load()
            .lists
            .iter()
            .filter(|list| !list.is_system())
            .flat_map(|list| list.configs())
            .cloned()
            .collect()
    }

    /// Total number of configurations.
    pub fn len(&self) -> usize {
        self.snapshot.load().lists.iter().map(|list| list.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merged parameters of all `global-parameters` configurations.
    pub fn global_params(&self) -> Arc<Parameters> {
        Arc::clone(&self.snapshot.load().global_params)
    }

    /// The declared profile set for `base`, or a set holding only `base`.
    pub fn profile_set(&self, base: &str) -> ProfileSet {
        self.snapshot.load().profiles.get(base).unwrap_or_else(|| {
            debug!(base, "No declared profile set, using base profile only");
            ProfileSet::new(base)
        })
    }

    /// The cached resolver for `profile_set`, building it on first use.
    ///
    /// Cached resolvers are discarded whenever the store changes.
    pub fn resolver(&self, profile_set: &ProfileSet) -> Arc<ResourceResolver> {
        let snapshot = self.snapshot.load_full();
        let key = profile_set.cache_key();

        let cache = self.resolvers.load();
        if cache.generation == snapshot.generation {
            if let Some(resolver) = cache.resolvers.get(&key) {
                return Arc::clone(resolver);
            }
        }

        let configs = snapshot
            .lists
            .iter()
            .flat_map(|list| list.configs())
            .filter(|config| config.is_targeted_at_profile(profile_set))
            .cloned()
            .collect();
        let resolver = Arc::new(ResourceResolver::new(
            profile_set.clone(),
            configs,
            Arc::clone(&snapshot.global_params),
        ));
        debug!(
            profile_set = %profile_set,
            configs = resolver.len(),
            generation = snapshot.generation,
            "Built resource resolver"
        );

        self.resolvers.rcu(|cache| {
            if cache.generation > snapshot.generation {
                return Arc::clone(cache);
            }
            let mut resolvers = if cache.generation == snapshot.generation {
                cache.resolvers.clone()
            } else {
                HashMap::new()
            };
            resolvers.insert(key.clone(), Arc::clone(&resolver));
            Arc::new(ResolverCache {
                generation: snapshot.generation,
                resolvers,
            })
        });

        resolver
    }
}
