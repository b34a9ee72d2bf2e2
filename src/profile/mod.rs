//! Profiles and profile sets.
//!
//! A profile is a named capability tag attached to an execution context. Every
//! execution context carries a [`ProfileSet`]: one base profile plus the
//! sub-profiles it belongs to. Resource configurations target profile sets
//! through [`ProfileTargetingExpression`]s.

mod expression;

pub use expression::{parse_target_profile, ExpressionToken, ProfileTargetingExpression};

use std::collections::{HashMap, HashSet};
use std::fmt;

/// Target profile used when a configuration does not declare one.
pub const DEFAULT_PROFILE: &str = "*";

/// A single named profile.
///
/// Profiles may carry a numeric weight (`q`), in the style of content
/// negotiation media ranges: `text/html;q=0.8`.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    name: String,
    weight: Option<f64>,
}

impl Profile {
    /// Create an unweighted profile.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: None,
        }
    }

    /// Create a weighted profile.
    pub fn weighted(name: impl Into<String>, q: f64) -> Self {
        Self {
            name: name.into(),
            weight: Some(q),
        }
    }

    /// Parse a profile string, accepting an optional `;q=<weight>` parameter.
    ///
    /// A malformed weight is ignored and the profile is treated as unweighted.
    pub fn parse(spec: &str) -> Self {
        let mut parts = spec.split(';');
        let name = parts.next().unwrap_or_default().trim().to_string();
        let weight = parts.find_map(|param| {
            let (key, value) = param.split_once('=')?;
            if key.trim() == "q" {
                value.trim().parse::<f64>().ok()
            } else {
                None
            }
        });

        Self { name, weight }
    }

    /// Profile name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Numeric weight, if the profile carries one.
    pub fn weight(&self) -> Option<f64> {
        self.weight
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.weight {
            Some(q) => write!(f, "{};q={}", self.name, q),
            None => f.write_str(&self.name),
        }
    }
}

/// The profiles active for one execution context.
///
/// The base profile is always a member of its own set.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSet {
    base: String,
    profiles: HashMap<String, Profile>,
}

impl ProfileSet {
    /// Create a profile set holding only its base profile.
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        let mut profiles = HashMap::new();
        profiles.insert(base.clone(), Profile::new(base.clone()));
        Self { base, profiles }
    }

    /// Add a sub-profile (builder form).
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.add_profile(Profile::parse(&profile.into()));
        self
    }

    /// Add several sub-profiles (builder form).
    pub fn with_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for profile in profiles {
            self.add_profile(Profile::parse(profile.as_ref()));
        }
        self
    }

    /// Add a sub-profile. Re-adding the base profile is a no-op.
    pub fn add_profile(&mut self, profile: Profile) {
        if profile.name.is_empty() || profile.name == self.base {
            return;
        }
        self.profiles.insert(profile.name.clone(), profile);
    }

    /// The base profile name.
    pub fn base_profile(&self) -> &str {
        &self.base
    }

    /// Is the named profile a member of this set.
    pub fn is_member(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Get a member profile by name.
    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// Iterate all member profiles (base included), in no particular order.
    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    /// Number of member profiles, base included.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Always false: a profile set holds at least its base profile.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Stable key identifying this profile set's membership and weights.
    pub(crate) fn cache_key(&self) -> String {
        let mut profiles: Vec<String> = self
            .profiles
            .values()
            .filter(|p| p.name != self.base)
            .map(ToString::to_string)
            .collect();
        profiles.sort_unstable();
        format!("{}|{}", self.base, profiles.join(","))
    }
}

impl fmt::Display for ProfileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self
            .profiles
            .values()
            .filter(|p| p.name != self.base)
            .map(ToString::to_string)
            .collect();
        names.sort_unstable();
        write!(f, "{} [{}]", self.base, names.join(", "))
    }
}

/// Declared profile sets, keyed by base profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    sets: HashMap<String, ProfileSet>,
}

impl ProfileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a profile set.
    pub fn add(&mut self, profile_set: ProfileSet) {
        self.sets
            .insert(profile_set.base_profile().to_string(), profile_set);
    }

    /// Get the profile set for a base profile, with sub-profiles expanded.
    ///
    /// Sub-profiles that are themselves the base of a declared set pull in
    /// that set's members, transitively.
    pub fn get(&self, base: &str) -> Option<ProfileSet> {
        let declared = self.sets.get(base)?;
        let mut expanded = declared.clone();
        let mut visited: HashSet<&str> = HashSet::from([base]);
        let mut pending: Vec<&str> = declared
            .profiles
            .keys()
            .filter(|n| n.as_str() != base)
            .map(String::as_str)
            .collect();

        while let Some(name) = pending.pop() {
            if !visited.insert(name) {
                continue;
            }
            if let Some(nested) = self.sets.get(name) {
                for profile in nested.profiles.values() {
                    if !expanded.is_member(&profile.name) {
                        expanded.add_profile(profile.clone());
                    }
                    pending.push(profile.name.as_str());
                }
            }
        }

        Some(expanded)
    }

    /// Number of declared sets.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Whether no sets are declared.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// Profile errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProfileError {
    #[error("Empty profile targeting expression")]
    EmptyExpression,

    #[error("Empty 'target-profile' for selector '{selector}'")]
    EmptyTargetProfile { selector: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_is_member() {
        let set = ProfileSet::new("producer-A");
        assert!(set.is_member("producer-A"));
        assert_eq!(set.base_profile(), "producer-A");
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_sub_profiles() {
        let set = ProfileSet::new("ua").with_profiles(["profile1", "profile2"]);
        assert!(set.is_member("profile1"));
        assert!(set.is_member("profile2"));
        assert!(!set.is_member("profile3"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_weighted_profile_parse() {
        let profile = Profile::parse("text/html;level=1;q=0.5");
        assert_eq!(profile.name(), "text/html");
        assert_eq!(profile.weight(), Some(0.5));

        let profile = Profile::parse("text/plain;q=abc");
        assert_eq!(profile.weight(), None);
    }

    #[test]
    fn test_store_expands_nested_sets() {
        let mut store = ProfileStore::new();
        store.add(ProfileSet::new("device").with_profiles(["html", "phone"]));
        store.add(ProfileSet::new("phone").with_profiles(["small-screen"]));
        store.add(ProfileSet::new("small-screen").with_profiles(["device"]));

        let set = store.get("device").unwrap();
        assert!(set.is_member("html"));
        assert!(set.is_member("phone"));
        assert!(set.is_member("small-screen"));
        assert_eq!(set.base_profile(), "device");
        assert!(store.get("unknown").is_none());
    }

    #[test]
    fn test_display() {
        let set = ProfileSet::new("base").with_profiles(["b", "a;q=0.5"]);
        assert_eq!(set.to_string(), "base [a;q=0.5, b]");
    }

    #[test]
    fn test_cache_key_includes_weights() {
        let weighted = ProfileSet::new("browser").with_profile("text/html;q=0.3");
        let plain = ProfileSet::new("browser").with_profile("text/html");
        assert_ne!(weighted.cache_key(), plain.cache_key());
        assert_eq!(
            ProfileSet::new("b").with_profiles(["x", "y;q=2"]).cache_key(),
            ProfileSet::new("b").with_profiles(["y;q=2", "x"]).cache_key()
        );
    }
}
