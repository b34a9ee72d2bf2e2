//! Specificity scoring and ordering of resource configurations.
//!
//! Scores are relative to a profile set. Higher scores sort first; equal
//! scores keep registration order.

use crate::profile::ProfileSet;
use crate::resource::ResourceConfig;
use std::cmp::Ordering;
use std::sync::Arc;

/// Bonus for `xmldef:` selectors.
pub const XML_DEF_BONUS: f64 = 10.0;
/// Bonus for the universal wildcard selector.
pub const WILDCARD_BONUS: f64 = 5.0;
/// Bonus for an explicit named selector.
pub const NAMED_SELECTOR_BONUS: f64 = 100.0;
/// Bonus per contextual step beyond the first.
pub const CONTEXT_STEP_BONUS: f64 = 10.0;
/// Bonus for a configured selector namespace.
pub const NAMESPACE_BONUS: f64 = 10.0;

/// Specificity of `config` for `profile_set`.
pub fn specificity(config: &ResourceConfig, profile_set: &ProfileSet) -> f64 {
    let mut score: f64 = config
        .profile_expressions()
        .iter()
        .map(|expression| expression.specificity(profile_set))
        .sum();

    if config.is_xml_def() {
        score += XML_DEF_BONUS;
    } else if config.selector() == "*" {
        score += WILDCARD_BONUS;
    } else {
        score += NAMED_SELECTOR_BONUS;
        let contextual = config.contextual_selector().len();
        if contextual > 1 {
            score += CONTEXT_STEP_BONUS * (contextual - 1) as f64;
        }
    }

    if config.selector_namespace().is_some() {
        score += NAMESPACE_BONUS;
    }

    score
}

/// Compare two configurations, more specific first.
pub fn compare(a: &ResourceConfig, b: &ResourceConfig, profile_set: &ProfileSet) -> Ordering {
    specificity(b, profile_set).total_cmp(&specificity(a, profile_set))
}

/// Stable sort, most specific first.
pub fn sort_by_specificity(configs: &mut Vec<Arc<ResourceConfig>>, profile_set: &ProfileSet) {
    let mut scored: Vec<(f64, Arc<ResourceConfig>)> = configs
        .drain(..)
        .map(|config| (specificity(&config, profile_set), config))
        .collect();
    scored.sort_by(|(a, _), (b, _)| b.total_cmp(a));
    configs.extend(scored.into_iter().map(|(_, config)| config));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(selector: &str) -> ResourceConfig {
        ResourceConfig::new(selector).unwrap()
    }

    #[test]
    fn test_wildcard_selector() {
        let profile_set = ProfileSet::new("p");
        // universal profile (5) + wildcard selector (5)
        assert_eq!(specificity(&config("*"), &profile_set), 10.0);
        assert!(specificity(&config("a"), &profile_set) >= 100.0);
        // `**` scores as an explicit selector
        assert_eq!(specificity(&config("**"), &profile_set), 105.0);
    }

    #[test]
    fn test_named_and_contextual() {
        let profile_set = ProfileSet::new("p");
        assert_eq!(specificity(&config("a"), &profile_set), 105.0);
        assert_eq!(specificity(&config("a/b/c"), &profile_set), 125.0);
        assert_eq!(specificity(&config("a/@x"), &profile_set), 115.0);
        assert_eq!(specificity(&config("xmldef:thing"), &profile_set), 15.0);
    }

    #[test]
    fn test_profile_scores() {
        let profile_set = ProfileSet::new("producer-A").with_profiles(["producers"]);
        let base = config("a").with_target_profile("producer-A").unwrap();
        let member = config("a").with_target_profile("producers").unwrap();
        let both = config("a").with_target_profile("producer-A,producers").unwrap();
        let unmatched = config("a").with_target_profile("consumers").unwrap();

        assert_eq!(specificity(&base, &profile_set), 200.0);
        assert_eq!(specificity(&member, &profile_set), 110.0);
        assert_eq!(specificity(&both, &profile_set), 210.0);
        assert_eq!(specificity(&unmatched, &profile_set), 100.0);
    }

    #[test]
    fn test_namespace_sorts_first() {
        let profile_set = ProfileSet::new("p");
        let plain = Arc::new(config("item"));
        let namespaced = Arc::new(config("item").with_selector_namespace("http://a"));

        assert_eq!(compare(&namespaced, &plain, &profile_set), Ordering::Less);

        let mut configs = vec![Arc::clone(&plain), Arc::clone(&namespaced)];
        sort_by_specificity(&mut configs, &profile_set);
        assert!(Arc::ptr_eq(&configs[0], &namespaced));
    }

    #[test]
    fn test_sort_is_stable() {
        let profile_set = ProfileSet::new("p");
        let first = Arc::new(config("a").with_resource("first"));
        let star = Arc::new(config("*"));
        let second = Arc::new(config("b").with_resource("second"));
        let deep = Arc::new(config("x/y"));

        let mut configs = vec![
            Arc::clone(&first),
            Arc::clone(&star),
            Arc::clone(&second),
            Arc::clone(&deep),
        ];
        sort_by_specificity(&mut configs, &profile_set);

        assert!(Arc::ptr_eq(&configs[0], &deep));
        assert!(Arc::ptr_eq(&configs[1], &first));
        assert!(Arc::ptr_eq(&configs[2], &second));
        assert!(Arc::ptr_eq(&configs[3], &star));
    }
}
