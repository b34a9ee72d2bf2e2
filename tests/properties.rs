//! Property tests for selector compilation, profile scoring and ordering.

use proptest::prelude::*;
use std::sync::Arc;
use zentinel_resource_config::node::tree::TreeNode;
use zentinel_resource_config::selector::{steps_to_string, to_selector_string};
use zentinel_resource_config::{
    build_steps, sort_by_specificity, specificity, ExecutionContext, ProfileSet,
    ProfileTargetingExpression, ResourceConfig,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn arb_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,6}".prop_map(|s| format!("e-{}", s))
}

fn arb_step() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => arb_name(),
        1 => Just("*".to_string()),
        1 => Just("**".to_string()),
        1 => (arb_name(), 1usize..5).prop_map(|(n, i)| format!("{}[{}]", n, i)),
        1 => (arb_name(), "[a-z]{1,4}").prop_map(|(n, v)| format!("{}[@id = '{}']", n, v)),
    ]
}

fn arb_selector() -> impl Strategy<Value = String> {
    (any::<bool>(), prop::collection::vec(arb_step(), 1..6)).prop_map(|(rooted, steps)| {
        let path = steps.join("/");
        if rooted {
            format!("#document/{}", path)
        } else {
            path
        }
    })
}

/// A single chain of distinct element names, outermost first.
fn arb_chain() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,5}", 2..8).prop_map(|names| {
        names
            .into_iter()
            .enumerate()
            .map(|(i, n)| format!("n{}{}", n, i))
            .collect()
    })
}

fn chain_xml(chain: &[String]) -> String {
    let open: String = chain.iter().map(|n| format!("<{}>", n)).collect();
    let close: String = chain.iter().rev().map(|n| format!("</{}>", n)).collect();
    format!("{}{}", open, close)
}

fn targets_leaf(selector: &str, xml: &str) -> bool {
    let doc = roxmltree::Document::parse(xml).unwrap();
    let leaf = doc.descendants().filter(|n| n.is_element()).last().unwrap();
    let config = ResourceConfig::new(selector).unwrap();
    config.is_targeted_at_element(
        &TreeNode::new(leaf),
        &ExecutionContext::new(ProfileSet::new("p")),
    )
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Profiles outside the set never contribute to specificity.
    #[test]
    fn non_member_profile_scores_zero(
        members in prop::collection::vec("[a-z]{3,8}", 0..5),
        target in "[a-z]{3,8}",
    ) {
        let set = ProfileSet::new("x-base")
            .with_profiles(members.iter().map(|m| format!("x-{}", m)));
        let expression = ProfileTargetingExpression::parse(&format!("y-{}", target)).unwrap();
        prop_assert_eq!(expression.specificity(&set), 0.0);
        prop_assert!(!expression.is_match(&set));
    }

    /// Sorting is by non-increasing specificity and keeps registration order on ties.
    #[test]
    fn sort_is_stable_and_descending(
        selectors in prop::collection::vec(
            prop_oneof![
                Just("*"), Just("**"), Just("a"), Just("a/b"), Just("#document"), Just("a/**/b"),
            ],
            1..24,
        ),
    ) {
        let set = ProfileSet::new("p");
        let mut configs: Vec<Arc<ResourceConfig>> = selectors
            .iter()
            .enumerate()
            .map(|(i, s)| Arc::new(ResourceConfig::new(s).unwrap().with_resource(&i.to_string())))
            .collect();
        sort_by_specificity(&mut configs, &set);

        for pair in configs.windows(2) {
            let (a, b) = (specificity(&pair[0], &set), specificity(&pair[1], &set));
            prop_assert!(a >= b);
            if a == b {
                let ia: usize = pair[0].resource().unwrap().parse().unwrap();
                let ib: usize = pair[1].resource().unwrap().parse().unwrap();
                prop_assert!(ia < ib);
            }
        }
    }

    /// Printing compiled steps back to selector syntax compiles to the same steps.
    #[test]
    fn selector_string_round_trips(selector in arb_selector()) {
        let steps = build_steps(&selector).unwrap();
        let rebuilt = build_steps(&to_selector_string(&steps)).unwrap();
        prop_assert_eq!(steps_to_string(&steps), steps_to_string(&rebuilt));
    }

    /// `*` and `**` target every element, at any depth.
    #[test]
    fn wildcards_target_every_element(chain in arb_chain()) {
        let xml = chain_xml(&chain);
        prop_assert!(targets_leaf("*", &xml));
        prop_assert!(targets_leaf("**", &xml));
        prop_assert!(targets_leaf(chain.last().unwrap(), &xml));
    }

    /// A rooted selector with `**` matches only when its first step is the root element.
    #[test]
    fn star_star_is_anchored_at_document(chain in arb_chain()) {
        let xml = chain_xml(&chain);
        let root = &chain[0];
        let leaf = chain.last().unwrap();

        let rooted = format!("#document/{}/**/{}", root, leaf);
        let floating = format!("**/{}", leaf);
        let wrong_root = format!("#document/{}/**/{}", leaf, leaf);
        prop_assert!(targets_leaf(&rooted, &xml), "{} should match", rooted);
        prop_assert!(targets_leaf(&floating, &xml), "{} should match", floating);
        prop_assert!(!targets_leaf(&wrong_root, &xml), "{} should not match", wrong_root);
        if chain.len() > 2 {
            let inner = format!("#document/{}/**/{}", chain[1], leaf);
            prop_assert!(!targets_leaf(&inner, &xml), "{} should not match", inner);
        }
    }
}
