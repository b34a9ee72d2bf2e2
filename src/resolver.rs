//! Per-profile-set resolution of configurations for a node.

use crate::context::ExecutionContext;
use crate::node::Node;
use crate::profile::ProfileSet;
use crate::resource::{Parameters, ResourceConfig};
use crate::specificity::sort_by_specificity;
use crate::selector::StepKind;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Profile-filtered configurations, sorted once and indexed by target name.
#[derive(Debug)]
pub struct ResourceResolver {
    profile_set: ProfileSet,
    sorted: Vec<Arc<ResourceConfig>>,
    by_name: HashMap<String, Vec<usize>>,
    wildcard: Vec<usize>,
    document: Vec<usize>,
    global_params: Arc<Parameters>,
}

impl ResourceResolver {
    pub fn new(
        profile_set: ProfileSet,
        mut configs: Vec<Arc<ResourceConfig>>,
        global_params: Arc<Parameters>,
    ) -> Self {
        sort_by_specificity(&mut configs, &profile_set);

        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        let mut wildcard = Vec::new();
        let mut document = Vec::new();

        for (rank, config) in configs.iter().enumerate() {
            if config.is_global_parameters() || config.is_xml_def() {
                continue;
            }
            if config.is_document_targeted() {
                document.push(rank);
                continue;
            }
            match config.target_step().kind() {
                StepKind::Star | StepKind::StarStar => wildcard.push(rank),
                StepKind::Named => by_name
                    .entry(config.target_element().to_ascii_lowercase())
                    .or_default()
                    .push(rank),
            }
        }

        Self {
            profile_set,
            sorted: configs,
            by_name,
            wildcard,
            document,
            global_params,
        }
    }

    pub fn profile_set(&self) -> &ProfileSet {
        &self.profile_set
    }

    /// All configurations in specificity order.
    pub fn configurations(&self) -> &[Arc<ResourceConfig>] {
        &self.sorted
    }

    pub fn global_params(&self) -> &Arc<Parameters> {
        &self.global_params
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Configurations targeted at `node`, most specific first.
    ///
    /// Default resources are only returned when nothing else matched.
    pub fn resolve<N: Node>(&self, node: &N, ctx: &ExecutionContext) -> Vec<Arc<ResourceConfig>> {
        let named = self
            .by_name
            .get(&node.local_name().to_ascii_lowercase())
            .map_or(&[][..], Vec::as_slice);

        let matched = merge_ranks(named, &self.wildcard)
            .filter(|&rank| self.sorted[rank].is_targeted_at_element(node, ctx))
            .map(|rank| Arc::clone(&self.sorted[rank]))
            .collect();

        let matched = drop_defaults(matched);
        trace!(
            element = node.local_name(),
            matched = matched.len(),
            "Resolved configurations"
        );
        matched
    }

    /// Configurations targeted at the document fragment.
    pub fn resolve_document(&self, ctx: &ExecutionContext) -> Vec<Arc<ResourceConfig>> {
        let matched = self
            .document
            .iter()
            .map(|&rank| &self.sorted[rank])
            .filter(|config| config.is_targeted_at_document(ctx))
            .cloned()
            .collect();
        drop_defaults(matched)
    }
}

/// Merge two ascending rank lists.
fn merge_ranks<'a>(a: &'a [usize], b: &'a [usize]) -> impl Iterator<Item = usize> + 'a {
    let mut a = a.iter().copied().peekable();
    let mut b = b.iter().copied().peekable();
    std::iter::from_fn(move || match (a.peek(), b.peek()) {
        (Some(&x), Some(&y)) if x <= y => a.next(),
        (Some(_), Some(_)) => b.next(),
        (Some(_), None) => a.next(),
        (None, _) => b.next(),
    })
}

fn drop_defaults(matched: Vec<Arc<ResourceConfig>>) -> Vec<Arc<ResourceConfig>> {
    if matched.iter().any(|config| !config.is_default_resource()) {
        matched
            .into_iter()
            .filter(|config| !config.is_default_resource())
            .collect()
    } else {
        matched
    }
}
