//! Combine every bucket source into the authoritative set of a run.

use std::collections::{HashMap, HashSet};
use url::Url;

/// Everything the sources produced for one run.
#[derive(Debug, Clone, Default)]
pub struct SourceSets {
    pub official: HashSet<Url>,
    /// GitHub search results, identity to star count.
    pub github: HashMap<Url, i64>,
    pub manual_config: HashSet<Url>,
    pub manual_list: HashSet<Url>,
    pub ignored_config: HashSet<Url>,
    pub ignored_list: HashSet<Url>,
}

/// `(official ∪ github ∪ manual_config ∪ manual_list) − (ignored_config ∪ ignored_list)`
pub fn reconcile(sources: &SourceSets) -> HashSet<Url> {
    sources
        .official
        .iter()
        .chain(sources.github.keys())
        .chain(&sources.manual_config)
        .chain(&sources.manual_list)
        .filter(|uri| !sources.ignored_config.contains(*uri) && !sources.ignored_list.contains(*uri))
        .cloned()
        .collect()
}
