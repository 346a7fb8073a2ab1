use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Exact-match label constraints. Empty means no filtering.
pub type LabelFilter = BTreeMap<String, String>;

/// Label Prometheus uses to pick the scrape path of a discovered target.
pub const METRICS_PATH_LABEL: &str = "__metrics_path__";
/// Copy of the scrape path that survives relabeling as a regular label.
pub const METRICS_PATH_INFO_LABEL: &str = "metrics_path";

/// One target group of the HTTP service discovery document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryEntry {
    pub targets: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

impl DiscoveryEntry {
    pub fn for_path(target: impl Into<String>, metrics_path: impl Into<String>) -> Self {
        let metrics_path = metrics_path.into();
        let mut labels = BTreeMap::new();
        labels.insert(METRICS_PATH_LABEL.to_string(), metrics_path.clone());
        labels.insert(METRICS_PATH_INFO_LABEL.to_string(), metrics_path);
        Self {
            targets: vec![target.into()],
            labels,
        }
    }

    pub fn metrics_path(&self) -> Option<&str> {
        self.labels.get(METRICS_PATH_LABEL).map(String::as_str)
    }
}
