use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use filterproxy_common::{error::Result, types::DiscoveryEntry};
use futures::future::join_all;
use tracing::warn;

/// Something that can describe its scrape targets as discovery entries.
///
/// `base_target` is the host Prometheus should scrape (the proxy itself) and
/// `base_path` the path the implementor is mounted at.
#[async_trait]
pub trait TargetDiscovery: Send + Sync {
    async fn discovery_entries(&self, base_target: &str, base_path: &str)
    -> Result<Vec<DiscoveryEntry>>;
}

/// Collects discovery entries from every registered mount point.
#[derive(Default, Clone)]
pub struct DiscoveryAggregator {
    members: BTreeMap<String, Arc<dyn TargetDiscovery>>,
}

impl DiscoveryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `member` under `path`, replacing any earlier member there.
    pub fn register(&mut self, path: impl Into<String>, member: Arc<dyn TargetDiscovery>) {
        self.members.insert(path.into(), member);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Queries every member concurrently and concatenates their entries.
    ///
    /// Each member sees `base_path` joined with its own mount path. Members
    /// that fail are logged and left out; the rest still answer.
    pub async fn discover(&self, base_target: &str, base_path: &str) -> Vec<DiscoveryEntry> {
        let lookups = self.members.iter().map(|(path, member)| async move {
            let member_path = format!("{base_path}{path}");
            let result = member.discovery_entries(base_target, &member_path).await;
            (member_path, result)
        });

        let mut entries = Vec::new();
        for (path, result) in join_all(lookups).await {
            match result {
                Ok(found) => entries.extend(found),
                Err(err) => warn!(path = %path, error = %err, "skipping discovery member"),
            }
        }
        entries
    }
}

#[async_trait]
impl TargetDiscovery for DiscoveryAggregator {
    async fn discovery_entries(
        &self,
        base_target: &str,
        base_path: &str,
    ) -> Result<Vec<DiscoveryEntry>> {
        Ok(self.discover(base_target, base_path).await)
    }
}
