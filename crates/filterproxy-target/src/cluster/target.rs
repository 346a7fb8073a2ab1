use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use filterproxy_common::{
    error::{ProxyError, Result},
    time::{Clock, SystemClock},
    types::DiscoveryEntry,
};
use filterproxy_exposition::Snapshot;
use futures::future::try_join_all;
use tracing::debug;

use super::resolver::{EndpointResolver, addresses_for_port};
use crate::{cache::SingleFlight, discovery::TargetDiscovery, fetch::UpstreamClient};

/// Where the exporters behind a cluster Endpoints object listen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEndpoint {
    pub name: String,
    pub namespace: String,
    pub port: u16,
    pub scheme: String,
    pub path: String,
}

impl ClusterEndpoint {
    pub fn url_for(&self, address: &str) -> String {
        if address.contains(':') {
            format!("{}://[{address}]:{}{}", self.scheme, self.port, self.path)
        } else {
            format!("{}://{address}:{}{}", self.scheme, self.port, self.path)
        }
    }
}

/// Every address of a cluster endpoint, scraped together in rounds.
///
/// A round resolves the current addresses, scrapes all of them concurrently
/// and keeps one snapshot per address. Rounds go through a single-flight cell,
/// so concurrent requests share one round and a failed round is retried by
/// the next request.
pub struct ClusterTarget {
    endpoint: ClusterEndpoint,
    resolver: Arc<dyn EndpointResolver>,
    upstream: UpstreamClient,
    round: SingleFlight<Arc<Vec<String>>>,
    snapshots: RwLock<HashMap<String, Snapshot>>,
    clock: Arc<dyn Clock>,
}

impl ClusterTarget {
    pub fn new(
        endpoint: ClusterEndpoint,
        resolver: Arc<dyn EndpointResolver>,
        upstream: UpstreamClient,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            endpoint,
            resolver,
            upstream,
            round: SingleFlight::new(refresh_interval),
            snapshots: RwLock::new(HashMap::new()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current addresses of the endpoint exposing the configured port.
    pub async fn resolve(&self) -> Result<Vec<String>> {
        let lookup = self
            .resolver
            .lookup(&self.endpoint.namespace, &self.endpoint.name);
        let subsets = tokio::time::timeout(self.upstream.timeout(), lookup)
            .await
            .map_err(|_| ProxyError::Resolution {
                namespace: self.endpoint.namespace.clone(),
                name: self.endpoint.name.clone(),
                message: "lookup timed out".to_string(),
            })??;
        Ok(addresses_for_port(&subsets, self.endpoint.port))
    }

    /// Runs a scrape round unless the last one is still fresh and returns the
    /// addresses it covered.
    pub async fn fetch_all(&self) -> Result<Arc<Vec<String>>> {
        self.round
            .get_or_refresh(self.clock.as_ref(), || self.refresh_round())
            .await
    }

    /// Snapshot of one address after making sure the round is current.
    ///
    /// `None` means the address was not part of the last successful round.
    pub async fn fetch_metrics_for(&self, address: &str) -> Result<Option<Snapshot>> {
        self.fetch_all().await?;
        let snapshots = self.snapshots.read().map_err(|_| {
            ProxyError::Internal("failed to acquire cluster snapshot lock".to_string())
        })?;
        Ok(snapshots.get(address).cloned())
    }

    async fn refresh_round(&self) -> Result<Arc<Vec<String>>> {
        let addresses = self.resolve().await?;
        debug!(
            namespace = %self.endpoint.namespace,
            name = %self.endpoint.name,
            addresses = addresses.len(),
            "starting scrape round"
        );

        try_join_all(addresses.iter().map(|address| self.scrape(address))).await?;

        let current = addresses.iter().collect::<HashSet<_>>();
        let mut snapshots = self.snapshots.write().map_err(|_| {
            ProxyError::Internal("failed to acquire cluster snapshot lock".to_string())
        })?;
        snapshots.retain(|address, _| current.contains(address));
        debug!(
            namespace = %self.endpoint.namespace,
            name = %self.endpoint.name,
            targets = snapshots.len(),
            "refreshed cluster endpoint"
        );

        Ok(Arc::new(addresses))
    }

    async fn scrape(&self, address: &str) -> Result<()> {
        let families = self
            .upstream
            .fetch_metrics(&self.endpoint.url_for(address))
            .await?;
        let mut snapshots = self.snapshots.write().map_err(|_| {
            ProxyError::Internal("failed to acquire cluster snapshot lock".to_string())
        })?;
        snapshots.insert(address.to_string(), Arc::new(families));
        Ok(())
    }
}

#[async_trait]
impl TargetDiscovery for ClusterTarget {
    async fn discovery_entries(
        &self,
        base_target: &str,
        base_path: &str,
    ) -> Result<Vec<DiscoveryEntry>> {
        let base_path = base_path.trim_end_matches('/');
        Ok(self
            .resolve()
            .await?
            .into_iter()
            .map(|address| DiscoveryEntry::for_path(base_target, format!("{base_path}/{address}")))
            .collect())
    }
}
