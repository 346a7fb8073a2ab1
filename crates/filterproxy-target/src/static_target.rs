use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use filterproxy_common::{
    error::Result,
    time::{Clock, SystemClock},
    types::DiscoveryEntry,
};
use filterproxy_exposition::Snapshot;
use tracing::debug;

use crate::{cache::SingleFlight, discovery::TargetDiscovery, fetch::UpstreamClient};

/// A single upstream exporter at a fixed URL.
pub struct StaticTarget {
    url: String,
    upstream: UpstreamClient,
    cache: SingleFlight<Snapshot>,
    clock: Arc<dyn Clock>,
}

impl StaticTarget {
    pub fn new(url: impl Into<String>, upstream: UpstreamClient, refresh_interval: Duration) -> Self {
        Self {
            url: url.into(),
            upstream,
            cache: SingleFlight::new(refresh_interval),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the cached snapshot, scraping the upstream when it has expired.
    pub async fn fetch_metrics(&self) -> Result<Snapshot> {
        self.cache
            .get_or_refresh(self.clock.as_ref(), || async {
                let families = self.upstream.fetch_metrics(&self.url).await?;
                debug!(url = %self.url, families = families.len(), "refreshed static target");
                Ok(Arc::new(families))
            })
            .await
    }
}

#[async_trait]
impl TargetDiscovery for StaticTarget {
    async fn discovery_entries(
        &self,
        base_target: &str,
        base_path: &str,
    ) -> Result<Vec<DiscoveryEntry>> {
        Ok(vec![DiscoveryEntry::for_path(base_target, base_path)])
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use filterproxy_common::{error::ProxyError, time::ManualClock};

    use super::*;
    use crate::{
        fetch::UpstreamOptions,
        testing::{SIMPLE, spawn_exporter},
    };

    fn upstream() -> UpstreamClient {
        UpstreamClient::new(UpstreamOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn serves_cached_snapshot_within_interval() {
        let exporter = spawn_exporter("127.0.0.1:0", StatusCode::OK, SIMPLE).await;
        let clock = ManualClock::default();
        let target = StaticTarget::new(exporter.url(), upstream(), Duration::from_secs(5))
            .with_clock(Arc::new(clock.clone()));

        let first = target.fetch_metrics().await.unwrap();
        clock.advance(Duration::from_secs(1));
        let second = target.fetch_metrics().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(exporter.calls(), 1);

        clock.advance(Duration::from_secs(5));
        target.fetch_metrics().await.unwrap();
        assert_eq!(exporter.calls(), 2);
    }

    #[tokio::test]
    async fn zero_interval_scrapes_every_time() {
        let exporter = spawn_exporter("127.0.0.1:0", StatusCode::OK, SIMPLE).await;
        let target = StaticTarget::new(exporter.url(), upstream(), Duration::ZERO);

        for _ in 0..3 {
            target.fetch_metrics().await.unwrap();
        }
        assert_eq!(exporter.calls(), 3);
    }

    #[tokio::test]
    async fn upstream_failure_is_returned_and_retried() {
        let exporter = spawn_exporter("127.0.0.1:0", StatusCode::INTERNAL_SERVER_ERROR, "boom").await;
        let target = StaticTarget::new(exporter.url(), upstream(), Duration::from_secs(60));

        let err = target.fetch_metrics().await.unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamStatus { status: 500, .. }));

        target.fetch_metrics().await.unwrap_err();
        assert_eq!(exporter.calls(), 2);
    }

    #[tokio::test]
    async fn describes_itself_with_one_entry() {
        let target = StaticTarget::new("http://127.0.0.1:1/metrics", upstream(), Duration::ZERO);

        let entries = target
            .discovery_entries("proxy.example.com", "/buzz")
            .await
            .unwrap();

        assert_eq!(
            entries,
            vec![DiscoveryEntry::for_path("proxy.example.com", "/buzz")]
        );
    }
}
