use std::{sync::Arc, time::Duration};

use filterproxy_common::error::{ProxyError, Result};

use crate::{
    cluster::{ClusterEndpoint, ClusterTarget, EndpointResolver},
    discovery::TargetDiscovery,
    fetch::UpstreamClient,
    static_target::StaticTarget,
};

/// What a configured endpoint points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointIdentity {
    Static { url: String },
    Cluster(ClusterEndpoint),
}

/// A configured endpoint ready to serve requests.
#[derive(Clone)]
pub enum Target {
    Static(Arc<StaticTarget>),
    Cluster(Arc<ClusterTarget>),
}

impl Target {
    /// Builds the target for `identity`. Cluster endpoints need a resolver.
    pub fn build(
        identity: EndpointIdentity,
        upstream: UpstreamClient,
        refresh_interval: Duration,
        resolver: Option<Arc<dyn EndpointResolver>>,
    ) -> Result<Self> {
        match identity {
            EndpointIdentity::Static { url } => Ok(Self::Static(Arc::new(StaticTarget::new(
                url,
                upstream,
                refresh_interval,
            )))),
            EndpointIdentity::Cluster(endpoint) => {
                let resolver = resolver.ok_or_else(|| {
                    ProxyError::Configuration(format!(
                        "endpoint {}/{} needs a cluster client",
                        endpoint.namespace, endpoint.name
                    ))
                })?;
                Ok(Self::Cluster(Arc::new(ClusterTarget::new(
                    endpoint,
                    resolver,
                    upstream,
                    refresh_interval,
                ))))
            }
        }
    }

    pub fn discovery(&self) -> Arc<dyn TargetDiscovery> {
        match self {
            Self::Static(target) => target.clone(),
            Self::Cluster(target) => target.clone(),
        }
    }
}
