use async_trait::async_trait;
use filterproxy_common::error::{ProxyError, Result};
use k8s_openapi::api::core::v1::{EndpointSubset as ApiEndpointSubset, Endpoints};
use kube::{Api, Client};
use tracing::debug;

use super::resolver::{EndpointResolver, EndpointSubset};

/// Resolves Endpoints objects through the cluster API server.
#[derive(Clone)]
pub struct KubeEndpointsResolver {
    client: Client,
}

impl KubeEndpointsResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects with the in-cluster config, falling back to the local kubeconfig.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await.map_err(|err| {
            ProxyError::Configuration(format!("failed to create cluster client: {err}"))
        })?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl EndpointResolver for KubeEndpointsResolver {
    async fn lookup(&self, namespace: &str, name: &str) -> Result<Vec<EndpointSubset>> {
        debug!(namespace, name, "looking up endpoints");
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        let endpoints = api.get(name).await.map_err(|err| match err {
            kube::Error::Api(response) if response.code == 404 => ProxyError::ResourceNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            other => ProxyError::Resolution {
                namespace: namespace.to_string(),
                name: name.to_string(),
                message: other.to_string(),
            },
        })?;

        Ok(endpoints
            .subsets
            .unwrap_or_default()
            .into_iter()
            .map(subset_from_api)
            .collect())
    }
}

fn subset_from_api(subset: ApiEndpointSubset) -> EndpointSubset {
    EndpointSubset {
        addresses: subset
            .addresses
            .unwrap_or_default()
            .into_iter()
            .map(|address| address.ip)
            .collect(),
        ports: subset
            .ports
            .unwrap_or_default()
            .into_iter()
            .filter_map(|port| u16::try_from(port.port).ok())
            .collect(),
    }
}
