use std::{collections::BTreeMap, path::Path, time::Duration};

use filterproxy_common::error::{ProxyError, Result};
use filterproxy_target::{AuthConfig, ClusterEndpoint, EndpointIdentity};
use serde::Deserialize;

const DEFAULT_ADDR: &str = ":80";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    pub path: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default, alias = "kubernetesendpoint")]
    pub kubernetes_endpoint: Option<KubernetesEndpointConfig>,
    #[serde(default, with = "humantime_serde", alias = "refreshinterval")]
    pub refresh_interval: Duration,
    #[serde(default, alias = "insecureskipverify")]
    pub insecure_skip_verify: bool,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KubernetesEndpointConfig {
    pub name: String,
    pub namespace: String,
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

fn default_addr() -> String {
    DEFAULT_ADDR.to_string()
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_scheme() -> String {
    "http".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            ProxyError::Configuration(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)
            .map_err(|err| ProxyError::Configuration(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Socket address to bind. A bare `:port` listens on every interface.
    pub fn listen_addr(&self) -> String {
        if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        }
    }

    pub fn needs_cluster_client(&self) -> bool {
        self.endpoints
            .values()
            .any(|endpoint| endpoint.kubernetes_endpoint.is_some())
    }

    fn validate(&self) -> Result<()> {
        let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
        for (name, endpoint) in &self.endpoints {
            endpoint
                .validate()
                .map_err(|message| ProxyError::Configuration(format!("endpoint {name}: {message}")))?;
            if let Some(other) = seen.insert(&endpoint.path, name) {
                return Err(ProxyError::Configuration(format!(
                    "endpoints {other} and {name} share path {}",
                    endpoint.path
                )));
            }
        }

        let cluster_paths = self
            .endpoints
            .iter()
            .filter(|(_, endpoint)| endpoint.kubernetes_endpoint.is_some())
            .map(|(name, endpoint)| (name, format!("{}/", endpoint.path)));
        for (cluster, prefix) in cluster_paths {
            if let Some((name, _)) = self
                .endpoints
                .iter()
                .find(|(_, endpoint)| endpoint.path.starts_with(&prefix))
            {
                return Err(ProxyError::Configuration(format!(
                    "endpoint {name} is mounted below cluster endpoint {cluster}"
                )));
            }
        }
        Ok(())
    }
}

impl EndpointConfig {
    pub fn identity(&self) -> Result<EndpointIdentity> {
        match (&self.target, &self.kubernetes_endpoint) {
            (Some(url), None) => Ok(EndpointIdentity::Static { url: url.clone() }),
            (None, Some(cluster)) => Ok(EndpointIdentity::Cluster(ClusterEndpoint {
                name: cluster.name.clone(),
                namespace: cluster.namespace.clone(),
                port: cluster.port,
                scheme: cluster.scheme.clone(),
                path: cluster.path.clone(),
            })),
            _ => Err(ProxyError::Configuration(
                "exactly one of target and kubernetesEndpoint is required".to_string(),
            )),
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if !self.path.starts_with('/') {
            return Err(format!("path {:?} must start with /", self.path));
        }
        if self.path == "/" || self.path.ends_with('/') {
            return Err(format!("path {:?} must not end with /", self.path));
        }
        if self.path.contains(['{', '}', '*', '?', '#']) {
            return Err(format!("path {:?} contains reserved characters", self.path));
        }

        match (&self.target, &self.kubernetes_endpoint) {
            (Some(target), None) => validate_target(target),
            (None, Some(cluster)) => cluster.validate(),
            (Some(_), Some(_)) => Err("target and kubernetesEndpoint are exclusive".to_string()),
            (None, None) => Err("one of target and kubernetesEndpoint is required".to_string()),
        }
    }
}

impl KubernetesEndpointConfig {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() || self.namespace.is_empty() {
            return Err("kubernetesEndpoint needs a name and a namespace".to_string());
        }
        if self.port == 0 {
            return Err("kubernetesEndpoint port must not be 0".to_string());
        }
        if !matches!(self.scheme.as_str(), "http" | "https") {
            return Err(format!("unsupported scheme {:?}", self.scheme));
        }
        if !self.path.starts_with('/') {
            return Err(format!("metrics path {:?} must start with /", self.path));
        }
        Ok(())
    }
}

fn validate_target(target: &str) -> std::result::Result<(), String> {
    let url = url::Url::parse(target).map_err(|err| format!("invalid target {target:?}: {err}"))?;
    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(format!("target {target:?} must be an absolute http(s) URL"));
    }
    Ok(())
}
