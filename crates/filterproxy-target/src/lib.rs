//! Upstream targets of the filter proxy.
//!
//! # Components
//!
//! - **`cache`**: single-flight refresh cell guarding one cached value
//! - **`fetch`**: HTTP client scraping one upstream exporter
//! - **`auth`**: credential resolution for upstream requests
//! - **`static_target`**: a fixed upstream URL
//! - **`cluster`**: endpoints resolved through the cluster API, scraped concurrently
//! - **`discovery`**: HTTP service discovery entries and their aggregation

pub mod auth;
pub mod cache;
pub mod cluster;
pub mod discovery;
pub mod fetch;
pub mod static_target;
pub mod target;

pub use auth::{AuthConfig, AuthMode, Credential, SERVICE_ACCOUNT_TOKEN_PATH, resolve_credential};
pub use cache::SingleFlight;
pub use cluster::{
    ClusterEndpoint, ClusterTarget, EndpointResolver, EndpointSubset, KubeEndpointsResolver,
};
pub use discovery::{DiscoveryAggregator, TargetDiscovery};
pub use fetch::{UpstreamClient, UpstreamOptions};
pub use static_target::StaticTarget;
pub use target::{EndpointIdentity, Target};
