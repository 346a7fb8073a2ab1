//! Cluster endpoints: address resolution through the cluster API and
//! concurrent scraping of every resolved address.

mod kubernetes;
mod resolver;
mod target;

pub use kubernetes::KubeEndpointsResolver;
pub use resolver::{EndpointResolver, EndpointSubset, addresses_for_port};
pub use target::{ClusterEndpoint, ClusterTarget};
