use async_trait::async_trait;
use filterproxy_common::error::Result;

/// Addresses of an Endpoints subset together with the ports they expose.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSubset {
    pub addresses: Vec<String>,
    pub ports: Vec<u16>,
}

/// Looks up the subsets of a named Endpoints object.
///
/// A missing object is reported as [`ProxyError::ResourceNotFound`].
///
/// [`ProxyError::ResourceNotFound`]: filterproxy_common::error::ProxyError::ResourceNotFound
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    async fn lookup(&self, namespace: &str, name: &str) -> Result<Vec<EndpointSubset>>;
}

/// Collects the addresses of every subset exposing `port`.
///
/// Subset order and address order are kept; repeated addresses appear once.
pub fn addresses_for_port(subsets: &[EndpointSubset], port: u16) -> Vec<String> {
    let mut addresses: Vec<String> = Vec::new();
    for subset in subsets.iter().filter(|subset| subset.ports.contains(&port)) {
        for address in &subset.addresses {
            if !addresses.contains(address) {
                addresses.push(address.clone());
            }
        }
    }
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subset(addresses: &[&str], ports: &[u16]) -> EndpointSubset {
        EndpointSubset {
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
            ports: ports.to_vec(),
        }
    }

    #[test]
    fn single_subset_with_port() {
        let subsets = vec![subset(&["127.0.9.1", "127.0.9.2"], &[8080])];
        assert_eq!(
            addresses_for_port(&subsets, 8080),
            vec!["127.0.9.1", "127.0.9.2"]
        );
    }

    #[test]
    fn no_subset_exposes_port() {
        let subsets = vec![
            subset(&["127.0.9.1", "127.0.9.2"], &[8081]),
            subset(&["127.0.9.3"], &[9090, 9091]),
        ];
        assert!(addresses_for_port(&subsets, 8080).is_empty());
    }

    #[test]
    fn only_matching_subsets_contribute() {
        let subsets = vec![
            subset(&["127.0.9.1", "127.0.9.2"], &[8080, 9090]),
            subset(&["127.0.9.3", "127.0.9.4"], &[9090]),
            subset(&["127.0.9.5"], &[8080]),
        ];
        assert_eq!(
            addresses_for_port(&subsets, 8080),
            vec!["127.0.9.1", "127.0.9.2", "127.0.9.5"]
        );
    }

    #[test]
    fn repeated_addresses_appear_once() {
        let subsets = vec![
            subset(&["127.0.9.1", "127.0.9.2"], &[8080]),
            subset(&["127.0.9.2", "127.0.9.3"], &[8080]),
        ];
        assert_eq!(
            addresses_for_port(&subsets, 8080),
            vec!["127.0.9.1", "127.0.9.2", "127.0.9.3"]
        );
    }

    #[test]
    fn empty_lookup_yields_no_addresses() {
        assert!(addresses_for_port(&[], 8080).is_empty());
    }
}
