use std::sync::Arc;

use axum::{Router, routing::get};
use filterproxy_target::{DiscoveryAggregator, Target, TargetDiscovery};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;

/// A target together with the path it is served at.
pub struct Mount {
    pub path: String,
    pub target: Target,
}

impl Mount {
    pub fn new(path: impl Into<String>, target: Target) -> Self {
        Self {
            path: path.into(),
            target,
        }
    }
}

/// Builds the proxy's router.
///
/// Mount paths must be unique and must not be `/`.
pub fn proxy_router(mounts: Vec<Mount>) -> Router {
    let mut router = Router::new();
    let mut aggregator = DiscoveryAggregator::new();

    for Mount { path, target } in mounts {
        info!(path = %path, "mounting endpoint");
        aggregator.register(path.clone(), target.discovery());

        router = match target {
            Target::Static(target) => router.route(
                &path,
                get(handlers::metrics::static_metrics).with_state(target),
            ),
            Target::Cluster(target) => {
                let discovery: Arc<dyn TargetDiscovery> = target.clone();
                router
                    .route(
                        &path,
                        get(handlers::discovery::discovery).with_state(Arc::clone(&discovery)),
                    )
                    .route(
                        &format!("{path}/"),
                        get(handlers::discovery::discovery).with_state(discovery),
                    )
                    .route(
                        &format!("{path}/{{*address}}"),
                        get(handlers::metrics::cluster_metrics).with_state(target),
                    )
            }
        };
    }

    let aggregator: Arc<dyn TargetDiscovery> = Arc::new(aggregator);
    router
        .route(
            "/",
            get(handlers::discovery::discovery).with_state(aggregator),
        )
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        response::IntoResponse,
    };
    use filterproxy_common::error::{ProxyError, Result};
    use filterproxy_target::{
        ClusterEndpoint, EndpointIdentity, EndpointResolver, EndpointSubset, UpstreamClient,
        UpstreamOptions,
    };
    use tower::ServiceExt;

    use super::*;

    const SAMPLE: &str = "\
# HELP test_metric_one First sample metric
# TYPE test_metric_one gauge
test_metric_one{foo=\"bar\"} 0.1
test_metric_one{foo=\"buzz\"} 0.2
test_metric_one{foo=\"bar\",other=\"label\"} 0.3
";

    struct Exporter {
        addr: SocketAddr,
        calls: Arc<AtomicUsize>,
    }

    async fn spawn_exporter(listen: &str, status: StatusCode, body: &'static str) -> Exporter {
        let listener = tokio::net::TcpListener::bind(listen).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let app = Router::new().fallback(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response()
            }
        });
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Exporter { addr, calls }
    }

    struct OneAddress(u16);

    #[async_trait]
    impl EndpointResolver for OneAddress {
        async fn lookup(&self, _: &str, _: &str) -> Result<Vec<EndpointSubset>> {
            Ok(vec![EndpointSubset {
                addresses: vec!["127.0.8.1".to_string()],
                ports: vec![self.0],
            }])
        }
    }

    struct Missing;

    #[async_trait]
    impl EndpointResolver for Missing {
        async fn lookup(&self, namespace: &str, name: &str) -> Result<Vec<EndpointSubset>> {
            Err(ProxyError::ResourceNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
        }
    }

    fn upstream() -> UpstreamClient {
        UpstreamClient::new(UpstreamOptions::default()).unwrap()
    }

    fn static_mount(path: &str, exporter: &Exporter) -> Mount {
        let target = Target::build(
            EndpointIdentity::Static {
                url: format!("http://{}/metrics", exporter.addr),
            },
            upstream(),
            Duration::ZERO,
            None,
        )
        .unwrap();
        Mount::new(path, target)
    }

    fn cluster_mount(path: &str, port: u16, resolver: Arc<dyn EndpointResolver>) -> Mount {
        let target = Target::build(
            EndpointIdentity::Cluster(ClusterEndpoint {
                name: "exporter".to_string(),
                namespace: "monitoring".to_string(),
                port,
                scheme: "http".to_string(),
                path: "/metrics".to_string(),
            }),
            upstream(),
            Duration::ZERO,
            Some(resolver),
        )
        .unwrap();
        Mount::new(path, target)
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header(header::HOST, "proxy.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn serves_filtered_metrics() {
        let exporter = spawn_exporter("127.0.0.1:0", StatusCode::OK, SAMPLE).await;
        let router = proxy_router(vec![static_mount("/node", &exporter)]);

        let (status, body) = get(router, "/node?foo=buzz").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            "# HELP test_metric_one First sample metric\n\
             # TYPE test_metric_one gauge\n\
             test_metric_one{foo=\"buzz\"} 0.2\n"
        );
    }

    #[tokio::test]
    async fn unfiltered_request_passes_everything_through() {
        let exporter = spawn_exporter("127.0.0.1:0", StatusCode::OK, SAMPLE).await;
        let router = proxy_router(vec![static_mount("/node", &exporter)]);

        let (status, body) = get(router, "/node").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.lines().filter(|line| !line.starts_with('#')).count(), 3);
    }

    #[tokio::test]
    async fn repeated_label_is_rejected_before_fetching() {
        let exporter = spawn_exporter("127.0.0.1:0", StatusCode::OK, SAMPLE).await;
        let router = proxy_router(vec![static_mount("/node", &exporter)]);

        let (status, _) = get(router, "/node?foo=bar&foo=buzz").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(exporter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn upstream_failure_is_a_bad_gateway() {
        let exporter =
            spawn_exporter("127.0.0.1:0", StatusCode::INTERNAL_SERVER_ERROR, "boom").await;
        let router = proxy_router(vec![static_mount("/node", &exporter)]);

        let (status, body) = get(router, "/node").await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("boom"));
    }

    #[tokio::test]
    async fn serves_upstreams_without_type_lines() {
        let exporter = spawn_exporter(
            "127.0.0.1:0",
            StatusCode::OK,
            "plain_metric{foo=\"bar\"} 1\nplain_metric{foo=\"baz\"} 2\n",
        )
        .await;
        let router = proxy_router(vec![static_mount("/node", &exporter)]);

        let (status, body) = get(router, "/node?foo=bar").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            "# TYPE plain_metric untyped\nplain_metric{foo=\"bar\"} 1\n"
        );
    }

    #[tokio::test]
    async fn unresolvable_cluster_address_is_a_bad_gateway() {
        let router = proxy_router(vec![cluster_mount("/cluster", 9100, Arc::new(Missing))]);

        let (status, body) = get(router, "/cluster/10.0.0.1").await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("monitoring/exporter"));
    }

    #[tokio::test]
    async fn serves_cluster_addresses_and_rejects_unknown_ones() {
        let exporter = spawn_exporter("127.0.8.1:0", StatusCode::OK, SAMPLE).await;
        let port = exporter.addr.port();
        let router = proxy_router(vec![cluster_mount(
            "/cluster",
            port,
            Arc::new(OneAddress(port)),
        )]);

        let (status, body) = get(router.clone(), "/cluster/127.0.8.1?other=label").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("test_metric_one{foo=\"bar\",other=\"label\"} 0.3"));
        assert!(!body.contains("0.1"));

        let (status, _) = get(router, "/cluster/127.0.8.2").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cluster_mount_serves_discovery() {
        let router = proxy_router(vec![cluster_mount("/cluster", 9100, Arc::new(OneAddress(9100)))]);

        for uri in ["/cluster", "/cluster/"] {
            let (status, body) = get(router.clone(), uri).await;
            assert_eq!(status, StatusCode::OK);
            let document: serde_json::Value = serde_json::from_str(&body).unwrap();
            assert_eq!(
                document,
                serde_json::json!([{
                    "targets": ["proxy.example.com"],
                    "labels": {
                        "__metrics_path__": "/cluster/127.0.8.1",
                        "metrics_path": "/cluster/127.0.8.1",
                    },
                }])
            );
        }
    }

    #[tokio::test]
    async fn unresolvable_cluster_discovery_is_a_server_error() {
        let router = proxy_router(vec![cluster_mount("/cluster", 9100, Arc::new(Missing))]);

        let (status, _) = get(router, "/cluster").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn root_lists_every_endpoint_and_skips_failures() {
        let exporter = spawn_exporter("127.0.0.1:0", StatusCode::OK, SAMPLE).await;
        let router = proxy_router(vec![
            static_mount("/node", &exporter),
            cluster_mount("/cluster", 9100, Arc::new(OneAddress(9100))),
            cluster_mount("/gone", 9100, Arc::new(Missing)),
        ]);

        let (status, body) = get(router, "/").await;

        assert_eq!(status, StatusCode::OK);
        let document: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
        let mut paths = document
            .iter()
            .map(|entry| entry["labels"]["__metrics_path__"].as_str().unwrap().to_string())
            .collect::<Vec<_>>();
        paths.sort();
        assert_eq!(paths, vec!["/cluster/127.0.8.1", "/node"]);
    }

    #[tokio::test]
    async fn root_without_endpoints_is_an_empty_document() {
        let (status, body) = get(proxy_router(Vec::new()), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "[]");
    }
}
