use std::time::Duration;

use filterproxy_common::error::{ProxyError, Result};
use filterproxy_exposition::{MetricFamily, decode};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::auth::Credential;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct UpstreamOptions {
    pub credential: Option<Credential>,
    pub timeout: Duration,
    pub insecure_skip_verify: bool,
}

impl Default for UpstreamOptions {
    fn default() -> Self {
        Self {
            credential: None,
            timeout: DEFAULT_TIMEOUT,
            insecure_skip_verify: false,
        }
    }
}

/// Scrapes upstream exporters with one configured HTTP client.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    credential: Option<Credential>,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(options: UpstreamOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.insecure_skip_verify)
            .build()
            .map_err(|err| {
                ProxyError::Configuration(format!("failed to build upstream http client: {err}"))
            })?;

        Ok(Self {
            client,
            credential: options.credential,
            timeout: options.timeout,
        })
    }

    /// Upper bound for a single upstream or resolver call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GETs `url` and decodes the body according to its declared content type.
    ///
    /// Any status outside 2xx is an error carrying the response body.
    pub async fn fetch_metrics(&self, url: &str) -> Result<Vec<MetricFamily>> {
        debug!(url, "fetching upstream metrics");

        let mut request = self.client.get(url);
        if let Some(credential) = &self.credential {
            request = request.bearer_auth(credential.token());
        }

        let response = request
            .send()
            .await
            .map_err(|err| transport_error(url, err))?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|err| transport_error(url, err))?;

        if !status.is_success() {
            return Err(ProxyError::UpstreamStatus {
                url: url.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        decode(&body, content_type.as_deref())
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> ProxyError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    ProxyError::UpstreamTransport {
        url: url.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::testing::{SIMPLE, spawn_exporter};

    #[tokio::test]
    async fn decodes_upstream_body() {
        let exporter = spawn_exporter("127.0.0.1:0", StatusCode::OK, SIMPLE).await;
        let client = UpstreamClient::new(UpstreamOptions::default()).unwrap();

        let families = client.fetch_metrics(&exporter.url()).await.unwrap();

        assert_eq!(families.len(), 2);
        let one = families
            .iter()
            .find(|family| family.get_name() == "test_metric_one")
            .unwrap();
        assert_eq!(one.get_metric().len(), 3);
        assert_eq!(one.get_metric()[2].get_gauge().get_value(), 0.3);
        assert!(exporter.authorization().is_empty());
    }

    #[tokio::test]
    async fn sends_bearer_token_once() {
        let exporter = spawn_exporter("127.0.0.1:0", StatusCode::OK, SIMPLE).await;
        let client = UpstreamClient::new(UpstreamOptions {
            credential: Some(Credential::bearer("foobar")),
            ..UpstreamOptions::default()
        })
        .unwrap();

        client.fetch_metrics(&exporter.url()).await.unwrap();

        assert_eq!(exporter.authorization(), vec!["Bearer foobar".to_string()]);
    }

    #[tokio::test]
    async fn non_success_status_carries_body() {
        let exporter = spawn_exporter("127.0.0.1:0", StatusCode::IM_A_TEAPOT, "I'm a teapot").await;
        let client = UpstreamClient::new(UpstreamOptions::default()).unwrap();

        let err = client.fetch_metrics(&exporter.url()).await.unwrap_err();

        match err {
            ProxyError::UpstreamStatus { status, body, .. } => {
                assert_eq!(status, 418);
                assert_eq!(body, "I'm a teapot");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn redirect_class_status_is_an_error() {
        let exporter = spawn_exporter("127.0.0.1:0", StatusCode::NOT_MODIFIED, "").await;
        let client = UpstreamClient::new(UpstreamOptions::default()).unwrap();

        let err = client.fetch_metrics(&exporter.url()).await.unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamStatus { status: 304, .. }));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = UpstreamClient::new(UpstreamOptions::default()).unwrap();
        let err = client
            .fetch_metrics(&format!("http://{addr}/metrics"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamTransport { .. }));
        assert!(err.is_upstream());
    }

    #[tokio::test]
    async fn undecodable_body_is_a_decode_error() {
        let exporter = spawn_exporter("127.0.0.1:0", StatusCode::OK, "definitely not metrics").await;
        let client = UpstreamClient::new(UpstreamOptions::default()).unwrap();

        let err = client.fetch_metrics(&exporter.url()).await.unwrap_err();
        assert!(matches!(err, ProxyError::Decode(_)));
    }
}
