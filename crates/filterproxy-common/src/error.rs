use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("credential error: {0}")]
    Credential(String),
    #[error("request to {url} failed: {message}")]
    UpstreamTransport { url: String, message: String },
    #[error("got status code {status} from {url}: {body}")]
    UpstreamStatus {
        url: String,
        status: u16,
        body: String,
    },
    #[error("failed to decode metrics: {0}")]
    Decode(String),
    #[error("failed to encode metrics: {0}")]
    Encode(String),
    #[error("endpoints {namespace}/{name} not found")]
    ResourceNotFound { namespace: String, name: String },
    #[error("failed to resolve endpoints {namespace}/{name}: {message}")]
    Resolution {
        namespace: String,
        name: String,
        message: String,
    },
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Failures talking to or decoding the response of an upstream exporter.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::UpstreamTransport { .. } | Self::UpstreamStatus { .. } | Self::Decode(_)
        )
    }

    /// Failures looking up the addresses behind a cluster endpoint.
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::ResourceNotFound { .. } | Self::Resolution { .. })
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
