use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use filterproxy_common::error::ProxyError;
use tracing::{debug, error, warn};

pub struct ApiError {
    error: ProxyError,
    scraping: bool,
}

impl ApiError {
    /// An error raised while scraping metrics on behalf of a request. Failing
    /// to resolve the endpoint counts as an upstream failure there.
    pub fn scrape(error: ProxyError) -> Self {
        Self {
            error,
            scraping: true,
        }
    }

    pub fn status(&self) -> StatusCode {
        match &self.error {
            ProxyError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            err if err.is_upstream() => StatusCode::BAD_GATEWAY,
            err if self.scraping && err.is_resolution() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ProxyError> for ApiError {
    fn from(error: ProxyError) -> Self {
        Self {
            error,
            scraping: false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.error.to_string();
        match status {
            StatusCode::BAD_REQUEST => debug!(error = %message, "rejected request"),
            StatusCode::BAD_GATEWAY => warn!(error = %message, "failed to fetch metrics"),
            _ => error!(error = %message, "request failed"),
        }

        (status, message).into_response()
    }
}
