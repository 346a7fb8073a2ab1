use std::sync::Arc;

use axum::{
    extract::{Path, RawQuery, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use filterproxy_common::types::LabelFilter;
use filterproxy_exposition::{MetricFamily, encode_text, filter, text_content_type};
use filterproxy_target::{ClusterTarget, StaticTarget};
use tracing::debug;

use crate::{error::ApiError, query::parse_label_filter};

pub async fn static_metrics(
    State(target): State<Arc<StaticTarget>>,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    let constraints = parse_label_filter(query.as_deref())?;
    let snapshot = target.fetch_metrics().await.map_err(ApiError::scrape)?;
    render(&snapshot, &constraints)
}

pub async fn cluster_metrics(
    State(target): State<Arc<ClusterTarget>>,
    Path(address): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    let constraints = parse_label_filter(query.as_deref())?;
    let address = address.trim_matches('/');
    let snapshot = target
        .fetch_metrics_for(address)
        .await
        .map_err(ApiError::scrape)?;
    match snapshot {
        Some(snapshot) => render(&snapshot, &constraints),
        None => {
            debug!(address, "address is not part of the endpoint");
            Ok(StatusCode::NOT_FOUND.into_response())
        }
    }
}

fn render(families: &[MetricFamily], constraints: &LabelFilter) -> Result<Response, ApiError> {
    let body = encode_text(&filter(families, constraints))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, text_content_type())],
        body,
    )
        .into_response())
}
