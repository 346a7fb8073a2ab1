use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, Uri, header},
};
use filterproxy_common::types::DiscoveryEntry;
use filterproxy_target::TargetDiscovery;

use crate::error::ApiError;

/// Serves the discovery document of whatever is mounted at the request path.
///
/// Targets point back at the proxy through the request's `Host`.
pub async fn discovery(
    State(member): State<Arc<dyn TargetDiscovery>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Json<Vec<DiscoveryEntry>>, ApiError> {
    let base_target = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))
        .unwrap_or_default();
    let base_path = uri.path().trim_end_matches('/');

    let entries = member.discovery_entries(base_target, base_path).await?;
    Ok(Json(entries))
}
