use axum::{
    body::{to_bytes, Body},
    extract::{OriginalUri, State},
    http::{HeaderMap, HeaderName, Method},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::debug;

use crate::errors::AppError;
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// ANY /api/*path
/// Forwards the request unmodified to `{API_BASE_URL}/api/...` and relays the response.
pub async fn forward_handler(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let url = upstream_url(&state.config.api_base_url, uri.path(), uri.query());

    let payload: Bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read request body: {e}")))?;

    debug!("Forwarding {method} {} -> {url}", uri.path());

    let upstream = state
        .http
        .request(method, &url)
        .headers(forwardable(&headers))
        .body(payload)
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("{url}: {e}")))?;

    let status = upstream.status();
    let response_headers = forwardable(upstream.headers());
    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| AppError::Upstream(format!("{url}: failed reading body: {e}")))?;

    Ok((status, response_headers, bytes).into_response())
}

/// Joins the backend base URL with the original path and query, unmodified.
pub fn upstream_url(base: &str, path: &str, query: Option<&str>) -> String {
    let mut url = format!("{}{}", base.trim_end_matches('/'), path);
    if let Some(q) = query {
        url.push('?');
        url.push_str(q);
    }
    url
}

/// Drops hop-by-hop headers plus `host` and `content-length`, which the
/// client recomputes for the outgoing leg.
fn forwardable(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
    )
}
