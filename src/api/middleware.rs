use axum::{
    extract::{Request, State},
    http::header::USER_AGENT,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

use super::handlers::{peer_ip, AppState};
use crate::resolver::RequestContext;
use crate::stats::{Channel, HitEvent};

pub const SITE_ID_HEADER: &str = "x-site-id";

/// Count every served request once the response is ready.
pub async fn record_hits(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.stats.is_enabled() {
        return next.run(request).await;
    }

    let started = Instant::now();
    let headers = request.headers();
    let ctx = RequestContext::from_headers(headers, peer_ip(&request), &state.resolver_config);
    let site_id = headers
        .get(SITE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(state.default_site_id);
    let channel = headers
        .get(state.channel_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(Channel::from_label)
        .unwrap_or(Channel::Rest);
    let client = state
        .classifier
        .classify(headers.get(USER_AGENT).and_then(|v| v.to_str().ok()));

    let response = next.run(request).await;

    let resolved = state.resolver.resolve(&ctx).await;
    state.stats.record(HitEvent {
        site_id,
        channel,
        client,
        language: resolved.language(),
        country: resolved.country,
    });

    tracing::debug!(
        status = response.status().as_u16(),
        country = %resolved.country,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Recorded hit"
    );
    response
}
