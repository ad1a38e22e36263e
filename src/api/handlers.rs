use axum::{
    extract::{ConnectInfo, Query, Request, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::ResolverConfig;
use crate::geo::{flag_emoji, localized_country_name, localized_language_name, NormalizedAddress};
use crate::ranges::{FamilyStatus, RangeIngester};
use crate::resolver::{RequestContext, ResolvedLocation, SignalResolver, SignalSource};
use crate::stats::{ClientClassifier, StatsAggregator};

const DEFAULT_LOCALE: &str = "en";

pub struct AppState {
    pub resolver: Arc<SignalResolver>,
    pub ingester: Arc<RangeIngester>,
    pub stats: Arc<StatsAggregator>,
    pub classifier: ClientClassifier,
    pub resolver_config: ResolverConfig,
    pub default_site_id: i64,
    pub channel_header: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

#[derive(Deserialize)]
pub struct DescribeQuery {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NamedCode {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct FlagInfo {
    pub code: String,
    pub emoji: String,
}

#[derive(Debug, Serialize)]
pub struct DescribeResponse {
    pub ip: NormalizedAddress,
    pub locale: String,
    pub country: NamedCode,
    pub language: NamedCode,
    pub flag: FlagInfo,
    pub source: SignalSource,
}

impl DescribeResponse {
    fn new(resolved: ResolvedLocation, locale: String) -> Self {
        let language = resolved.language();
        Self {
            country: NamedCode {
                code: resolved.country.to_string(),
                name: localized_country_name(&resolved.country, &locale).to_string(),
            },
            language: NamedCode {
                name: localized_language_name(&language, &locale).to_string(),
                code: language,
            },
            flag: FlagInfo {
                code: resolved.country.as_str().to_ascii_lowercase(),
                emoji: flag_emoji(&resolved.country),
            },
            ip: resolved.ip,
            locale,
            source: resolved.source,
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}

/// Describe the country and language of an arbitrary address
pub async fn describe(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DescribeQuery>,
) -> Json<DescribeResponse> {
    let ctx = RequestContext::new(query.ip.unwrap_or_default());
    let resolved = state.resolver.resolve(&ctx).await;

    let locale = query
        .locale
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| DEFAULT_LOCALE.to_string());

    Json(DescribeResponse::new(resolved, locale))
}

/// Describe the caller, honouring trusted edge headers
pub async fn locate(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Json<DescribeResponse> {
    let ctx =
        RequestContext::from_headers(request.headers(), peer_ip(&request), &state.resolver_config);
    let resolved = state.resolver.resolve(&ctx).await;
    Json(DescribeResponse::new(resolved, DEFAULT_LOCALE.to_string()))
}

/// Per-family record counts and versions of the live range tables
pub async fn ranges_status(State(state): State<Arc<AppState>>) -> Json<Vec<FamilyStatus>> {
    Json(state.ingester.status())
}

/// Socket peer address, empty when the server was not started with connect info.
pub(crate) fn peer_ip(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}
