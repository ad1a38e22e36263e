//! Request-side inputs and outputs of country resolution

use axum::http::HeaderMap;
use serde::Serialize;

use crate::config::ResolverConfig;
use crate::geo::{language_for, CountryCode, NormalizedAddress};

/// Which signal produced a country.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Override,
    EdgeHeader,
    RangeTable,
    Unknown,
}

impl SignalSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalSource::Override => "override",
            SignalSource::EdgeHeader => "edge_header",
            SignalSource::RangeTable => "range_table",
            SignalSource::Unknown => "unknown",
        }
    }
}

/// Everything the resolver may consult for one request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Client address as received; normalized during resolution.
    pub ip: String,
    /// `(header name, value)` pairs from trusted edge proxies, in priority order.
    pub edge_signals: Vec<(String, String)>,
    /// Country chosen explicitly by the caller.
    pub override_country: Option<String>,
}

impl RequestContext {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ..Default::default()
        }
    }

    pub fn with_edge_signal(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.edge_signals.push((name.into(), value.into()));
        self
    }

    pub fn with_override(mut self, country: impl Into<String>) -> Self {
        self.override_country = Some(country.into());
        self
    }

    /// Collect the configured edge headers present on a request.
    pub fn from_headers(headers: &HeaderMap, ip: impl Into<String>, config: &ResolverConfig) -> Self {
        let edge_signals = config
            .edge_headers
            .iter()
            .filter_map(|name| {
                let value = headers.get(name.as_str())?.to_str().ok()?;
                Some((name.clone(), value.to_string()))
            })
            .collect();

        Self {
            ip: ip.into(),
            edge_signals,
            override_country: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedLocation {
    pub ip: NormalizedAddress,
    pub country: CountryCode,
    pub source: SignalSource,
}

impl ResolvedLocation {
    /// Principal language of the resolved country, empty when unknown.
    pub fn language(&self) -> String {
        language_for(&self.country)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_from_headers_keeps_configured_order() {
        let mut headers = HeaderMap::new();
        headers.insert("x-geoip-country-code", HeaderValue::from_static("DE"));
        headers.insert("cf-ipcountry", HeaderValue::from_static("FR"));
        headers.insert("x-unrelated", HeaderValue::from_static("JP"));

        let ctx = RequestContext::from_headers(&headers, "10.0.0.1", &ResolverConfig::default());
        assert_eq!(ctx.ip, "10.0.0.1");
        assert_eq!(
            ctx.edge_signals,
            vec![
                ("cf-ipcountry".to_string(), "FR".to_string()),
                ("x-geoip-country-code".to_string(), "DE".to_string()),
            ]
        );
    }
}
