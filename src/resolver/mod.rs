//! Country resolution for incoming requests
//!
//! Signals are tried in order and the first usable one wins: an explicit
//! override, then trusted edge headers, then the local range tables. The
//! range-table step is memoized per address.

pub mod cache;
pub mod signal;

pub use cache::{MokaResolutionCache, ResolutionCache};
pub use signal::{RequestContext, ResolvedLocation, SignalSource};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::geo::{normalize_or_default, CountryCode};
use crate::ranges::RangeTables;

/// Cloudflare's placeholder when it has no country for the client.
const EDGE_UNKNOWN: &str = "XX";

pub struct SignalResolver {
    tables: Arc<RangeTables>,
    cache: Arc<dyn ResolutionCache>,
    ignore_header_override: bool,
    forced_country: Option<CountryCode>,
}

impl SignalResolver {
    pub fn new(tables: Arc<RangeTables>, config: &ResolverConfig) -> Self {
        let cache = MokaResolutionCache::new(
            Duration::from_secs(config.cache_ttl_secs),
            config.cache_max_entries,
        );
        Self::with_cache(tables, config, Arc::new(cache))
    }

    pub fn with_cache(
        tables: Arc<RangeTables>,
        config: &ResolverConfig,
        cache: Arc<dyn ResolutionCache>,
    ) -> Self {
        let forced_country = config.forced_country.as_deref().and_then(|raw| {
            let code = CountryCode::parse(raw).filter(|c| !c.is_unknown());
            if code.is_none() {
                warn!(forced_country = raw, "Ignoring invalid forced_country");
            }
            code
        });

        Self {
            tables,
            cache,
            ignore_header_override: config.ignore_header_override,
            forced_country,
        }
    }

    pub async fn resolve(&self, ctx: &RequestContext) -> ResolvedLocation {
        let ip = normalize_or_default(&ctx.ip);

        let explicit = ctx
            .override_country
            .as_deref()
            .and_then(CountryCode::parse)
            .filter(|c| !c.is_unknown())
            .or(self.forced_country);
        if let Some(country) = explicit {
            return ResolvedLocation {
                ip,
                country,
                source: SignalSource::Override,
            };
        }

        if !self.ignore_header_override {
            for (name, value) in &ctx.edge_signals {
                // Exactly two letters, no padding
                if value.len() != 2 || value.eq_ignore_ascii_case(EDGE_UNKNOWN) {
                    continue;
                }
                if let Some(country) = CountryCode::parse(value).filter(|c| !c.is_unknown()) {
                    debug!(header = %name, country = %country, "Country from edge header");
                    return ResolvedLocation {
                        ip,
                        country,
                        source: SignalSource::EdgeHeader,
                    };
                }
            }
        }

        let key = ip.fingerprint();
        let country = match self.cache.get(&key).await {
            Some(country) => country,
            None => {
                let country = self.tables.lookup(&ip);
                self.cache.insert(key, country).await;
                country
            }
        };

        let source = if country.is_unknown() {
            SignalSource::Unknown
        } else {
            SignalSource::RangeTable
        };
        ResolvedLocation {
            ip,
            country: country.canonical(),
            source,
        }
    }

    /// Forget memoized lookups, e.g. after a range reload.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }
}
