use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::ranges::DigestKind;

/// Shortest history the stats table keeps.
pub const MIN_RETENTION_DAYS: u32 = 30;

const DEFAULT_CONFIG_FILE: &str = "geoloc.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub auth: AuthConfig,
    pub resolver: ResolverConfig,
    pub ingest: IngestConfig,
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Sqlite,
            url: "sqlite://./geoloc.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    #[serde(alias = "postgresql")]
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// When false the protected endpoints are open.
    pub enabled: bool,
    pub api_keys: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_keys: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Skip edge headers and always consult the range table.
    pub ignore_header_override: bool,
    /// Trusted country headers, highest priority first.
    pub edge_headers: Vec<String>,
    /// Answer every request with this country.
    pub forced_country: Option<String>,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ignore_header_override: false,
            edge_headers: vec![
                "cf-ipcountry".to_string(),
                "cloudfront-viewer-country".to_string(),
                "x-geoip-country-code".to_string(),
            ],
            forced_country: None,
            cache_ttl_secs: 3600,
            cache_max_entries: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Run the periodic reload task on this node.
    pub autoupdate: bool,
    /// IPv4 feed; an `http(s)://` URL or a local path.
    pub v4_url: Option<String>,
    pub v6_url: Option<String>,
    /// Companion digest lives at the feed location plus this suffix.
    pub checksum_suffix: Option<String>,
    pub checksum_kind: DigestKind,
    /// Shared key for `hmac` companions.
    pub signing_key: Option<String>,
    pub accept_checksum_mismatch: bool,
    pub timeout_secs: u64,
    pub interval_secs: u64,
    pub jitter_secs: u64,
    pub quota_backoff_secs: u64,
    /// How often every node checks storage for a newer generation; zero
    /// disables the check.
    pub refresh_interval_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            autoupdate: false,
            v4_url: None,
            v6_url: None,
            checksum_suffix: None,
            checksum_kind: DigestKind::Sha256,
            signing_key: None,
            accept_checksum_mismatch: false,
            timeout_secs: 60,
            interval_secs: 7 * 24 * 3600,
            jitter_secs: 3600,
            quota_backoff_secs: 6 * 3600,
            refresh_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub analytics_enabled: bool,
    pub history_retention_days: u32,
    pub default_site_id: i64,
    pub flush_interval_ms: u64,
    /// Request header the hosting environment uses to label the channel a
    /// request was served in. Requests without it count as `rest`.
    pub channel_header: String,
    /// Case-insensitive User-Agent substrings per client class. Bot markers
    /// are checked first, then mobile, then desktop.
    pub bot_markers: Vec<String>,
    pub mobile_markers: Vec<String>,
    pub desktop_markers: Vec<String>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            analytics_enabled: true,
            history_retention_days: MIN_RETENTION_DAYS,
            default_site_id: 1,
            flush_interval_ms: 5000,
            channel_header: "x-request-channel".to_string(),
            bot_markers: owned(&[
                "bot",
                "crawl",
                "spider",
                "slurp",
                "curl",
                "wget",
                "python-requests",
                "httpclient",
                "headless",
            ]),
            mobile_markers: owned(&[
                "mobile",
                "android",
                "iphone",
                "ipad",
                "ipod",
                "blackberry",
                "opera mini",
                "windows phone",
            ]),
            desktop_markers: owned(&["windows", "macintosh", "mac os x", "x11", "linux", "cros"]),
        }
    }
}

impl Config {
    /// Load configuration from `.env`, the optional config file named by
    /// `GEOLOC_CONFIG` (default `geoloc.toml`) and `GEOLOC_*` variables,
    /// later sources overriding earlier ones.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let path =
            std::env::var("GEOLOC_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let env = config::Environment::with_prefix("GEOLOC")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("auth.api_keys")
            .with_list_parse_key("resolver.edge_headers")
            .with_list_parse_key("stats.bot_markers")
            .with_list_parse_key("stats.mobile_markers")
            .with_list_parse_key("stats.desktop_markers");

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(env)
            .build()
            .with_context(|| format!("failed to read configuration (file: {path})"))?;

        let config: Config = settings
            .try_deserialize()
            .context("invalid configuration")?;
        Ok(config.normalized())
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml_str(toml: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        let config: Config = settings
            .try_deserialize()
            .context("invalid configuration")?;
        Ok(config.normalized())
    }

    fn normalized(mut self) -> Self {
        if self.stats.history_retention_days < MIN_RETENTION_DAYS {
            tracing::warn!(
                configured = self.stats.history_retention_days,
                minimum = MIN_RETENTION_DAYS,
                "history_retention_days below minimum, using minimum"
            );
            self.stats.history_retention_days = MIN_RETENTION_DAYS;
        }

        for header in &mut self.resolver.edge_headers {
            *header = header.trim().to_ascii_lowercase();
        }
        self.resolver.edge_headers.retain(|h| !h.is_empty());
        self.stats.channel_header = self.stats.channel_header.trim().to_ascii_lowercase();

        if self.auth.enabled && self.auth.api_keys.is_empty() {
            tracing::warn!("auth is enabled but no API keys are configured; protected endpoints will reject every request");
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.database.backend, DatabaseBackend::Sqlite);
        assert_eq!(config.api_server.port, 8080);
        assert_eq!(config.stats.history_retention_days, 30);
        assert_eq!(config.resolver.edge_headers[0], "cf-ipcountry");
        assert!(!config.ingest.autoupdate);
        assert_eq!(config.ingest.refresh_interval_secs, 60);
        assert_eq!(config.stats.channel_header, "x-request-channel");
    }

    #[test]
    fn test_retention_is_clamped() {
        let config = Config::from_toml_str("[stats]\nhistory_retention_days = 7\n").unwrap();
        assert_eq!(config.stats.history_retention_days, MIN_RETENTION_DAYS);

        let config = Config::from_toml_str("[stats]\nhistory_retention_days = 90\n").unwrap();
        assert_eq!(config.stats.history_retention_days, 90);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            [database]
            backend = "postgres"
            url = "postgres://localhost/geoloc"

            [resolver]
            ignore_header_override = true
            edge_headers = ["X-Country", " "]
            forced_country = "fr"

            [ingest]
            v4_url = "https://feeds.example.net/v4.csv"
            checksum_suffix = ".sig"
            checksum_kind = "hmac"
            refresh_interval_secs = 0

            [stats]
            channel_header = " X-Wp-Context "
            "#,
        )
        .unwrap();

        assert_eq!(config.database.backend, DatabaseBackend::Postgres);
        assert_eq!(config.database.max_connections, 5);
        assert!(config.resolver.ignore_header_override);
        assert_eq!(config.resolver.edge_headers, vec!["x-country".to_string()]);
        assert_eq!(config.resolver.forced_country.as_deref(), Some("fr"));
        assert_eq!(config.ingest.checksum_kind, DigestKind::Hmac);
        assert_eq!(config.ingest.timeout_secs, 60);
        assert_eq!(config.ingest.refresh_interval_secs, 0);
        assert_eq!(config.stats.channel_header, "x-wp-context");
    }
}
