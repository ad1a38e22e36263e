//! Range feed sources and integrity checks
//!
//! A source hands back the raw feed body plus, when the upstream publishes
//! one, a companion digest. Digests are either a plain SHA-256 hex checksum
//! (`sha256sum` output) or a base64 HMAC-SHA256 signature under a shared key.

use async_trait::async_trait;
use base64::prelude::*;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::path::PathBuf;
use std::time::Duration;
use subtle::ConstantTimeEq;

use super::ingest::IngestError;

/// How a companion resource should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestKind {
    Sha256,
    Hmac,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedDigest {
    /// Lower- or upper-case hex SHA-256 of the body.
    Sha256(String),
    /// Base64 HMAC-SHA256 of the body.
    Hmac(String),
}

impl FeedDigest {
    /// Parse a companion resource; only the first whitespace-separated token
    /// is significant so `sha256sum` output works as-is.
    pub fn from_companion(kind: DigestKind, text: &str) -> Option<Self> {
        let token = text.split_whitespace().next()?.to_string();
        Some(match kind {
            DigestKind::Sha256 => FeedDigest::Sha256(token),
            DigestKind::Hmac => FeedDigest::Hmac(token),
        })
    }

    /// Check `body` against this digest.
    pub fn verify(&self, body: &[u8], signing_key: Option<&[u8]>) -> Result<(), IngestError> {
        match self {
            FeedDigest::Sha256(expected) => {
                let actual = hex::encode(Sha256::digest(body));
                if actual.eq_ignore_ascii_case(expected) {
                    Ok(())
                } else {
                    Err(IngestError::ChecksumMismatch {
                        expected: expected.clone(),
                        actual,
                    })
                }
            }
            FeedDigest::Hmac(provided) => {
                let key = signing_key.ok_or_else(|| IngestError::ChecksumMismatch {
                    expected: "signature under configured key".to_string(),
                    actual: "no signing key configured".to_string(),
                })?;
                let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|e| {
                    IngestError::ChecksumMismatch {
                        expected: "usable signing key".to_string(),
                        actual: e.to_string(),
                    }
                })?;
                mac.update(body);
                let expected = mac.finalize().into_bytes();
                let provided_bytes = BASE64_STANDARD.decode(provided).unwrap_or_default();

                if expected.ct_eq(&provided_bytes[..]).into() {
                    Ok(())
                } else {
                    Err(IngestError::ChecksumMismatch {
                        expected: BASE64_STANDARD.encode(expected),
                        actual: provided.clone(),
                    })
                }
            }
        }
    }
}

/// Downloaded feed content.
#[derive(Debug, Clone)]
pub struct FeedPayload {
    pub body: Vec<u8>,
    pub digest: Option<FeedDigest>,
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Human-readable origin for logs.
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<FeedPayload, IngestError>;
}

/// Feed served over HTTP(S).
pub struct HttpFeed {
    client: Client,
    url: String,
    companion: Option<(String, DigestKind)>,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, IngestError> {
        let client = Client::builder()
            .user_agent(concat!("geoloc-feed/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::DownloadFailed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            companion: None,
        })
    }

    /// Require a digest published at `url`.
    pub fn with_companion(mut self, url: impl Into<String>, kind: DigestKind) -> Self {
        self.companion = Some((url.into(), kind));
        self
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, IngestError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::DownloadFailed(format!("GET {url}: {e}")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| IngestError::DownloadFailed(format!("reading response from {url}: {e}")))?
            .to_vec();

        if status == StatusCode::TOO_MANY_REQUESTS || announces_quota(&body) {
            return Err(IngestError::QuotaExceeded);
        }
        if !status.is_success() {
            return Err(IngestError::DownloadFailed(format!("GET {url}: HTTP {status}")));
        }

        Ok(body)
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<FeedPayload, IngestError> {
        let body = self.get(&self.url).await?;

        let digest = match &self.companion {
            Some((url, kind)) => {
                let text = String::from_utf8_lossy(&self.get(url).await?).into_owned();
                Some(FeedDigest::from_companion(*kind, &text).ok_or_else(|| {
                    IngestError::DownloadFailed(format!("companion {url} was empty"))
                })?)
            }
            None => None,
        };

        Ok(FeedPayload { body, digest })
    }
}

/// Upstreams that meter downloads answer with a short notice instead of the
/// feed, sometimes with a 200 status.
fn announces_quota(body: &[u8]) -> bool {
    if body.len() > 512 {
        return false;
    }
    let text = String::from_utf8_lossy(body).to_ascii_lowercase();
    ["quota exceeded", "download limit", "can only be downloaded"]
        .iter()
        .any(|marker| text.contains(marker))
}

/// Feed stored on the local filesystem.
pub struct FileFeed {
    path: PathBuf,
    companion: Option<(PathBuf, DigestKind)>,
}

impl FileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            companion: None,
        }
    }

    pub fn with_companion(mut self, path: impl Into<PathBuf>, kind: DigestKind) -> Self {
        self.companion = Some((path.into(), kind));
        self
    }
}

#[async_trait]
impl FeedSource for FileFeed {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> Result<FeedPayload, IngestError> {
        let body = tokio::fs::read(&self.path).await.map_err(|e| {
            IngestError::DownloadFailed(format!("reading {}: {e}", self.path.display()))
        })?;

        let digest = match &self.companion {
            Some((path, kind)) => {
                let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                    IngestError::DownloadFailed(format!("reading {}: {e}", path.display()))
                })?;
                Some(FeedDigest::from_companion(*kind, &text).ok_or_else(|| {
                    IngestError::DownloadFailed(format!("companion {} was empty", path.display()))
                })?)
            }
            None => None,
        };

        Ok(FeedPayload { body, digest })
    }
}

/// Feed already held in memory.
pub struct StaticFeed {
    name: String,
    payload: FeedPayload,
}

impl StaticFeed {
    pub fn new(name: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            payload: FeedPayload {
                body: body.into(),
                digest: None,
            },
        }
    }

    pub fn with_digest(mut self, digest: FeedDigest) -> Self {
        self.payload.digest = Some(digest);
        self
    }
}

#[async_trait]
impl FeedSource for StaticFeed {
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn fetch(&self) -> Result<FeedPayload, IngestError> {
        Ok(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::Digest;

    const BODY: &[u8] = b"0,255,US\n";

    #[test]
    fn test_sha256_digest_matches() {
        let hex = hex::encode(Sha256::digest(BODY));
        let digest = FeedDigest::from_companion(DigestKind::Sha256, &format!("{hex}  feed.csv\n"))
            .unwrap();
        assert!(digest.verify(BODY, None).is_ok());
        assert!(FeedDigest::Sha256(hex.to_uppercase()).verify(BODY, None).is_ok());
    }

    #[test]
    fn test_sha256_digest_mismatch() {
        let digest = FeedDigest::Sha256("00".repeat(32));
        assert!(matches!(
            digest.verify(BODY, None),
            Err(IngestError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_hmac_signature() {
        let key = b"shared-secret";
        let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap();
        mac.update(BODY);
        let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        let digest = FeedDigest::Hmac(signature);
        assert!(digest.verify(BODY, Some(key)).is_ok());
        assert!(digest.verify(b"tampered", Some(key)).is_err());
        assert!(digest.verify(BODY, Some(b"other-key")).is_err());
        assert!(digest.verify(BODY, None).is_err());
    }

    #[test]
    fn test_empty_companion() {
        assert!(FeedDigest::from_companion(DigestKind::Sha256, "  \n").is_none());
    }

    #[test]
    fn test_quota_notice_detection() {
        assert!(announces_quota(b"THIS FILE CAN ONLY BE DOWNLOADED 5 TIMES PER HOUR"));
        assert!(announces_quota(b"Quota exceeded"));
        assert!(!announces_quota(BODY));
    }

    #[tokio::test]
    async fn test_static_feed_round_trip() {
        let feed = StaticFeed::new("inline", BODY).with_digest(FeedDigest::Sha256("ab".into()));
        let payload = feed.fetch().await.unwrap();
        assert_eq!(payload.body, BODY);
        assert_eq!(payload.digest, Some(FeedDigest::Sha256("ab".into())));
        assert_eq!(feed.describe(), "inline");
    }

    #[tokio::test]
    async fn test_missing_file_is_download_failure() {
        let feed = FileFeed::new("/nonexistent/geoloc-feed.csv");
        assert!(matches!(
            feed.fetch().await,
            Err(IngestError::DownloadFailed(_))
        ));
    }
}
