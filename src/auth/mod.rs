use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::api::ErrorResponse;
use crate::config::AuthConfig;

pub const API_KEY_HEADER: &str = "x-api-key";

pub struct AuthService {
    enabled: bool,
    api_keys: Arc<Vec<String>>,
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            enabled: config.enabled,
            api_keys: Arc::new(
                config
                    .api_keys
                    .iter()
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect(),
            ),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn validate_key(&self, key: &str) -> bool {
        // If authentication is disabled, allow all requests
        if !self.enabled {
            return true;
        }

        // Enabled with no keys configured admits nobody
        !key.is_empty()
            && self
                .api_keys
                .iter()
                .any(|k| bool::from(k.as_bytes().ct_eq(key.as_bytes())))
    }
}

pub async fn auth_middleware(
    auth_service: Arc<AuthService>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if auth_service.validate_key(api_key) {
        next.run(request).await
    } else {
        tracing::debug!(path = %request.uri().path(), "Rejected request without a valid API key");
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Invalid or missing API key".to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool, keys: &[&str]) -> AuthConfig {
        AuthConfig {
            enabled,
            api_keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[test]
    fn test_validate_key() {
        let auth = AuthService::new(&config(true, &["alpha", " beta "]));
        assert!(auth.validate_key("alpha"));
        assert!(auth.validate_key("beta"));
        assert!(!auth.validate_key("alph"));
        assert!(!auth.validate_key(""));
    }

    #[test]
    fn test_disabled_and_empty() {
        assert!(AuthService::new(&config(false, &[])).validate_key(""));
        assert!(!AuthService::new(&config(true, &[])).validate_key("anything"));
    }
}
