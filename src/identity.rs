//! Bearer token verification against an external identity provider

use crate::types::VerifiedIdentity;
use async_trait::async_trait;
use std::time::Duration;

pub type IdentityResult<T> = Result<T, IdentityError>;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Bearer token is empty")]
    MissingToken,

    #[error("Bearer token was rejected by the identity provider")]
    InvalidToken,

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("Identity provider returned an unusable identity: {0}")]
    Malformed(String),

    #[error("Identity provider is not configured (set IDENTITY_DOMAIN)")]
    NotConfigured,
}

/// Exchanges a bearer token for a verified identity
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, bearer_token: &str) -> IdentityResult<VerifiedIdentity>;
}

/// Identity provider configuration
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Base URL of the provider, e.g. `https://tenant.auth0.com`
    pub domain: Option<String>,
    /// Upper bound for a single verify or profile call
    pub timeout: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            domain: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl IdentityConfig {
    /// Load from IDENTITY_DOMAIN and AUTH_TIMEOUT_SECS
    pub fn from_env() -> Self {
        let domain = std::env::var("IDENTITY_DOMAIN").ok().and_then(|d| {
            let trimmed = d.trim().trim_end_matches('/');
            (!trimmed.is_empty()).then(|| normalize_base_url(trimmed))
        });

        let timeout = std::env::var("AUTH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10));

        if domain.is_none() {
            tracing::warn!("IDENTITY_DOMAIN not set - every authenticate request will fail!");
        }

        Self { domain, timeout }
    }

    pub fn build_verifier(&self) -> Box<dyn IdentityVerifier> {
        match &self.domain {
            Some(domain) => Box::new(UserInfoVerifier::new(domain.clone(), self.timeout)),
            None => Box::new(UnconfiguredVerifier),
        }
    }
}

/// Prefix bare hosts with https://
pub(crate) fn normalize_base_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Verifies tokens by calling the provider's OIDC `/userinfo` endpoint
pub struct UserInfoVerifier {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl UserInfoVerifier {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl IdentityVerifier for UserInfoVerifier {
    async fn verify(&self, bearer_token: &str) -> IdentityResult<VerifiedIdentity> {
        let token = bearer_token.trim_start();
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Err(IdentityError::MissingToken);
        }

        let url = format!("{}/userinfo", self.base_url);
        let response = tokio::time::timeout(
            self.timeout,
            self.client.get(&url).bearer_auth(token).send(),
        )
        .await
        .map_err(|_| IdentityError::Unavailable(format!("timed out after {:?}", self.timeout)))?
        .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(IdentityError::InvalidToken);
        }
        if !status.is_success() {
            return Err(IdentityError::Unavailable(format!(
                "userinfo returned status: {}",
                status
            )));
        }

        response
            .json::<VerifiedIdentity>()
            .await
            .map_err(|e| IdentityError::Malformed(e.to_string()))
    }
}

/// Stand-in used when no provider is configured
pub struct UnconfiguredVerifier;

#[async_trait]
impl IdentityVerifier for UnconfiguredVerifier {
    async fn verify(&self, _bearer_token: &str) -> IdentityResult<VerifiedIdentity> {
        Err(IdentityError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("tenant.auth0.com"),
            "https://tenant.auth0.com"
        );
        assert_eq!(
            normalize_base_url("http://localhost:8080"),
            "http://localhost:8080"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("IDENTITY_DOMAIN", " tenant.auth0.com/ ");
        std::env::set_var("AUTH_TIMEOUT_SECS", "3");
        let config = IdentityConfig::from_env();
        assert_eq!(config.domain.as_deref(), Some("https://tenant.auth0.com"));
        assert_eq!(config.timeout, Duration::from_secs(3));

        std::env::set_var("IDENTITY_DOMAIN", "   ");
        std::env::set_var("AUTH_TIMEOUT_SECS", "0");
        let config = IdentityConfig::from_env();
        assert!(config.domain.is_none());
        assert_eq!(config.timeout, Duration::from_secs(10));

        std::env::remove_var("IDENTITY_DOMAIN");
        std::env::remove_var("AUTH_TIMEOUT_SECS");
    }

    #[tokio::test]
    async fn test_unconfigured_verifier_rejects() {
        let verifier = IdentityConfig::default().build_verifier();
        assert!(matches!(
            verifier.verify("token").await,
            Err(IdentityError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_empty_token_skips_network() {
        // Unroutable base URL: any request would fail as Unavailable
        let verifier = UserInfoVerifier::new("http://127.0.0.1:9".to_string(), Duration::from_secs(1));
        assert!(matches!(
            verifier.verify("   ").await,
            Err(IdentityError::MissingToken)
        ));
        assert!(matches!(
            verifier.verify("Bearer ").await,
            Err(IdentityError::MissingToken)
        ));
    }
}
