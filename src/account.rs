//! Account profile lookup
//!
//! Profiles live in an external account service. When no service is
//! configured the verified identity itself is used as the profile.

use crate::identity::normalize_base_url;
use crate::types::{Profile, VerifiedIdentity};
use async_trait::async_trait;
use std::time::Duration;

pub type AccountResult<T> = Result<T, AccountError>;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Account service unreachable: {0}")]
    Unreachable(String),

    #[error("No account for user {0}")]
    NotFound(String),

    #[error("Account service returned status: {0}")]
    Status(u16),

    #[error("Account is missing required fields: {0}")]
    Incomplete(String),
}

/// Returns the account profile for a verified identity
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn get_account(&self, identity: &VerifiedIdentity) -> AccountResult<Profile>;
}

#[derive(Debug, Clone, Default)]
pub struct AccountConfig {
    /// Base URL of the account service (None = derive from identity)
    pub service_url: Option<String>,
}

impl AccountConfig {
    /// Load from ACCOUNT_SERVICE_URL
    pub fn from_env() -> Self {
        let service_url = std::env::var("ACCOUNT_SERVICE_URL").ok().and_then(|url| {
            let trimmed = url.trim().trim_end_matches('/');
            (!trimmed.is_empty()).then(|| normalize_base_url(trimmed))
        });

        if service_url.is_none() {
            tracing::warn!(
                "ACCOUNT_SERVICE_URL not set - profiles will be taken from the identity provider"
            );
        }

        Self { service_url }
    }

    pub fn build_lookup(&self, timeout: Duration) -> Box<dyn ProfileLookup> {
        match &self.service_url {
            Some(url) => Box::new(HttpAccountService::new(url.clone(), timeout)),
            None => Box::new(IdentityProfiles),
        }
    }
}

/// Fetches `GET {base_url}/accounts/{id}`
pub struct HttpAccountService {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpAccountService {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
            timeout,
        }
    }

    async fn fetch(&self, identity: &VerifiedIdentity) -> AccountResult<Profile> {
        let url = format!("{}/accounts/{}", self.base_url, identity.id);

        let response = tokio::time::timeout(self.timeout, self.client.get(&url).send())
            .await
            .map_err(|_| AccountError::Unreachable(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| AccountError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AccountError::NotFound(identity.id.clone()));
        }
        if !status.is_success() {
            return Err(AccountError::Status(status.as_u16()));
        }

        response
            .json::<Profile>()
            .await
            .map_err(|e| AccountError::Incomplete(e.to_string()))
    }
}

#[async_trait]
impl ProfileLookup for HttpAccountService {
    async fn get_account(&self, identity: &VerifiedIdentity) -> AccountResult<Profile> {
        self.fetch(identity).await.inspect_err(|e| {
            tracing::error!(
                user_id = %identity.id,
                "Account lookup failed, is the account service running? {}",
                e
            );
        })
    }
}

/// Builds the profile straight from the identity provider's claims
pub struct IdentityProfiles;

#[async_trait]
impl ProfileLookup for IdentityProfiles {
    async fn get_account(&self, identity: &VerifiedIdentity) -> AccountResult<Profile> {
        let email = identity
            .email
            .clone()
            .ok_or_else(|| AccountError::Incomplete("email".to_string()))?;
        let picture = identity
            .picture
            .clone()
            .ok_or_else(|| AccountError::Incomplete("picture".to_string()))?;

        Ok(Profile {
            id: identity.id.clone(),
            email,
            picture,
            extra: identity.extra.clone(),
        })
    }
}
