mod bingo;
mod users;

use crate::account::{IdentityProfiles, ProfileLookup};
use crate::broadcast::Hub;
use crate::hooks::{ConnectionHooks, NoHooks};
use crate::identity::{IdentityVerifier, UnconfiguredVerifier};
use crate::types::*;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Registry settings
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Oldest bingo entries are evicted past this many (None = unbounded)
    pub bingo_history_limit: Option<usize>,
}

impl RegistryConfig {
    /// Load from BINGO_HISTORY_LIMIT
    pub fn from_env() -> Self {
        let bingo_history_limit = std::env::var("BINGO_HISTORY_LIMIT")
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|limit| *limit > 0);

        match bingo_history_limit {
            Some(limit) => tracing::info!(limit, "Bingo history capped"),
            None => tracing::info!("Bingo history unbounded"),
        }

        Self {
            bingo_history_limit,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Last-known public info per user id
    pub users: Arc<RwLock<HashMap<UserId, UserInfo>>>,
    /// Posted bingo boards, oldest first
    pub bingos: Arc<RwLock<VecDeque<BingoEntry>>>,
    pub hub: Hub,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub accounts: Arc<dyn ProfileLookup>,
    pub hooks: Arc<dyn ConnectionHooks>,
    pub registry_config: RegistryConfig,
    /// Upper bound for the whole authenticate flow
    pub auth_timeout: Duration,
}

impl AppState {
    pub fn new(verifier: Box<dyn IdentityVerifier>, accounts: Box<dyn ProfileLookup>) -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            bingos: Arc::new(RwLock::new(VecDeque::new())),
            hub: Hub::new(),
            verifier: Arc::from(verifier),
            accounts: Arc::from(accounts),
            hooks: Arc::new(NoHooks),
            registry_config: RegistryConfig::default(),
            auth_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_hooks(mut self, hooks: Box<dyn ConnectionHooks>) -> Self {
        self.hooks = Arc::from(hooks);
        self
    }

    pub fn with_registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = config;
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }
}

impl Default for AppState {
    /// No identity provider: every authenticate fails, `set:user` still works
    fn default() -> Self {
        Self::new(Box::new(UnconfiguredVerifier), Box::new(IdentityProfiles))
    }
}
