//! Per-connection setup run after a successful authentication.
//!
//! Deployments that route their own custom events through an authenticated
//! connection plug in here. The default does nothing.

use crate::broadcast::Hub;
use crate::types::{ConnectionId, UserInfo, VerifiedIdentity};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
#[error("Connection setup failed: {0}")]
pub struct HookError(pub String);

#[async_trait]
pub trait ConnectionHooks: Send + Sync {
    async fn attach(
        &self,
        hub: &Hub,
        connection_id: &ConnectionId,
        identity: &VerifiedIdentity,
        user: &UserInfo,
    ) -> Result<(), HookError>;
}

pub struct NoHooks;

#[async_trait]
impl ConnectionHooks for NoHooks {
    async fn attach(
        &self,
        _hub: &Hub,
        _connection_id: &ConnectionId,
        _identity: &VerifiedIdentity,
        _user: &UserInfo,
    ) -> Result<(), HookError> {
        Ok(())
    }
}
