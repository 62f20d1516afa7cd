use super::AppState;
use crate::types::*;
use std::collections::HashMap;

impl AppState {
    /// Store a user under its id, returning whatever was there before
    pub async fn upsert_user(&self, user: UserInfo) -> Option<UserInfo> {
        self.users.write().await.insert(user.id.clone(), user)
    }

    pub async fn remove_user(&self, user_id: &str) -> Option<UserInfo> {
        self.users.write().await.remove(user_id)
    }

    #[cfg(test)]
    pub(crate) async fn get_user(&self, user_id: &str) -> Option<UserInfo> {
        self.users.read().await.get(user_id).cloned()
    }

    /// Full copy of the registry, sent to new connections
    pub async fn users_snapshot(&self) -> HashMap<UserId, UserInfo> {
        self.users.read().await.clone()
    }
}
