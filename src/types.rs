use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque ID types for type safety
pub type UserId = String;
pub type ConnectionId = String;
pub type BingoId = String;

/// Room every connection joins on connect
pub const GENERAL_ROOM: &str = "general";

/// Public user info attached to a connection and stored in the registry.
///
/// Only these three fields ever leave the server; everything else the
/// account service knows about a user is stripped before use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserInfo {
    pub id: UserId,
    pub email: String,
    pub picture: String,
}

/// Identity returned by the identity provider for a bearer token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerifiedIdentity {
    /// OIDC providers call this `sub`
    #[serde(alias = "sub")]
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Full account record from the account service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: UserId,
    pub email: String,
    pub picture: String,
    /// Any other account fields (name, created_at, ...)
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl From<&Profile> for UserInfo {
    fn from(p: &Profile) -> Self {
        Self {
            id: p.id.clone(),
            email: p.email.clone(),
            picture: p.picture.clone(),
        }
    }
}

/// A posted bingo board
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BingoEntry {
    /// Client-supplied board, stored as-is
    pub board: serde_json::Value,
    pub user: UserInfo,
    /// `<user id>::<ulid>`
    pub id: BingoId,
}

impl BingoEntry {
    pub fn new(board: serde_json::Value, user: UserInfo) -> Self {
        let id = format!("{}::{}", user.id, ulid::Ulid::new());
        Self { board, user, id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_strips_extra_fields() {
        let profile: Profile = serde_json::from_value(json!({
            "id": "u1",
            "email": "u1@example.com",
            "picture": "https://example.com/u1.png",
            "name": "User One",
            "subs": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(profile.extra.len(), 2);

        let info = UserInfo::from(&profile);
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "u1",
                "email": "u1@example.com",
                "picture": "https://example.com/u1.png"
            })
        );
    }

    #[test]
    fn test_profile_requires_core_fields() {
        let result = serde_json::from_value::<Profile>(json!({
            "id": "u1",
            "email": "u1@example.com"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_identity_accepts_sub() {
        let identity: VerifiedIdentity = serde_json::from_value(json!({
            "sub": "auth0|123",
            "email": "a@b.c",
            "nickname": "abc"
        }))
        .unwrap();
        assert_eq!(identity.id, "auth0|123");
        assert_eq!(identity.email.as_deref(), Some("a@b.c"));
        assert!(identity.picture.is_none());
        assert!(identity.extra.contains_key("nickname"));
    }

    #[test]
    fn test_bingo_ids_are_prefixed_and_unique() {
        let user = UserInfo {
            id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            picture: "p".to_string(),
        };
        let a = BingoEntry::new(json!([1, 2, 3]), user.clone());
        let b = BingoEntry::new(json!([1, 2, 3]), user);
        assert!(a.id.starts_with("u1::"));
        assert!(b.id.starts_with("u1::"));
        assert_ne!(a.id, b.id);
    }
}
