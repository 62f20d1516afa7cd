//! Connection lifecycle and event dispatch
//!
//! Everything here works on a [`Session`] and the shared [`AppState`], so the
//! socket loop in `ws::mod` stays a thin transport shim. Messages meant for
//! the calling connection only are returned and then queued with [`reply`];
//! room and global traffic goes through the hub directly.

use crate::account::AccountError;
use crate::broadcast::{ConnectionReceiver, DeliveryError};
use crate::hooks::HookError;
use crate::identity::IdentityError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::*;
use std::sync::Arc;
use std::time::Duration;

pub const CONNECTED_MESSAGE: &str = "Successfully Connected";

/// Per-connection state owned by the socket task
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: ConnectionId,
    /// Attached after authenticate or set:user
    pub user: Option<UserInfo>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Authentication timed out after {0:?}")]
    Timeout(Duration),
}

/// Register a new connection: handshake, join the general room, send snapshots
pub async fn on_connect(state: &Arc<AppState>) -> (Session, ConnectionReceiver) {
    let (connection_id, rx) = state.hub.register().await;

    let handshake = ServerMessage::Connected {
        socket: connection_id.clone(),
        message: CONNECTED_MESSAGE.to_string(),
    };
    if let Err(e) = state.hub.emit(&connection_id, handshake).await {
        tracing::warn!(connection_id = %connection_id, "Failed to queue handshake: {}", e);
    }

    if let Err(e) = state.hub.join(&connection_id, GENERAL_ROOM).await {
        tracing::warn!(connection_id = %connection_id, "Failed to join general room: {}", e);
    }

    let users = ServerMessage::SetUsers(state.users_snapshot().await);
    let bingos = ServerMessage::SetBingos(state.bingos_snapshot().await);
    for msg in [users, bingos] {
        if let Err(e) = state.hub.emit(&connection_id, msg).await {
            tracing::warn!(connection_id = %connection_id, "Failed to queue snapshot: {}", e);
        }
    }

    let general_members = state.hub.room_size(GENERAL_ROOM).await;
    tracing::info!(
        connection_id = %connection_id,
        general_members = general_members,
        "Connection established"
    );

    (
        Session {
            connection_id,
            user: None,
        },
        rx,
    )
}

/// Queue a caller-only reply behind whatever the hub already queued for this
/// connection, so replies never overtake earlier broadcasts
pub async fn reply(state: &Arc<AppState>, session: &Session, msg: ServerMessage) {
    if let Err(e) = state.hub.emit(&session.connection_id, msg).await {
        tracing::warn!(connection_id = %session.connection_id, "Failed to queue reply: {}", e);
    }
}

/// Handle a client event and return an optional reply for the caller only
pub async fn handle_message(
    msg: ClientMessage,
    session: &mut Session,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Authenticate(token) => authenticate(state, session, &token).await,
        ClientMessage::Bingo(board) => {
            handle_bingo(state, session, board).await;
            None
        }
        ClientMessage::SetUser(user) => {
            handle_set_user(state, session, user).await;
            None
        }
    }
}

/// Verify the token, look up the profile and attach the reduced profile.
///
/// Replies `authenticated` on success and `error` on any failure; the
/// `UserConnected` announcement goes to every connected client.
pub async fn authenticate(
    state: &Arc<AppState>,
    session: &mut Session,
    bearer_token: &str,
) -> Option<ServerMessage> {
    tracing::info!(connection_id = %session.connection_id, "Authentication requested");

    let result = match tokio::time::timeout(
        state.auth_timeout,
        resolve_user(state, &session.connection_id, bearer_token),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(AuthError::Timeout(state.auth_timeout)),
    };

    let user = match result {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(
                connection_id = %session.connection_id,
                "Authentication failed: {}",
                e
            );
            return Some(ServerMessage::error("AUTH_FAILED", e.to_string()));
        }
    };

    // Switching identities on one connection releases the old user and its room
    if session.user.as_ref().is_some_and(|old| old.id != user.id) {
        detach_user(state, session, Some(&user.id)).await;
    }

    session.user = Some(user.clone());
    state.upsert_user(user.clone()).await;

    tracing::info!(
        connection_id = %session.connection_id,
        user_id = %user.id,
        "Connection authenticated"
    );

    state
        .hub
        .emit_all(ServerMessage::UserConnected(user.id.clone()))
        .await;

    Some(ServerMessage::Authenticated(user))
}

async fn resolve_user(
    state: &Arc<AppState>,
    connection_id: &ConnectionId,
    bearer_token: &str,
) -> Result<UserInfo, AuthError> {
    let identity = state.verifier.verify(bearer_token).await?;
    let profile = state.accounts.get_account(&identity).await?;
    let user = UserInfo::from(&profile);

    state
        .hooks
        .attach(&state.hub, connection_id, &identity, &user)
        .await?;
    state.hub.join(connection_id, &user.id).await?;

    Ok(user)
}

/// Record a bingo for the attached user and announce it to the general room
pub async fn handle_bingo(state: &Arc<AppState>, session: &Session, board: serde_json::Value) {
    let Some(user) = session.user.clone() else {
        tracing::debug!(
            connection_id = %session.connection_id,
            "Ignoring bingo from unauthenticated connection"
        );
        return;
    };

    let entry = state.add_bingo(board, user).await;
    tracing::info!(bingo_id = %entry.id, user_id = %entry.user.id, "Bingo posted");
    state
        .hub
        .message_room(GENERAL_ROOM, ServerMessage::Bingo(entry))
        .await;
}

/// Replace the attached user, announcing the old one as gone first
pub async fn handle_set_user(state: &Arc<AppState>, session: &mut Session, user: Option<UserInfo>) {
    let Some(user) = user else {
        tracing::debug!(connection_id = %session.connection_id, "Ignoring empty set:user");
        return;
    };

    detach_user(state, session, Some(&user.id)).await;

    session.user = Some(user.clone());
    state.upsert_user(user.clone()).await;
    tracing::info!(
        connection_id = %session.connection_id,
        user_id = %user.id,
        "User attached"
    );
    state
        .hub
        .message_room(GENERAL_ROOM, ServerMessage::UserJoined(user))
        .await;
}

/// Drop the connection from the hub and release its user
pub async fn on_disconnect(state: &Arc<AppState>, session: &mut Session) {
    state.hub.unregister(&session.connection_id).await;
    detach_user(state, session, None).await;
    let remaining = state.hub.connection_count().await;
    tracing::info!(
        connection_id = %session.connection_id,
        remaining = remaining,
        "Connection closed"
    );
}

/// Remove the attached user from the registry and tell the general room.
/// The connection leaves the old user's room unless `next_user_id` is the
/// same user. No-op without an attached user.
async fn detach_user(state: &Arc<AppState>, session: &mut Session, next_user_id: Option<&str>) {
    let Some(old) = session.user.take() else {
        return;
    };

    if next_user_id != Some(old.id.as_str()) {
        state.hub.leave(&session.connection_id, &old.id).await;
    }

    if state.remove_user(&old.id).await.is_none() {
        tracing::debug!(user_id = %old.id, "User was already gone from the registry");
    }
    state
        .hub
        .message_room(GENERAL_ROOM, ServerMessage::UserLeft(old))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(id: &str) -> UserInfo {
        UserInfo {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            picture: format!("https://example.com/{}.png", id),
        }
    }

    fn drain(rx: &mut ConnectionReceiver) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_connect_sends_handshake_and_snapshots() {
        let state = Arc::new(AppState::default());
        let (session, mut rx) = on_connect(&state).await;

        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 3);
        assert_eq!(
            msgs[0],
            ServerMessage::Connected {
                socket: session.connection_id.clone(),
                message: CONNECTED_MESSAGE.to_string(),
            }
        );
        assert!(matches!(&msgs[1], ServerMessage::SetUsers(u) if u.is_empty()));
        assert!(matches!(&msgs[2], ServerMessage::SetBingos(b) if b.is_empty()));
        assert!(state.hub.is_in_room(&session.connection_id, GENERAL_ROOM).await);
        assert!(session.user.is_none());
    }

    #[tokio::test]
    async fn test_reply_queues_behind_earlier_broadcasts() {
        let state = Arc::new(AppState::default());
        let (session, mut rx) = on_connect(&state).await;
        drain(&mut rx);

        state
            .hub
            .message_room(GENERAL_ROOM, ServerMessage::UserJoined(user("u1")))
            .await;
        reply(&state, &session, ServerMessage::error("PARSE_ERROR", "bad frame")).await;

        assert_eq!(
            drain(&mut rx),
            vec![
                ServerMessage::UserJoined(user("u1")),
                ServerMessage::error("PARSE_ERROR", "bad frame"),
            ]
        );
    }

    #[tokio::test]
    async fn test_set_user_leaves_previous_user_room() {
        let state = Arc::new(AppState::default());
        let (mut session, _rx) = on_connect(&state).await;
        handle_set_user(&state, &mut session, Some(user("u1"))).await;
        state.hub.join(&session.connection_id, "u1").await.unwrap();

        // Same user again keeps the room
        handle_set_user(&state, &mut session, Some(user("u1"))).await;
        assert!(state.hub.is_in_room(&session.connection_id, "u1").await);

        handle_set_user(&state, &mut session, Some(user("u2"))).await;
        assert!(!state.hub.is_in_room(&session.connection_id, "u1").await);
        assert!(state.get_user("u1").await.is_none());
    }

    #[tokio::test]
    async fn test_bingo_ignored_without_user() {
        let state = Arc::new(AppState::default());
        let (mut session, mut rx) = on_connect(&state).await;
        drain(&mut rx);

        let reply = handle_message(ClientMessage::Bingo(json!([1])), &mut session, &state).await;
        assert!(reply.is_none());
        assert_eq!(state.bingo_count().await, 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_set_user_null_is_noop() {
        let state = Arc::new(AppState::default());
        let (mut session, mut rx) = on_connect(&state).await;
        drain(&mut rx);

        handle_set_user(&state, &mut session, None).await;
        assert!(session.user.is_none());
        assert!(state.users_snapshot().await.is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_set_user_then_bingo() {
        let state = Arc::new(AppState::default());
        let (mut session, mut rx) = on_connect(&state).await;
        drain(&mut rx);

        handle_set_user(&state, &mut session, Some(user("u1"))).await;
        handle_bingo(&state, &session, json!({"board": [1, 2, 3]})).await;

        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0], ServerMessage::UserJoined(user("u1")));
        match &msgs[1] {
            ServerMessage::Bingo(entry) => {
                assert!(entry.id.starts_with("u1::"));
                assert_eq!(entry.user, user("u1"));
            }
            other => panic!("Expected bingo, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_without_user_is_silent() {
        let state = Arc::new(AppState::default());
        let (_observer, mut observer_rx) = on_connect(&state).await;
        let (mut session, _rx) = on_connect(&state).await;
        drain(&mut observer_rx);

        on_disconnect(&state, &mut session).await;
        assert!(drain(&mut observer_rx).is_empty());
        assert_eq!(state.hub.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_disconnect_releases_user() {
        let state = Arc::new(AppState::default());
        let (_observer, mut observer_rx) = on_connect(&state).await;
        let (mut session, _rx) = on_connect(&state).await;
        handle_set_user(&state, &mut session, Some(user("u1"))).await;
        drain(&mut observer_rx);

        on_disconnect(&state, &mut session).await;
        assert_eq!(drain(&mut observer_rx), vec![ServerMessage::UserLeft(user("u1"))]);
        assert!(state.get_user("u1").await.is_none());
        assert!(session.user.is_none());
    }

    #[tokio::test]
    async fn test_authenticate_without_provider_replies_error() {
        let state = Arc::new(AppState::default());
        let (mut session, mut rx) = on_connect(&state).await;
        drain(&mut rx);

        let reply = authenticate(&state, &mut session, "token").await;
        match reply {
            Some(ServerMessage::Error { code, msg }) => {
                assert_eq!(code, "AUTH_FAILED");
                assert!(msg.contains("not configured"));
            }
            other => panic!("Expected error, got {:?}", other),
        }
        assert!(session.user.is_none());
        assert!(drain(&mut rx).is_empty());
    }
}
