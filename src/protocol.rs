//! Wire protocol
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": <payload>}`.

use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// Bearer token to verify with the identity provider
    #[serde(rename = "authenticate")]
    Authenticate(String),
    /// Client-supplied board, kept opaque
    #[serde(rename = "bingo")]
    Bingo(serde_json::Value),
    /// Replace the user attached to this connection; `null` is ignored
    #[serde(rename = "set:user")]
    SetUser(Option<UserInfo>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// Handshake acknowledgment
    #[serde(rename = "connected")]
    Connected {
        socket: ConnectionId,
        message: String,
    },
    /// Registry snapshot sent on connect
    #[serde(rename = "set:users")]
    SetUsers(HashMap<UserId, UserInfo>),
    /// Bingo list snapshot sent on connect
    #[serde(rename = "set:bingos")]
    SetBingos(Vec<BingoEntry>),
    /// Sent to the authenticating connection only
    #[serde(rename = "authenticated")]
    Authenticated(UserInfo),
    /// Sent to every connected client after a successful authenticate
    #[serde(rename = "UserConnected")]
    UserConnected(UserId),
    #[serde(rename = "bingo")]
    Bingo(BingoEntry),
    #[serde(rename = "user:connected")]
    UserJoined(UserInfo),
    #[serde(rename = "user:disconnected")]
    UserLeft(UserInfo),
    #[serde(rename = "error")]
    Error { code: String, msg: String },
}

impl ServerMessage {
    /// Event name as it appears on the wire, for log context
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::SetUsers(_) => "set:users",
            ServerMessage::SetBingos(_) => "set:bingos",
            ServerMessage::Authenticated(_) => "authenticated",
            ServerMessage::UserConnected(_) => "UserConnected",
            ServerMessage::Bingo(_) => "bingo",
            ServerMessage::UserJoined(_) => "user:connected",
            ServerMessage::UserLeft(_) => "user:disconnected",
            ServerMessage::Error { .. } => "error",
        }
    }

    pub fn error(code: &str, msg: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            msg: msg.into(),
        }
    }
}
