use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// JWT claims structure containing session information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    pub session_id: String,
    pub display_name: String,
    pub exp: usize, // Expiration timestamp (standard JWT claim)
    pub iat: usize, // Issued at timestamp (standard JWT claim)
}

/// An anonymous player identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Stable id used as the player key in every room
    pub session_id: String,
    pub display_name: String,
    /// Signed token that restores this identity after a navigation
    pub token: String,
}

/// The part a client plays in its current room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ClientRole {
    Host,
    Player,
}

/// Per-tab state carried across a page navigation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub room_id: String,
    pub role: ClientRole,
    pub player_name: String,
    pub identity_token: String,
}
