use serde::Serialize;
use strum_macros::Display;

use crate::config::GameRoutes;
use crate::session::ClientRole;
use crate::shared::AppError;

/// Which page a client is currently showing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ClientView {
    Lobby,
    Game,
}

/// Where a client should go to play, and what it carries there
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationIntent {
    pub url: String,
    pub room_id: String,
    pub role: ClientRole,
}

impl NavigationIntent {
    pub fn for_room(
        routes: &GameRoutes,
        game_type: Option<&str>,
        room_id: &str,
        role: ClientRole,
    ) -> Result<Self, AppError> {
        let game_type = game_type
            .ok_or_else(|| AppError::Validation("Room has no game selected".to_string()))?;
        let url = routes
            .url_for(game_type)
            .ok_or_else(|| AppError::Validation(format!("No view for game type: {game_type}")))?;

        Ok(Self {
            url: url.to_string(),
            room_id: room_id.to_string(),
            role,
        })
    }
}
