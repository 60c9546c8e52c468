//! Path builders for the room tree.

pub const ROOMS: &str = "rooms";

pub fn room(room_id: &str) -> String {
    format!("{ROOMS}/{room_id}")
}

pub fn meta(room_id: &str) -> String {
    format!("{ROOMS}/{room_id}/meta")
}

pub fn meta_field(room_id: &str, field: &str) -> String {
    format!("{ROOMS}/{room_id}/meta/{field}")
}

pub fn player(room_id: &str, player_id: &str) -> String {
    format!("{ROOMS}/{room_id}/players/{player_id}")
}

pub fn player_field(room_id: &str, player_id: &str, field: &str) -> String {
    format!("{ROOMS}/{room_id}/players/{player_id}/{field}")
}

pub fn game_data(room_id: &str) -> String {
    format!("{ROOMS}/{room_id}/gameData")
}

pub fn result(room_id: &str, player_id: &str) -> String {
    format!("{ROOMS}/{room_id}/results/{player_id}")
}

/// Splits a path into its non-empty segments
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// True when one path is an ancestor of (or equal to) the other
pub fn overlaps(a: &str, b: &str) -> bool {
    let a = segments(a);
    let b = segments(b);
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}
