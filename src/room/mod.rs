// Public API - what other modules can use
pub use handlers::{get_leaderboard, get_room, list_rooms};
pub use registry::RoomRegistry;

// Internal modules
pub mod cleanup_task;
pub mod code;
mod handlers;
pub mod models;
pub mod presence;
pub mod registry;
pub mod repository;
pub mod types;
