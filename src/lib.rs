// Library crate for the room synchronization core
// This file exposes the public API for integration tests and the inspector binary

pub mod config;
pub mod content;
pub mod controller;
pub mod event;
pub mod game;
pub mod results;
pub mod room;
pub mod session;
pub mod shared;
pub mod store;

// Re-export commonly used types for easier access in tests
pub use config::{GameRoutes, SyncConfig};
pub use content::{ContentCardinality, PreparedContent, WaitOptions};
pub use controller::{CompletionPolicy, RoomSessionController};
pub use event::{EventBus, RoomEvent};
pub use game::{ArithmeticDrill, GameAdapter};
pub use results::{ExitOutcome, Leaderboard};
pub use room::{models::Room, repository::RoomRepository, RoomRegistry};
pub use session::{AnonymousIdentityProvider, Identity, IdentityProvider};
pub use shared::AppError;
pub use store::{InMemoryRealtimeStore, RealtimeStore};
