// Event-driven architecture components
//
// Store change notifications on a room are diffed into RoomEvents and fanned
// out per room to the handlers one client registers.

// Public API - what other modules can use
pub use bus::EventBus;
pub use events::RoomEvent;
pub use room_handler::{RoomEventError, RoomEventHandler};
pub use room_subscription::RoomSubscription;
pub use watcher::{diff_rooms, RoomWatcher};

// Internal modules
mod bus;
mod events;
mod room_handler;
mod room_subscription;
mod watcher;
