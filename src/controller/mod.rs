// Per-client room session
//
// Drives one client's membership in one room: the status state machine,
// host-only actions, navigation hand-off and the glue between room events,
// presence and the game adapter.

// Public API - what other modules can use
pub use navigation::{ClientView, NavigationIntent};
pub use room_session::{
    restore_identity, RoomSessionController, SessionControllerBuilder, SessionInfo,
    WeakSessionController,
};
pub use router::SessionEventRouter;
pub use state_machine::CompletionPolicy;

// Internal modules
mod navigation;
mod room_session;
mod router;
mod state_machine;
