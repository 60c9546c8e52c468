pub mod assertions;
pub mod mocks;
pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use assertions::{eventually, next_event_matching, wait_for_room, wait_for_room_deleted, TIMEOUT};
#[allow(unused_imports)]
pub use mocks::MockGameAdapter;
#[allow(unused_imports)]
pub use setup::{TestClient, TestSetup, TestSetupBuilder};
