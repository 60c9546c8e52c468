// Realtime store abstraction
//
// The shared tree-structured key-value store every client reads and writes.
// Room records live under `rooms/{roomId}` and the tree itself is the wire
// protocol between clients.

// Public API - what other modules can use
pub use repository::{InMemoryRealtimeStore, RealtimeStore};
pub use types::{
    ConnectionId, DisconnectAction, StoreSubscription, TransactionDecision, TransactionOutcome,
    WriteBatch,
};

// Internal modules
pub mod path;
mod repository;
mod types;
