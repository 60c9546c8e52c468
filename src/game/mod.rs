// Game engine seam
//
// Each mini-game plugs into a room session through a GameAdapter. The session
// calls the adapter; the engine answers through an EngineReporter.

// Public API
pub use adapter::{EngineEvent, EngineReporter, GameAdapter};
pub use arithmetic::{generate_questions, ArithmeticDrill, DrillConfig, Operation, Question};
pub use bridge::{start_engine, GameAdapterBridge, WaitingIndicator};

// Internal modules
mod adapter;
mod arithmetic;
mod bridge;
