// Public API
pub use protocol::ContentProtocol;
pub use types::{ContentCardinality, PreparedContent, WaitOptions};

// Internal modules
mod protocol;
mod types;
