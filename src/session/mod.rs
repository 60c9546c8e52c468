// Public API - what other modules can use
pub use generators::{DefaultUuidGenerator, PetNameUsernameGenerator, UsernameGenerator, UuidGenerator};
pub use identity::{AnonymousIdentityProvider, IdentityProvider};
pub use storage::{ClientStorage, InMemoryClientStorage};
pub use token::TokenConfig;
pub use types::{ClientRole, Identity, SessionClaims, StoredSession};

// Internal modules
mod generators;
mod identity;
mod storage;
mod token;
mod types;
