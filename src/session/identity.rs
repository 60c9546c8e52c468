use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    generators::{DefaultUuidGenerator, PetNameUsernameGenerator, UsernameGenerator, UuidGenerator},
    token::TokenConfig,
    types::Identity,
};
use crate::shared::AppError;

/// Hands out and restores anonymous player identities
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Issues a fresh identity with a generated display name
    async fn issue(&self) -> Result<Identity, AppError>;

    /// Restores the identity a token was issued for
    async fn resume(&self, token: &str) -> Result<Identity, AppError>;
}

/// Anonymous identities backed by signed tokens; nothing is stored server-side
pub struct AnonymousIdentityProvider {
    uuid_generator: Arc<dyn UuidGenerator>,
    username_generator: Arc<dyn UsernameGenerator>,
    tokens: TokenConfig,
}

impl AnonymousIdentityProvider {
    pub fn new(tokens: TokenConfig) -> Self {
        Self::with_generators(
            Arc::new(DefaultUuidGenerator::new()),
            Arc::new(PetNameUsernameGenerator::new()),
            tokens,
        )
    }

    pub fn with_generators(
        uuid_generator: Arc<dyn UuidGenerator>,
        username_generator: Arc<dyn UsernameGenerator>,
        tokens: TokenConfig,
    ) -> Self {
        Self {
            uuid_generator,
            username_generator,
            tokens,
        }
    }
}

impl Default for AnonymousIdentityProvider {
    fn default() -> Self {
        Self::new(TokenConfig::new())
    }
}

#[async_trait]
impl IdentityProvider for AnonymousIdentityProvider {
    #[instrument(skip(self))]
    async fn issue(&self) -> Result<Identity, AppError> {
        let session_id = self.uuid_generator.generate().await;
        let display_name = self.username_generator.generate().await;
        let token = self
            .tokens
            .sign(session_id.clone(), display_name.clone())?;

        info!(session_id = %session_id, display_name = %display_name, "Identity issued");
        Ok(Identity {
            session_id,
            display_name,
            token,
        })
    }

    #[instrument(skip(self, token))]
    async fn resume(&self, token: &str) -> Result<Identity, AppError> {
        let claims = self
            .tokens
            .verify(token)
            .map_err(|e| AppError::Unauthorized(e.to_string()))?;

        info!(session_id = %claims.session_id, "Identity resumed");
        Ok(Identity {
            session_id: claims.session_id,
            display_name: claims.display_name,
            token: token.to_string(),
        })
    }
}
