use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::{debug, instrument};

use super::types::SessionClaims;
use crate::config::env_parse;
use crate::shared::AppError;

const DEFAULT_LIFETIME_DAYS: i64 = 365;
const DEV_SECRET: &str = "roomsync-dev-secret";

/// Signs and checks the identity tokens kept in client storage.
///
/// The claims carry the whole identity, so a resume needs no server-side lookup.
#[derive(Clone)]
pub struct TokenConfig {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl TokenConfig {
    /// Reads `ROOMSYNC_TOKEN_SECRET` and `ROOMSYNC_TOKEN_DAYS`
    pub fn new() -> Self {
        let secret =
            std::env::var("ROOMSYNC_TOKEN_SECRET").unwrap_or_else(|_| DEV_SECRET.to_string());
        let lifetime_days = env_parse("ROOMSYNC_TOKEN_DAYS").unwrap_or(DEFAULT_LIFETIME_DAYS);
        Self::with_secret(secret, lifetime_days)
    }

    pub fn with_secret(secret: impl AsRef<[u8]>, lifetime_days: i64) -> Self {
        let secret = secret.as_ref();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            lifetime: Duration::days(lifetime_days),
        }
    }

    #[instrument(skip_all)]
    pub fn sign(&self, session_id: String, display_name: String) -> Result<String, AppError> {
        let issued_at = Utc::now();
        let claims = SessionClaims {
            session_id,
            display_name,
            iat: issued_at.timestamp() as usize,
            exp: (issued_at + self.lifetime).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::JwtError(e.to_string()))
    }

    /// Claims of an unexpired token signed with this secret
    #[instrument(skip_all)]
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AppError> {
        decode::<SessionClaims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Identity token rejected");
                AppError::JwtError(e.to_string())
            })
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed(config: &TokenConfig) -> String {
        config
            .sign("a1b2c3".to_string(), "lucky-marten".to_string())
            .unwrap()
    }

    #[test]
    fn test_claims_carry_the_identity() {
        let config = TokenConfig::with_secret("test-secret", 1);

        let claims = config.verify(&signed(&config)).unwrap();
        assert_eq!(claims.session_id, "a1b2c3");
        assert_eq!(claims.display_name, "lucky-marten");
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
    }

    #[test]
    fn test_foreign_and_garbled_tokens_rejected() {
        let config = TokenConfig::with_secret("test-secret", 1);
        let foreign = TokenConfig::with_secret("other-secret", 1);

        assert!(matches!(
            config.verify(&signed(&foreign)),
            Err(AppError::JwtError(_))
        ));
        assert!(matches!(config.verify("not-a-token"), Err(AppError::JwtError(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let config = TokenConfig::with_secret("test-secret", -2);
        assert!(config.verify(&signed(&config)).is_err());
    }
}
