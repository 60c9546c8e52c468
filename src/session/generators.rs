use async_trait::async_trait;
use uuid::Uuid;

/// Trait for generating anonymous session ids
#[async_trait]
pub trait UuidGenerator: Send + Sync {
    async fn generate(&self) -> String;
}

/// Random v4 UUIDs
pub struct DefaultUuidGenerator;

impl DefaultUuidGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DefaultUuidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UuidGenerator for DefaultUuidGenerator {
    async fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Trait for generating display names
#[async_trait]
pub trait UsernameGenerator: Send + Sync {
    async fn generate(&self) -> String;
}

/// Pet name-based display name generator
pub struct PetNameUsernameGenerator;

impl PetNameUsernameGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PetNameUsernameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsernameGenerator for PetNameUsernameGenerator {
    async fn generate(&self) -> String {
        petname::Petnames::default().generate_one(2, "-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_petname_username_generator() {
        let generator = PetNameUsernameGenerator::new();
        let username = generator.generate().await;

        let parts: Vec<&str> = username.split('-').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| !p.is_empty()));
    }

    #[tokio::test]
    async fn test_uuid_generator_is_unique() {
        let generator = DefaultUuidGenerator::new();
        let first = generator.generate().await;
        let second = generator.generate().await;

        assert_ne!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }
}
