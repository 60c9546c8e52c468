use async_trait::async_trait;
use std::sync::Mutex;
use tracing::debug;

use super::types::StoredSession;
use crate::shared::AppError;

/// Per-tab storage that survives a page navigation but not the tab
#[async_trait]
pub trait ClientStorage: Send + Sync {
    async fn load(&self) -> Result<Option<StoredSession>, AppError>;
    async fn save(&self, session: StoredSession) -> Result<(), AppError>;
    async fn clear(&self) -> Result<(), AppError>;
}

/// In-memory implementation of ClientStorage for development and testing
#[derive(Default)]
pub struct InMemoryClientStorage {
    entry: Mutex<Option<StoredSession>>,
}

impl InMemoryClientStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<StoredSession>>, AppError> {
        self.entry
            .lock()
            .map_err(|_| AppError::Internal)
    }
}

#[async_trait]
impl ClientStorage for InMemoryClientStorage {
    async fn load(&self) -> Result<Option<StoredSession>, AppError> {
        Ok(self.lock()?.clone())
    }

    async fn save(&self, session: StoredSession) -> Result<(), AppError> {
        debug!(room_id = %session.room_id, role = %session.role, "Client session saved");
        *self.lock()? = Some(session);
        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        if self.lock()?.take().is_some() {
            debug!("Client session cleared");
        }
        Ok(())
    }
}
