#![allow(dead_code)] // Test utilities may not all be used in every test

use std::sync::Arc;
use std::time::Duration;

use roomsync::{
    controller::CompletionPolicy,
    room::{models::Room, presence::DisconnectMode, types::CreateRoomRequest},
    session::{AnonymousIdentityProvider, Identity, IdentityProvider, InMemoryClientStorage, TokenConfig},
    store::path,
    ContentCardinality, InMemoryRealtimeStore, RealtimeStore, RoomSessionController, SyncConfig,
};

use super::mocks::MockGameAdapter;

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub store: Arc<InMemoryRealtimeStore>,
    pub config: Arc<SyncConfig>,
    provider: AnonymousIdentityProvider,
}

/// One simulated browser tab
pub struct TestClient {
    pub controller: RoomSessionController,
    pub adapter: Arc<MockGameAdapter>,
    pub storage: Arc<InMemoryClientStorage>,
}

impl TestClient {
    pub fn id(&self) -> &str {
        self.controller.session_id()
    }

    pub fn identity(&self) -> Identity {
        self.controller.identity().clone()
    }
}

pub struct TestSetupBuilder {
    config: SyncConfig,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig {
                closed_grace: Duration::from_millis(50),
                ended_room_ttl: Duration::from_millis(200),
                content_wait_timeout: Some(Duration::from_secs(5)),
                ..SyncConfig::default()
            },
        }
    }

    pub fn with_cardinality(mut self, cardinality: ContentCardinality) -> Self {
        self.config.content_cardinality = cardinality;
        self
    }

    pub fn with_completion_policy(mut self, policy: CompletionPolicy) -> Self {
        self.config.completion_policy = policy;
        self
    }

    pub fn with_disconnect_mode(mut self, mode: DisconnectMode) -> Self {
        self.config.disconnect_mode = mode;
        self
    }

    pub fn build(self) -> TestSetup {
        TestSetup {
            store: Arc::new(InMemoryRealtimeStore::new()),
            config: Arc::new(self.config),
            provider: AnonymousIdentityProvider::new(TokenConfig::with_secret("test-secret", 1)),
        }
    }
}

impl TestSetup {
    pub fn provider(&self) -> &AnonymousIdentityProvider {
        &self.provider
    }

    pub fn dyn_store(&self) -> Arc<dyn RealtimeStore> {
        self.store.clone()
    }

    /// A new tab with a fresh identity
    pub async fn client(&self) -> TestClient {
        let identity = self.provider.issue().await.unwrap();
        self.client_with(identity, Arc::new(InMemoryClientStorage::new()))
            .await
    }

    /// A new tab reusing an identity and its session storage, as after a page load
    pub async fn client_with(
        &self,
        identity: Identity,
        storage: Arc<InMemoryClientStorage>,
    ) -> TestClient {
        let adapter = Arc::new(MockGameAdapter::new());
        let controller = RoomSessionController::builder(identity, self.dyn_store())
            .with_config(Arc::clone(&self.config))
            .with_adapter(adapter.clone())
            .with_storage(storage.clone())
            .build()
            .await
            .unwrap();
        TestClient {
            controller,
            adapter,
            storage,
        }
    }

    /// A host with a `math` room plus `players` joined players
    pub async fn room_with_players(&self, players: usize) -> (TestClient, Vec<TestClient>, String) {
        let host = self.client().await;
        let snapshot = host
            .controller
            .create_room(CreateRoomRequest::new("math", "Hana"))
            .await
            .unwrap();

        let mut joined = Vec::with_capacity(players);
        for index in 0..players {
            // distinct join timestamps keep the join order deterministic
            tokio::time::sleep(Duration::from_millis(2)).await;
            let player = self.client().await;
            player
                .controller
                .join_room(&snapshot.room_id, &format!("Player {}", index + 1))
                .await
                .unwrap();
            joined.push(player);
        }
        (host, joined, snapshot.room_id)
    }

    pub async fn room(&self, room_id: &str) -> Option<Room> {
        self.store
            .get(&path::room(room_id))
            .await
            .unwrap()
            .map(|value| serde_json::from_value(value).unwrap())
    }
}
