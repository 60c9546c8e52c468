use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::{
    navigation::{ClientView, NavigationIntent},
    router::SessionEventRouter,
};
use crate::config::SyncConfig;
use crate::content::{ContentCardinality, ContentProtocol, WaitOptions};
use crate::event::{EventBus, RoomEvent, RoomEventHandler, RoomSubscription, RoomWatcher};
use crate::game::{start_engine, GameAdapter, GameAdapterBridge, WaitingIndicator};
use crate::results::{
    ExitOutcome, Leaderboard, LeaderboardSubscriber, ResultAggregator, ResultInput, SubmitOutcome,
};
use crate::room::code::RoomCodeGenerator;
use crate::room::models::{ContentPayload, PlayerRecord, PlayerStatus, Room, RoomSnapshot, RoomStatus};
use crate::room::presence::PresenceTracker;
use crate::room::registry::{promote, require_host, validate_game_type, RoomRegistry};
use crate::room::repository::RoomRepository;
use crate::room::types::{CreateRoomRequest, LeaveOutcome};
use crate::session::{
    ClientRole, ClientStorage, Identity, IdentityProvider, InMemoryClientStorage, StoredSession,
};
use crate::shared::AppError;
use crate::store::{path, RealtimeStore, TransactionDecision};

/// What the client knows about the room it is in
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub room_id: String,
    pub role: ClientRole,
    pub player_name: String,
    pub view: ClientView,
}

struct ActiveRoom {
    info: SessionInfo,
    /// Watcher plus one subscription per handler
    tasks: Vec<JoinHandle<()>>,
    engine: Option<JoinHandle<()>>,
    /// Disconnect hooks and heartbeat are live
    armed: bool,
    leaderboard: watch::Receiver<Leaderboard>,
}

impl Drop for ActiveRoom {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        if let Some(engine) = &self.engine {
            engine.abort();
        }
    }
}

struct ControllerInner {
    identity: Identity,
    config: Arc<SyncConfig>,
    store: Arc<dyn RealtimeStore>,
    repository: RoomRepository,
    registry: RoomRegistry,
    content: ContentProtocol,
    results: ResultAggregator,
    presence: PresenceTracker,
    storage: Arc<dyn ClientStorage>,
    adapter: Option<Arc<dyn GameAdapter>>,
    bus: EventBus,
    session: Mutex<Option<ActiveRoom>>,
}

/// One client's view of one room: membership, presence, content and results.
///
/// Every UI action goes through a method here; every change another client
/// makes arrives as a [`RoomEvent`] on [`RoomSessionController::events`].
#[derive(Clone)]
pub struct RoomSessionController {
    inner: Arc<ControllerInner>,
}

/// Non-owning handle used by background tasks
#[derive(Clone)]
pub struct WeakSessionController {
    inner: Weak<ControllerInner>,
}

impl WeakSessionController {
    pub fn upgrade(&self) -> Option<RoomSessionController> {
        self.inner
            .upgrade()
            .map(|inner| RoomSessionController { inner })
    }
}

pub struct SessionControllerBuilder {
    identity: Identity,
    store: Arc<dyn RealtimeStore>,
    config: Arc<SyncConfig>,
    adapter: Option<Arc<dyn GameAdapter>>,
    storage: Option<Arc<dyn ClientStorage>>,
    codes: Option<Arc<dyn RoomCodeGenerator>>,
}

impl SessionControllerBuilder {
    pub fn with_config(mut self, config: Arc<SyncConfig>) -> Self {
        self.config = config;
        self
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn GameAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn ClientStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_code_generator(mut self, codes: Arc<dyn RoomCodeGenerator>) -> Self {
        self.codes = Some(codes);
        self
    }

    /// Opens the store connection presence hooks are tied to
    pub async fn build(self) -> Result<RoomSessionController, AppError> {
        let repository = RoomRepository::new(Arc::clone(&self.store));
        let registry = match self.codes {
            Some(codes) => {
                RoomRegistry::with_code_generator(repository.clone(), Arc::clone(&self.config), codes)
            }
            None => RoomRegistry::new(repository.clone(), Arc::clone(&self.config)),
        };
        let presence =
            PresenceTracker::connect(Arc::clone(&self.store), self.config.disconnect_mode).await?;

        info!(
            session_id = %self.identity.session_id,
            connection = %presence.connection(),
            "Room session controller ready"
        );

        Ok(RoomSessionController {
            inner: Arc::new(ControllerInner {
                content: ContentProtocol::new(repository.clone(), Arc::clone(&self.config)),
                results: ResultAggregator::new(repository.clone(), self.config.completion_policy),
                bus: EventBus::with_capacity(self.config.event_channel_capacity),
                storage: self
                    .storage
                    .unwrap_or_else(|| Arc::new(InMemoryClientStorage::new())),
                identity: self.identity,
                config: self.config,
                store: self.store,
                repository,
                registry,
                presence,
                adapter: self.adapter,
                session: Mutex::new(None),
            }),
        })
    }
}

/// Resumes the identity saved in client storage, or issues a fresh one
pub async fn restore_identity(
    provider: &dyn IdentityProvider,
    storage: &dyn ClientStorage,
) -> Result<Identity, AppError> {
    if let Some(stored) = storage.load().await? {
        match provider.resume(&stored.identity_token).await {
            Ok(identity) => return Ok(identity),
            Err(e) => {
                warn!(error = %e, "Stored identity rejected, issuing a new one");
                storage.clear().await?;
            }
        }
    }
    provider.issue().await
}

impl RoomSessionController {
    pub fn builder(identity: Identity, store: Arc<dyn RealtimeStore>) -> SessionControllerBuilder {
        SessionControllerBuilder {
            identity,
            store,
            config: Arc::new(SyncConfig::default()),
            adapter: None,
            storage: None,
            codes: None,
        }
    }

    pub fn downgrade(&self) -> WeakSessionController {
        WeakSessionController {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.identity.session_id
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.inner.presence
    }

    pub(crate) fn event_bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub async fn active_room(&self) -> Option<SessionInfo> {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|active| active.info.clone())
    }

    pub async fn room_id(&self) -> Option<String> {
        self.active_room().await.map(|info| info.room_id)
    }

    pub async fn role(&self) -> Option<ClientRole> {
        self.active_room().await.map(|info| info.role)
    }

    /// Latest stored record of the current room
    pub async fn room_snapshot(&self) -> Result<Option<Room>, AppError> {
        let info = self.require_room().await?;
        self.inner.registry.get_room(&info.room_id).await
    }

    /// Events of the current room from now on
    pub async fn events(&self) -> Result<broadcast::Receiver<RoomEvent>, AppError> {
        let info = self.require_room().await?;
        Ok(self.inner.bus.subscribe_to_room(&info.room_id).await)
    }

    /// Live leaderboard of the current room
    pub async fn leaderboard(&self) -> Option<watch::Receiver<Leaderboard>> {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|active| active.leaderboard.clone())
    }

    #[instrument(skip(self, request), fields(session_id = %self.session_id()))]
    pub async fn create_room(&self, request: CreateRoomRequest) -> Result<RoomSnapshot, AppError> {
        self.ensure_idle().await?;
        let snapshot = self
            .inner
            .registry
            .create_room(self.session_id(), request)
            .await?;

        let name = snapshot
            .room
            .player(self.session_id())
            .map(|p| p.name.clone())
            .unwrap_or_default();
        self.attach(&snapshot.room_id, ClientRole::Host, name, ClientView::Lobby)
            .await?;
        Ok(snapshot)
    }

    #[instrument(skip(self), fields(session_id = %self.session_id()))]
    pub async fn join_room(
        &self,
        room_code: &str,
        player_name: &str,
    ) -> Result<RoomSnapshot, AppError> {
        self.ensure_idle().await?;
        let snapshot = self
            .inner
            .registry
            .join_room(room_code, self.session_id(), player_name)
            .await?;

        let name = snapshot
            .room
            .player(self.session_id())
            .map(|p| p.name.clone())
            .unwrap_or_default();
        self.attach(&snapshot.room_id, ClientRole::Player, name, ClientView::Lobby)
            .await?;
        Ok(snapshot)
    }

    /// Leaves the room. Local state is released even if the store write fails.
    #[instrument(skip(self), fields(session_id = %self.session_id()))]
    pub async fn leave_room(&self) -> Result<LeaveOutcome, AppError> {
        let active = self.take_session().await.ok_or(AppError::NotInRoom)?;
        let room_id = active.info.room_id.clone();

        // hooks first, or the departure races our own disconnect writes
        self.release_local(active).await?;
        self.inner
            .registry
            .leave_room(&room_id, self.session_id())
            .await
    }

    /// Host only: ends the room for everyone
    #[instrument(skip(self), fields(session_id = %self.session_id()))]
    pub async fn end_room(&self) -> Result<(), AppError> {
        let info = self.require_room().await?;
        // the backstop deletion runs detached
        let _deletion = self
            .inner
            .registry
            .end_room(&info.room_id, self.session_id())
            .await?;
        self.release(&info.room_id).await
    }

    /// Host only: binds the room to a game, moving `lobby -> waiting`
    #[instrument(skip(self, config), fields(session_id = %self.session_id()))]
    pub async fn select_game_type(
        &self,
        game_type: &str,
        config: Option<Value>,
    ) -> Result<(), AppError> {
        validate_game_type(game_type)?;
        let info = self.require_room().await?;
        let self_id = self.session_id();

        self.inner
            .repository
            .mutate(&info.room_id, |room| {
                require_host(room, self_id)?;
                match room.status() {
                    RoomStatus::Lobby => {
                        room.meta.status = RoomStatus::Lobby.transition_to(RoomStatus::Waiting)?
                    }
                    RoomStatus::Waiting if room.game_data.is_none() => {}
                    status => {
                        return Err(AppError::InvalidTransition {
                            from: status,
                            to: RoomStatus::Waiting,
                        })
                    }
                }
                room.meta.game_type = Some(game_type.to_string());
                if let Some(config) = &config {
                    room.meta.config = config.clone();
                }
                Ok(())
            })
            .await?;

        info!(room_id = %info.room_id, game_type = %game_type, "Game type selected");
        Ok(())
    }

    /// Sets the caller's ready flag; the host always stays ready
    pub async fn set_ready(&self, ready: bool) -> Result<bool, AppError> {
        let info = self.require_room().await?;
        let record = self
            .edit_own_record(&info.room_id, |record| {
                let next = record.is_host || ready;
                if record.is_ready == next {
                    return false;
                }
                record.is_ready = next;
                true
            })
            .await?;

        debug!(room_id = %info.room_id, ready = record.is_ready, "Ready flag set");
        Ok(record.is_ready)
    }

    /// Raises the caller's live score. Returns the stored score, which never decreases.
    pub async fn update_score(&self, score: i64) -> Result<i64, AppError> {
        let info = self.require_room().await?;
        let record = self
            .edit_own_record(&info.room_id, |record| {
                if score <= record.score {
                    return false;
                }
                record.score = score;
                true
            })
            .await?;
        Ok(record.score)
    }

    /// Host only: publishes content, flips the room to `playing` and starts the local engine
    #[instrument(skip(self), fields(session_id = %self.session_id()))]
    pub async fn handle_start_game(&self) -> Result<ContentPayload, AppError> {
        let info = self.require_room().await?;
        let adapter = self.adapter()?;
        let self_id = self.session_id();

        let room = self
            .inner
            .registry
            .get_room(&info.room_id)
            .await?
            .ok_or_else(|| AppError::RoomNotFound(info.room_id.clone()))?;
        require_host(&room, self_id)?;

        let config = if room.meta.config.is_null() {
            adapter.get_game_config()
        } else {
            room.meta.config.clone()
        };
        let prepared = adapter.prepare_multiplayer_game(&config).await?;
        let payload = self
            .inner
            .content
            .publish_content(&info.room_id, self_id, prepared)
            .await?;

        let status_write = self
            .inner
            .repository
            .mutate(&info.room_id, |room| {
                require_host(room, self_id)?;
                room.meta.status = room.status().transition_to(RoomStatus::Playing)?;
                Ok(())
            })
            .await;
        if let Err(e) = status_write {
            error!(
                room_id = %info.room_id,
                error = %e,
                "Content published but the status write failed"
            );
            return Err(e);
        }

        info!(room_id = %info.room_id, round = payload.round, "Game started");
        self.start_local_engine(&payload).await?;
        Ok(payload)
    }

    /// Waits for the host's content with the waiting indicator shown, then starts the engine
    #[instrument(skip(self, options), fields(session_id = %self.session_id()))]
    pub async fn wait_for_game_start(
        &self,
        options: WaitOptions,
    ) -> Result<ContentPayload, AppError> {
        let info = self.require_room().await?;
        let adapter = self.adapter()?;

        let payload = {
            let _indicator = WaitingIndicator::show(Arc::clone(&adapter));
            self.inner
                .content
                .wait_for_content(&info.room_id, self.session_id(), options)
                .await?
        };

        self.start_local_engine(&payload).await?;
        Ok(payload)
    }

    /// Host only: advisory live state shared with every player
    pub async fn publish_game_state(&self, state: Value) -> Result<(), AppError> {
        let info = self.require_room().await?;
        let self_id = self.session_id();
        self.inner
            .repository
            .mutate(&info.room_id, |room| {
                require_host(room, self_id)?;
                room.game_state = (!state.is_null()).then(|| state.clone());
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Records the caller's final result
    pub async fn finish_game(&self, input: ResultInput) -> Result<SubmitOutcome, AppError> {
        let info = self.require_room().await?;
        self.inner
            .results
            .submit_result(&info.room_id, self.session_id(), input)
            .await
    }

    /// Leaves the results screen; the last player out deletes the room
    #[instrument(skip(self), fields(session_id = %self.session_id()))]
    pub async fn exit_after_results(&self) -> Result<ExitOutcome, AppError> {
        let info = self.require_room().await?;
        let room = self.inner.registry.get_room(&info.room_id).await?;
        if room
            .as_ref()
            .and_then(|room| room.player(self.session_id()))
            .is_some_and(|player| !player.finished)
        {
            return Err(AppError::NotFinished);
        }

        let active = self.take_session().await.ok_or(AppError::NotInRoom)?;
        let room_id = active.info.room_id.clone();

        self.release_local(active).await?;
        self.inner.results.exit(&room_id, self.session_id()).await
    }

    /// Host only: removes another player's record
    #[instrument(skip(self), fields(session_id = %self.session_id()))]
    pub async fn kick_player(&self, target_id: &str) -> Result<(), AppError> {
        let info = self.require_room().await?;
        let self_id = self.session_id();

        self.inner
            .repository
            .mutate(&info.room_id, |room| {
                require_host(room, self_id)?;
                if target_id == self_id {
                    return Err(AppError::CannotKickSelf);
                }
                room.players
                    .remove(target_id)
                    .ok_or_else(|| AppError::PlayerNotFound(target_id.to_string()))?;
                Ok(())
            })
            .await?;

        info!(room_id = %info.room_id, target_id = %target_id, "Player kicked");
        Ok(())
    }

    /// Host only: hands the host role to another player
    #[instrument(skip(self), fields(session_id = %self.session_id()))]
    pub async fn transfer_host(&self, target_id: &str) -> Result<(), AppError> {
        let info = self.require_room().await?;
        let self_id = self.session_id();
        if target_id == self_id {
            return Err(AppError::Validation("Already the host".to_string()));
        }

        self.inner
            .repository
            .mutate(&info.room_id, |room| {
                require_host(room, self_id)?;
                if !room.has_player(target_id) {
                    return Err(AppError::PlayerNotFound(target_id.to_string()));
                }
                promote(room, self_id, target_id);
                Ok(())
            })
            .await?;

        info!(room_id = %info.room_id, new_host_id = %target_id, "Host transferred");
        self.sync_host_role(&info.room_id, target_id).await
    }

    /// Host only, multi-round rooms: `finished -> waiting` with a fresh round
    #[instrument(skip(self), fields(session_id = %self.session_id()))]
    pub async fn start_new_round(&self) -> Result<u32, AppError> {
        if self.inner.content.cardinality() != ContentCardinality::MultiRound {
            return Err(AppError::Validation(
                "Rounds are disabled for one-shot content".to_string(),
            ));
        }
        let info = self.require_room().await?;
        let self_id = self.session_id();

        let mutation = self
            .inner
            .repository
            .mutate(&info.room_id, |room| {
                require_host(room, self_id)?;
                if room.status() != RoomStatus::Finished {
                    return Err(AppError::InvalidTransition {
                        from: room.status(),
                        to: RoomStatus::Waiting,
                    });
                }
                room.meta.status = RoomStatus::Waiting;
                room.meta.round += 1;
                room.game_data = None;
                room.game_state = None;
                room.results.clear();
                for player in room.players.values_mut() {
                    reset_for_round(player);
                }
                Ok(room.meta.round)
            })
            .await?;

        if let Some(active) = self.inner.session.lock().await.as_mut() {
            if let Some(engine) = active.engine.take() {
                engine.abort();
            }
        }
        info!(room_id = %info.room_id, round = mutation.value, "New round opened");
        Ok(mutation.value)
    }

    /// Disarms presence and saves what the game view needs to pick the session up
    #[instrument(skip(self), fields(session_id = %self.session_id()))]
    pub async fn prepare_navigation(&self) -> Result<NavigationIntent, AppError> {
        let info = self.require_room().await?;
        let room = self
            .inner
            .registry
            .get_room(&info.room_id)
            .await?
            .ok_or_else(|| AppError::RoomNotFound(info.room_id.clone()))?;
        let intent = NavigationIntent::for_room(
            &self.inner.config.routes,
            room.meta.game_type.as_deref(),
            &info.room_id,
            info.role,
        )?;

        let mut session = self.inner.session.lock().await;
        let active = session
            .as_mut()
            .filter(|active| active.info.room_id == info.room_id)
            .ok_or(AppError::NotInRoom)?;

        // the page change drops the connection; that is not a departure.
        // A game already running in this tab has no page change ahead of it.
        if active.engine.is_none() && active.armed {
            self.inner.presence.cancel_disconnect_handler().await?;
            self.inner.presence.stop_heartbeat();
            active.armed = false;
        }
        self.inner
            .storage
            .save(StoredSession {
                room_id: info.room_id.clone(),
                role: info.role,
                player_name: info.player_name.clone(),
                identity_token: self.inner.identity.token.clone(),
            })
            .await?;
        active.info.view = ClientView::Game;
        drop(session);

        info!(room_id = %info.room_id, url = %intent.url, "Navigation prepared");
        Ok(intent)
    }

    /// Reads client storage once on game-view load and rejoins the saved room.
    ///
    /// Returns `None`, clearing the entry, when the room or the player record is gone.
    #[instrument(skip(self), fields(session_id = %self.session_id()))]
    pub async fn resume_from_client_storage(&self) -> Result<Option<RoomSnapshot>, AppError> {
        let Some(stored) = self.inner.storage.load().await? else {
            debug!("No stored room session");
            return Ok(None);
        };
        if stored.identity_token != self.inner.identity.token {
            warn!(room_id = %stored.room_id, "Stored room session belongs to another identity");
            self.inner.storage.clear().await?;
            return Ok(None);
        }

        let self_id = self.session_id();
        let room = self.inner.registry.get_room(&stored.room_id).await?;
        let Some(room) = room.filter(|r| r.has_player(self_id) && !r.status().is_terminal()) else {
            info!(room_id = %stored.room_id, "Stored room session is gone");
            self.inner.storage.clear().await?;
            return Ok(None);
        };

        let role = if room.is_host(self_id) {
            ClientRole::Host
        } else {
            ClientRole::Player
        };
        match self.active_room().await {
            Some(active) if active.room_id == stored.room_id => {
                self.rearm(&stored.room_id, role).await?
            }
            Some(active) => return Err(AppError::AlreadyInRoom(active.room_id)),
            None => {
                self.attach(&stored.room_id, role, stored.player_name.clone(), ClientView::Game)
                    .await?
            }
        }
        self.inner.presence.mark_online(&stored.room_id, self_id).await?;

        info!(room_id = %stored.room_id, role = %role, "Room session resumed");
        Ok(Some(RoomSnapshot {
            room_id: stored.room_id,
            room,
        }))
    }

    /// Drops the store connection as a killed tab would; armed hooks fire.
    /// The controller cannot be used afterwards.
    pub async fn disconnect(&self) -> Result<(), AppError> {
        if let Some(active) = self.take_session().await {
            self.detach(active).await;
        }
        self.inner.presence.disconnect().await
    }

    /// Moves the host hooks and local role to match `meta.hostId`
    pub(crate) async fn sync_host_role(&self, room_id: &str, host_id: &str) -> Result<(), AppError> {
        let role = {
            let mut session = self.inner.session.lock().await;
            let Some(active) = session.as_mut().filter(|a| a.info.room_id == room_id) else {
                return Ok(());
            };
            let is_host = host_id == self.session_id();
            match (active.info.role, is_host) {
                (ClientRole::Player, true) => {
                    self.inner.presence.register_host_hooks(room_id).await?;
                    active.info.role = ClientRole::Host;
                    info!(room_id = %room_id, "Promoted to host");
                }
                (ClientRole::Host, false) => {
                    self.inner.presence.cancel_host_hooks(room_id).await?;
                    active.info.role = ClientRole::Player;
                    info!(room_id = %room_id, new_host_id = %host_id, "Host role handed over");
                }
                _ => return Ok(()),
            }
            active.info.role
        };

        if let Some(mut stored) = self.inner.storage.load().await? {
            if stored.room_id == room_id {
                stored.role = role;
                self.inner.storage.save(stored).await?;
            }
        }
        Ok(())
    }

    /// Releases local state for `room_id` if it is still the current room
    pub(crate) async fn release(&self, room_id: &str) -> Result<(), AppError> {
        let active = {
            let mut session = self.inner.session.lock().await;
            let current = session
                .as_ref()
                .is_some_and(|active| active.info.room_id == room_id);
            if current {
                session.take()
            } else {
                None
            }
        };
        match active {
            Some(active) => self.release_local(active).await,
            None => Ok(()),
        }
    }

    /// Releases `room_id` and drops this client's record from it.
    ///
    /// A closed room is never reopened; once no one in it is online the record goes.
    pub(crate) async fn abandon(&self, room_id: &str) -> Result<(), AppError> {
        self.release(room_id).await?;
        match self.inner.registry.leave_room(room_id, self.session_id()).await {
            Ok(outcome) => {
                debug!(room_id = %room_id, outcome = ?outcome, "Left closed room");
                Ok(())
            }
            Err(AppError::RoomNotFound(_)) | Err(AppError::NotInRoom) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn attach(
        &self,
        room_id: &str,
        role: ClientRole,
        player_name: String,
        view: ClientView,
    ) -> Result<(), AppError> {
        let inner = &self.inner;
        let self_id = self.session_id();
        let mut session = inner.session.lock().await;
        if let Some(active) = session.as_ref() {
            return Err(AppError::AlreadyInRoom(active.info.room_id.clone()));
        }

        inner.presence.register(room_id, self_id).await?;
        if role == ClientRole::Host {
            inner.presence.register_host_hooks(room_id).await?;
        }
        inner
            .presence
            .start_heartbeat(room_id, self_id, inner.config.heartbeat_interval);

        let (leaderboard_subscriber, leaderboard) = LeaderboardSubscriber::channel();
        let mut handlers: Vec<Arc<dyn RoomEventHandler>> = vec![
            Arc::new(SessionEventRouter::new(self.downgrade())),
            Arc::new(leaderboard_subscriber),
        ];
        if let Some(adapter) = &inner.adapter {
            handlers.push(Arc::new(GameAdapterBridge::new(Arc::clone(adapter))));
        }

        let mut tasks = Vec::with_capacity(handlers.len() + 1);
        for handler in handlers {
            let subscription =
                RoomSubscription::new(room_id.to_string(), handler, inner.bus.clone());
            tasks.push(subscription.start().await);
        }
        let mut active = ActiveRoom {
            info: SessionInfo {
                room_id: room_id.to_string(),
                role,
                player_name,
                view,
            },
            tasks,
            engine: None,
            armed: true,
            leaderboard,
        };

        // handlers are subscribed before the watcher emits its first snapshot
        let watcher = RoomWatcher::new(
            Arc::clone(&inner.store),
            room_id.to_string(),
            Some(self_id.to_string()),
            inner.bus.clone(),
        )
        .start()
        .await?;
        active.tasks.push(watcher);
        *session = Some(active);

        info!(room_id = %room_id, role = %role, view = %view, "Attached to room");
        Ok(())
    }

    /// Re-arms presence for the room this controller is already attached to
    async fn rearm(&self, room_id: &str, role: ClientRole) -> Result<(), AppError> {
        let mut session = self.inner.session.lock().await;
        self.arm_presence(room_id, role).await?;
        if let Some(active) = session.as_mut() {
            active.info.role = role;
            active.info.view = ClientView::Game;
            active.armed = true;
        }
        Ok(())
    }

    async fn arm_presence(&self, room_id: &str, role: ClientRole) -> Result<(), AppError> {
        let self_id = self.session_id();
        self.inner.presence.register(room_id, self_id).await?;
        if role == ClientRole::Host {
            self.inner.presence.register_host_hooks(room_id).await?;
        }
        self.inner
            .presence
            .start_heartbeat(room_id, self_id, self.inner.config.heartbeat_interval);
        debug!(room_id = %room_id, role = %role, "Presence armed");
        Ok(())
    }

    async fn detach(&self, active: ActiveRoom) {
        let room_id = active.info.room_id.clone();
        drop(active);
        self.inner.bus.close_room(&room_id).await;
        debug!(room_id = %room_id, "Detached from room");
    }

    async fn release_local(&self, active: ActiveRoom) -> Result<(), AppError> {
        let room_id = active.info.room_id.clone();
        self.detach(active).await;
        self.inner.presence.stop_heartbeat();

        let hooks = self.inner.presence.cancel_disconnect_handler().await;
        let storage = self.inner.storage.clear().await;
        if let Some(adapter) = &self.inner.adapter {
            adapter.on_room_left();
        }

        info!(room_id = %room_id, "Room session released");
        hooks.and(storage)
    }

    async fn start_local_engine(&self, payload: &ContentPayload) -> Result<(), AppError> {
        let handle = start_engine(self.adapter()?, payload, self.downgrade())?;

        let mut session = self.inner.session.lock().await;
        let Some(active) = session.as_mut() else {
            handle.abort();
            return Ok(());
        };
        if let Some(previous) = active.engine.replace(handle) {
            previous.abort();
        }
        // navigation already disarmed this tab, but the game runs here
        if !active.armed {
            let room_id = active.info.room_id.clone();
            self.arm_presence(&room_id, active.info.role).await?;
            active.armed = true;
        }
        Ok(())
    }

    /// Edits the caller's own record; a removed record is never recreated
    async fn edit_own_record<F>(&self, room_id: &str, mut edit: F) -> Result<PlayerRecord, AppError>
    where
        F: FnMut(&mut PlayerRecord) -> bool + Send,
    {
        let mut outcome: Option<Result<PlayerRecord, AppError>> = None;
        {
            let mut update = |current: Option<Value>| -> TransactionDecision {
                let Some(mut record) =
                    current.and_then(|v| serde_json::from_value::<PlayerRecord>(v).ok())
                else {
                    outcome = Some(Err(AppError::RemovedFromRoom));
                    return TransactionDecision::Abort;
                };
                if !edit(&mut record) {
                    outcome = Some(Ok(record));
                    return TransactionDecision::Abort;
                }
                match serde_json::to_value(&record) {
                    Ok(value) => {
                        outcome = Some(Ok(record));
                        TransactionDecision::Commit(Some(value))
                    }
                    Err(e) => {
                        outcome = Some(Err(e.into()));
                        TransactionDecision::Abort
                    }
                }
            };
            self.inner
                .store
                .transaction(&path::player(room_id, self.session_id()), &mut update)
                .await?;
        }
        outcome.unwrap_or(Err(AppError::Internal))
    }

    async fn require_room(&self) -> Result<SessionInfo, AppError> {
        self.active_room().await.ok_or(AppError::NotInRoom)
    }

    async fn ensure_idle(&self) -> Result<(), AppError> {
        match self.active_room().await {
            Some(active) => Err(AppError::AlreadyInRoom(active.room_id)),
            None => Ok(()),
        }
    }

    async fn take_session(&self) -> Option<ActiveRoom> {
        self.inner.session.lock().await.take()
    }

    fn adapter(&self) -> Result<Arc<dyn GameAdapter>, AppError> {
        self.inner
            .adapter
            .clone()
            .ok_or_else(|| AppError::Validation("No game adapter attached".to_string()))
    }
}

fn reset_for_round(player: &mut PlayerRecord) {
    player.score = 0;
    player.finished = false;
    player.finished_at = None;
    player.exited = false;
    player.exited_at = None;
    if player.status == PlayerStatus::Finished {
        player.status = PlayerStatus::Active;
    }
}
