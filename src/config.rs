use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::content::ContentCardinality;
use crate::controller::CompletionPolicy;
use crate::room::presence::DisconnectMode;

/// Runtime configuration for the room synchronization core
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Length of generated room codes (4..=8)
    pub room_code_length: usize,
    /// How many codes to try before giving up on room creation
    pub code_max_attempts: u32,
    /// Upper bound accepted for `meta.maxPlayers`
    pub max_room_capacity: u32,
    pub default_max_players: u32,
    pub heartbeat_interval: Duration,
    /// Time a closed room stays visible before it is deleted
    pub closed_grace: Duration,
    /// Backstop delay before an ended room is deleted
    pub ended_room_ttl: Duration,
    /// `None` waits for content until the room closes
    pub content_wait_timeout: Option<Duration>,
    pub max_payload_bytes: usize,
    pub content_cardinality: ContentCardinality,
    pub completion_policy: CompletionPolicy,
    pub disconnect_mode: DisconnectMode,
    /// Rooms with no player activity for this long are swept
    pub stale_player_threshold: Duration,
    pub sweep_interval: Duration,
    pub event_channel_capacity: usize,
    pub listen_addr: String,
    pub routes: GameRoutes,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            room_code_length: 6,
            code_max_attempts: 10,
            max_room_capacity: 8,
            default_max_players: 4,
            heartbeat_interval: Duration::from_secs(30),
            closed_grace: Duration::from_millis(1500),
            ended_room_ttl: Duration::from_secs(60),
            content_wait_timeout: Some(Duration::from_secs(120)),
            max_payload_bytes: 200 * 1024,
            content_cardinality: ContentCardinality::OneShot,
            completion_policy: CompletionPolicy::HostFinishes,
            disconnect_mode: DisconnectMode::MarkOffline,
            stale_player_threshold: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(60),
            event_channel_capacity: 100,
            listen_addr: "0.0.0.0:3000".to_string(),
            routes: GameRoutes::default(),
        }
    }
}

impl SyncConfig {
    /// Builds a config from `ROOMSYNC_*` environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            room_code_length: env_parse("ROOMSYNC_CODE_LENGTH")
                .filter(|len| (4..=8).contains(len))
                .unwrap_or(defaults.room_code_length),
            code_max_attempts: env_parse("ROOMSYNC_CODE_ATTEMPTS")
                .unwrap_or(defaults.code_max_attempts),
            max_room_capacity: env_parse("ROOMSYNC_MAX_CAPACITY")
                .unwrap_or(defaults.max_room_capacity),
            default_max_players: env_parse("ROOMSYNC_DEFAULT_MAX_PLAYERS")
                .unwrap_or(defaults.default_max_players),
            heartbeat_interval: env_millis("ROOMSYNC_HEARTBEAT_MS")
                .unwrap_or(defaults.heartbeat_interval),
            closed_grace: env_millis("ROOMSYNC_CLOSED_GRACE_MS").unwrap_or(defaults.closed_grace),
            ended_room_ttl: env_millis("ROOMSYNC_ENDED_TTL_MS").unwrap_or(defaults.ended_room_ttl),
            content_wait_timeout: match env_parse::<u64>("ROOMSYNC_CONTENT_WAIT_MS") {
                Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
                None => defaults.content_wait_timeout,
            },
            max_payload_bytes: env_parse("ROOMSYNC_MAX_PAYLOAD_BYTES")
                .unwrap_or(defaults.max_payload_bytes),
            content_cardinality: env_parse("ROOMSYNC_CONTENT_CARDINALITY")
                .unwrap_or(defaults.content_cardinality),
            completion_policy: env_parse("ROOMSYNC_COMPLETION_POLICY")
                .unwrap_or(defaults.completion_policy),
            disconnect_mode: env_parse("ROOMSYNC_DISCONNECT_MODE")
                .unwrap_or(defaults.disconnect_mode),
            stale_player_threshold: env_millis("ROOMSYNC_STALE_PLAYER_MS")
                .unwrap_or(defaults.stale_player_threshold),
            sweep_interval: env_millis("ROOMSYNC_SWEEP_MS").unwrap_or(defaults.sweep_interval),
            event_channel_capacity: defaults.event_channel_capacity,
            listen_addr: std::env::var("ROOMSYNC_ADDR").unwrap_or(defaults.listen_addr),
            routes: defaults.routes,
        }
    }
}

pub(crate) fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}

/// Maps a game type to the view that hosts it
#[derive(Debug, Clone)]
pub struct GameRoutes {
    routes: HashMap<String, String>,
}

impl GameRoutes {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    pub fn with_route(mut self, game_type: impl Into<String>, url: impl Into<String>) -> Self {
        self.routes.insert(game_type.into(), url.into());
        self
    }

    pub fn url_for(&self, game_type: &str) -> Option<&str> {
        self.routes.get(game_type).map(String::as_str)
    }
}

impl Default for GameRoutes {
    fn default() -> Self {
        Self::new()
            .with_route("math", "/games/math")
            .with_route("pixel-logic", "/games/pixel-logic")
            .with_route("memory-matrix", "/games/memory-matrix")
            .with_route("word-recall", "/games/word-recall")
            .with_route("dual-nback", "/games/dual-nback")
            .with_route("maze", "/games/maze")
    }
}
