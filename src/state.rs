use crate::presence::PresenceTracker;
use crate::ws::dispatch::BroadcastDispatcher;
use crate::ws::registry::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
/// Registry, presence tracker, and dispatcher are constructed once in main
/// with a lifecycle tied to the server process and injected here — never
/// accessed as globals.
#[derive(Clone)]
pub struct AppState {
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Active WebSocket connections per user
    pub registry: ConnectionRegistry,
    /// Last-known status per user
    pub presence: PresenceTracker,
    /// Event fan-out to live connections
    pub dispatcher: BroadcastDispatcher,
    /// WebSocket keepalive tuning
    pub ping_interval_secs: u64,
    pub pong_timeout_secs: u64,
}

impl AppState {
    /// Build state with freshly-constructed realtime components.
    pub fn new(jwt_secret: Vec<u8>, ping_interval_secs: u64, pong_timeout_secs: u64) -> Self {
        let presence = PresenceTracker::new();
        let registry = ConnectionRegistry::new(presence.clone());
        let dispatcher = BroadcastDispatcher::new(registry.clone());
        Self {
            jwt_secret,
            registry,
            presence,
            dispatcher,
            ping_interval_secs,
            pong_timeout_secs,
        }
    }
}
