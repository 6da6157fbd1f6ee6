use duel_types::{BattleId, PlayerIdentity, ServerMessage};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One socket. Anonymous until it authenticates; anonymous sockets may still
/// watch battles as spectators.
#[derive(Debug)]
struct Session {
    player: Option<PlayerIdentity>,
    last_seen: Instant,
    watching: HashSet<BattleId>,
    outbox: mpsc::UnboundedSender<ServerMessage>,
}

#[derive(Debug, Default)]
struct Registry {
    sessions: HashMap<ConnectionId, Session>,
    watchers: HashMap<BattleId, HashSet<ConnectionId>>,
}

impl Registry {
    fn unwatch(&mut self, id: ConnectionId, battle_id: BattleId) {
        if let Some(watchers) = self.watchers.get_mut(&battle_id) {
            watchers.remove(&id);
            if watchers.is_empty() {
                self.watchers.remove(&battle_id);
            }
        }
    }

    fn drop_session(&mut self, id: ConnectionId) -> bool {
        let Some(session) = self.sessions.remove(&id) else {
            return false;
        };
        for battle_id in session.watching {
            self.unwatch(id, battle_id);
        }
        true
    }
}

/// Live WebSocket connections, who they authenticated as and which battles
/// they watch. A player may hold several connections (tabs, devices).
#[derive(Default)]
pub struct ConnectionManager {
    registry: RwLock<Registry>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket; messages for it arrive on the returned receiver.
    pub async fn create_connection(
        &self,
        id: ConnectionId,
    ) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (outbox, receiver) = mpsc::unbounded_channel();
        let session = Session {
            player: None,
            last_seen: Instant::now(),
            watching: HashSet::new(),
            outbox,
        };
        self.registry.write().await.sessions.insert(id, session);
        receiver
    }

    pub async fn remove_connection(&self, id: ConnectionId) {
        self.registry.write().await.drop_session(id);
    }

    pub async fn player(&self, id: ConnectionId) -> Option<PlayerIdentity> {
        self.registry
            .read()
            .await
            .sessions
            .get(&id)
            .and_then(|session| session.player.clone())
    }

    pub async fn set_player(&self, id: ConnectionId, player: PlayerIdentity) -> Result<(), String> {
        let mut registry = self.registry.write().await;
        let session = registry
            .sessions
            .get_mut(&id)
            .ok_or("Connection not found")?;
        session.player = Some(player);
        Ok(())
    }

    pub async fn update_activity(&self, id: ConnectionId) {
        if let Some(session) = self.registry.write().await.sessions.get_mut(&id) {
            session.last_seen = Instant::now();
        }
    }

    pub async fn subscribe(&self, id: ConnectionId, battle_id: BattleId) -> Result<(), String> {
        let mut registry = self.registry.write().await;
        let session = registry
            .sessions
            .get_mut(&id)
            .ok_or("Connection not found")?;
        if session.watching.insert(battle_id) {
            debug!("Connection {} now watching battle {}", id, battle_id);
        }
        registry.watchers.entry(battle_id).or_default().insert(id);
        Ok(())
    }

    pub async fn unsubscribe(&self, id: ConnectionId, battle_id: BattleId) {
        let mut registry = self.registry.write().await;
        if let Some(session) = registry.sessions.get_mut(&id) {
            session.watching.remove(&battle_id);
        }
        registry.unwatch(id, battle_id);
    }

    /// Connections watching `battle_id`, with the identity each should be
    /// shown the battle as.
    pub async fn subscribers(&self, battle_id: BattleId) -> Vec<(ConnectionId, Option<PlayerIdentity>)> {
        let registry = self.registry.read().await;
        let Some(watchers) = registry.watchers.get(&battle_id) else {
            return Vec::new();
        };
        watchers
            .iter()
            .filter_map(|id| {
                let session = registry.sessions.get(id)?;
                Some((*id, session.player.clone()))
            })
            .collect()
    }

    pub async fn send_to_connection(
        &self,
        id: ConnectionId,
        message: ServerMessage,
    ) -> Result<(), String> {
        let registry = self.registry.read().await;
        let session = registry.sessions.get(&id).ok_or("Connection not found")?;
        session
            .outbox
            .send(message)
            .map_err(|_| "Connection closed".to_string())
    }

    /// Drop sessions with no traffic for longer than `idle`. Closed outboxes go too.
    pub async fn cleanup_inactive_connections(&self, idle: Duration) {
        let mut registry = self.registry.write().await;
        let stale: Vec<ConnectionId> = registry
            .sessions
            .iter()
            .filter(|(_, s)| s.last_seen.elapsed() > idle || s.outbox.is_closed())
            .map(|(id, _)| *id)
            .collect();

        for id in stale {
            if registry.drop_session(id) {
                info!("Removing inactive connection: {}", id);
            }
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.sessions.len()
    }
}
