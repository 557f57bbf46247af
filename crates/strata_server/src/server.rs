use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use strata_shared::protocol::{self, ServerMessage};

use crate::config::ServerConfig;
use crate::physics::{self, MovementValidator};
use crate::registry::BlockRegistry;
use crate::session::{PlayerSession, SessionManager};
use crate::world::{WorldError, WorldStore};

/// Cap on a single physics delta so a stalled tick cannot fling players
/// through the floor.
const MAX_DELTA_TIME: f32 = 0.25;

/// One open transport. A peer exists from WebSocket accept until the socket
/// closes; it is bound to a session by player_join and receives broadcast
/// traffic only once the init stream's terminal marker went out.
pub struct Peer {
    pub session_id: Option<u64>,
    pub ready: bool,
    sender: mpsc::UnboundedSender<Message>,
}

/// All shared mutable state, owned explicitly and passed by handle: world,
/// registry and sessions mutate only under the one write lock, which is the
/// single-writer discipline the broadcast ordering guarantee rests on.
pub struct ServerState {
    pub config: ServerConfig,
    pub world: WorldStore,
    pub registry: BlockRegistry,
    pub sessions: SessionManager,
    pub validator: MovementValidator,
    peers: FxHashMap<u64, Peer>,
    next_conn_id: u64,
}

pub type SharedState = Arc<RwLock<ServerState>>;

impl ServerState {
    pub fn new(config: ServerConfig) -> Result<Self, WorldError> {
        let world = WorldStore::generate(config.seed, config.world_size)?;
        let spawn = config.spawn_position.unwrap_or_else(|| {
            let centre = config.world_size / 2;
            let surface = world.surface_height(centre, centre).unwrap_or(0);
            Vec3::new(centre as f32 + 0.5, (surface + 2) as f32, centre as f32 + 0.5)
        });
        let validator = MovementValidator::new(config.max_speed, config.tick_duration());

        Ok(Self {
            world,
            registry: BlockRegistry::new(),
            sessions: SessionManager::new(spawn),
            validator,
            peers: FxHashMap::default(),
            next_conn_id: 1,
            config,
        })
    }

    pub fn shared(config: ServerConfig) -> Result<SharedState, WorldError> {
        Ok(Arc::new(RwLock::new(Self::new(config)?)))
    }

    pub fn register_peer(&mut self, sender: mpsc::UnboundedSender<Message>) -> u64 {
        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;
        self.peers.insert(
            conn_id,
            Peer {
                session_id: None,
                ready: false,
                sender,
            },
        );
        conn_id
    }

    /// Tears down a transport. The session, if any, is only marked
    /// disconnected; its state stays for a silent reconnect.
    pub fn remove_peer(&mut self, conn_id: u64) {
        if let Some(peer) = self.peers.remove(&conn_id) {
            if let Some(session_id) = peer.session_id {
                self.sessions.disconnect(session_id);
            }
        }
    }

    pub fn attach_session(&mut self, conn_id: u64, session_id: u64) {
        if let Some(peer) = self.peers.get_mut(&conn_id) {
            peer.session_id = Some(session_id);
        }
    }

    pub fn detach_session(&mut self, conn_id: u64) {
        if let Some(peer) = self.peers.get_mut(&conn_id) {
            peer.session_id = None;
            peer.ready = false;
        }
    }

    /// Marks the init stream complete; from here on the peer receives
    /// broadcast traffic.
    pub fn mark_ready(&mut self, conn_id: u64) {
        if let Some(peer) = self.peers.get_mut(&conn_id) {
            peer.ready = true;
        }
    }

    pub fn peer_session(&self, conn_id: u64) -> Option<u64> {
        self.peers.get(&conn_id).and_then(|peer| peer.session_id)
    }

    pub fn send_to(&self, conn_id: u64, msg: &ServerMessage) {
        if let Some(peer) = self.peers.get(&conn_id) {
            let frame = Message::Text(protocol::encode(msg));
            if peer.sender.send(frame).is_err() {
                trace!("Dropping frame for closing connection {conn_id}");
            }
        }
    }

    /// Delivers to every initialized peer. Called while holding the write
    /// lock after a mutation commits, so all peers observe mutations in
    /// commit order.
    pub fn broadcast(&self, msg: &ServerMessage) {
        let frame = Message::Text(protocol::encode(msg));
        for (conn_id, peer) in &self.peers {
            if !peer.ready {
                continue;
            }
            if peer.sender.send(frame.clone()).is_err() {
                trace!("Dropping broadcast for closing connection {conn_id}");
            }
        }
    }
}

pub fn player_update(session: &PlayerSession) -> ServerMessage {
    ServerMessage::PlayerUpdate {
        id: session.id,
        position: session.position,
        rotation: session.rotation,
        velocity: session.velocity,
        on_ground: session.on_ground,
        flying: session.flying,
        name: session.name.clone(),
    }
}

pub fn error_message(message: impl Into<String>) -> ServerMessage {
    ServerMessage::Error {
        message: message.into(),
    }
}

/// The dedicated fixed-rate task: integrates gravity for every connected
/// session, broadcasts the resulting player updates on the same channel as
/// voluntary moves, and runs the session TTL sweep about once a second.
pub async fn run_physics_loop(state: SharedState) {
    let (tick_duration, session_ttl) = {
        let state = state.read().await;
        (state.config.tick_duration(), state.config.session_ttl)
    };
    let sweep_interval_ticks = (1.0 / tick_duration.as_secs_f32()).round().max(1.0) as u64;

    let mut interval = tokio::time::interval(tick_duration);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_tick = Instant::now();
    let mut tick: u64 = 0;

    // The first tick fires immediately.
    interval.tick().await;

    loop {
        interval.tick().await;
        let now = Instant::now();
        let dt = (now - last_tick).as_secs_f32();
        last_tick = now;
        if dt > MAX_DELTA_TIME {
            warn!("Large physics delta ({dt:.3}s), capping to {MAX_DELTA_TIME:.3}s");
        }
        let dt = dt.min(MAX_DELTA_TIME);
        tick += 1;

        let mut state = state.write().await;
        let state = &mut *state;

        let mut updates = Vec::new();
        let world = &state.world;
        for session in state.sessions.iter_mut() {
            if !session.connected {
                continue;
            }
            if physics::step(world, session, dt) {
                updates.push(player_update(session));
            }
        }

        for update in &updates {
            state.broadcast(update);
        }

        if tick % sweep_interval_ticks == 0 {
            let expired = state.sessions.sweep(session_ttl);
            if !expired.is_empty() {
                debug!("Swept {} expired session(s)", expired.len());
            }
        }
    }
}
