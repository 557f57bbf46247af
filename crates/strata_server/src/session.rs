use std::time::{Duration, Instant};

use glam::Vec3;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, info};

use strata_shared::protocol::PlayerInfo;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("name '{0}' is already connected")]
    NameInUse(String),
}

/// Whether a join resumed an existing session or created a fresh one.
/// The distinction is observable in logs and matters for telemetry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    NewSession,
    Reconnected,
}

#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub id: u64,
    pub name: String,
    pub position: Vec3,
    pub rotation: [f32; 2],
    pub velocity: Vec3,
    pub flying: bool,
    pub on_ground: bool,
    pub connected: bool,
    /// Stamped whenever a voluntary move is accepted.
    pub last_move: Instant,
    pub disconnected_at: Option<Instant>,
}

impl PlayerSession {
    fn new(id: u64, name: String, spawn: Vec3) -> Self {
        Self {
            id,
            name,
            position: spawn,
            rotation: [0.0, 0.0],
            velocity: Vec3::ZERO,
            flying: false,
            on_ground: false,
            connected: true,
            last_move: Instant::now(),
            disconnected_at: None,
        }
    }

    /// Stable block_id under which this player is addressable in queries.
    /// The prefix is distinct from registry-allocated `user_` ids so a
    /// placed user block can never shadow a live player.
    pub fn block_id(&self) -> String {
        format!("player_{}", self.id)
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id,
            name: self.name.clone(),
            position: self.position,
            rotation: self.rotation,
            flying: self.flying,
            on_ground: self.on_ground,
        }
    }
}

/// Lifecycle and identity of players. Sessions are keyed by display name for
/// joining: disconnecting keeps the record so the same name resumes it in
/// place, until the TTL sweep gives up on the reconnect.
pub struct SessionManager {
    sessions: FxHashMap<u64, PlayerSession>,
    next_id: u64,
    spawn: Vec3,
}

impl SessionManager {
    pub fn new(spawn: Vec3) -> Self {
        Self {
            sessions: FxHashMap::default(),
            next_id: 1,
            spawn,
        }
    }

    pub fn spawn_position(&self) -> Vec3 {
        self.spawn
    }

    pub fn join(&mut self, name: &str) -> Result<(u64, JoinOutcome), JoinError> {
        if let Some(existing) = self.sessions.values_mut().find(|s| s.name == name) {
            if existing.connected {
                return Err(JoinError::NameInUse(name.to_string()));
            }

            existing.connected = true;
            existing.disconnected_at = None;
            existing.last_move = Instant::now();
            info!(
                "Player '{name}' reconnected as session {} at {:?}",
                existing.id, existing.position
            );
            return Ok((existing.id, JoinOutcome::Reconnected));
        }

        let id = self.next_id;
        self.next_id += 1;
        self.sessions
            .insert(id, PlayerSession::new(id, name.to_string(), self.spawn));
        info!("Player '{name}' joined as new session {id}");
        Ok((id, JoinOutcome::NewSession))
    }

    /// Marks the session disconnected but keeps all state for a silent
    /// position-preserving reconnect.
    pub fn disconnect(&mut self, id: u64) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.connected = false;
            session.disconnected_at = Some(Instant::now());
            debug!("Session {id} ('{}') marked disconnected", session.name);
        }
    }

    pub fn get(&self, id: u64) -> Option<&PlayerSession> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut PlayerSession> {
        self.sessions.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerSession> {
        self.sessions.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PlayerSession> {
        self.sessions.values_mut()
    }

    /// Roster snapshot of connected players, ordered by session id for
    /// stable frames.
    pub fn list(&self) -> Vec<PlayerInfo> {
        let mut infos: Vec<PlayerInfo> = self
            .sessions
            .values()
            .filter(|s| s.connected)
            .map(PlayerSession::info)
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Drops sessions whose disconnect outlived the grace period. Returns
    /// the removed ids.
    pub fn sweep(&mut self, ttl: Duration) -> Vec<u64> {
        let expired: Vec<u64> = self
            .sessions
            .values()
            .filter(|s| {
                !s.connected
                    && s.disconnected_at
                        .is_some_and(|at| at.elapsed() >= ttl)
            })
            .map(|s| s.id)
            .collect();

        for id in &expired {
            if let Some(session) = self.sessions.remove(id) {
                info!(
                    "Session {id} ('{}') expired after idle grace period",
                    session.name
                );
            }
        }
        expired
    }
}
