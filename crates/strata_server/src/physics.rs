use std::time::Duration;

use glam::{IVec3, Vec3};
use tracing::warn;

use crate::session::PlayerSession;
use crate::world::WorldStore;

pub const GRAVITY: f32 = 20.0;
pub const TERMINAL_VELOCITY: f32 = 50.0;

pub const PLAYER_HALF_WIDTH: f32 = 0.3;
pub const PLAYER_HEIGHT: f32 = 1.8;

/// Largest single collision step; keeps a terminal-velocity fall from
/// tunneling through a one-block surface.
const MAX_SUBSTEP: f32 = 0.4;
const SKIN: f32 = 1.0e-4;

/// True when the player box with its feet at `pos` overlaps any solid block.
fn collides(world: &WorldStore, pos: Vec3) -> bool {
    let min = Vec3::new(pos.x - PLAYER_HALF_WIDTH, pos.y, pos.z - PLAYER_HALF_WIDTH);
    let max = Vec3::new(
        pos.x + PLAYER_HALF_WIDTH,
        pos.y + PLAYER_HEIGHT,
        pos.z + PLAYER_HALF_WIDTH,
    );

    let lo = min.floor().as_ivec3();
    let hi = (max - SKIN).floor().as_ivec3();

    for x in lo.x..=hi.x {
        for y in lo.y..=hi.y {
            for z in lo.z..=hi.z {
                if world
                    .get(IVec3::new(x, y, z))
                    .is_some_and(|kind| kind.solid())
                {
                    return true;
                }
            }
        }
    }
    false
}

/// Advances one axis of motion, stopping at the first solid contact.
/// Returns true on contact.
fn sweep_axis(world: &WorldStore, position: &mut Vec3, axis: usize, delta: f32) -> bool {
    let mut remaining = delta;
    while remaining.abs() > f32::EPSILON {
        let step = remaining.clamp(-MAX_SUBSTEP, MAX_SUBSTEP);
        let mut candidate = *position;
        candidate[axis] += step;

        if collides(world, candidate) {
            if axis == 1 && step < 0.0 {
                // Land exactly on top of the block the feet penetrated.
                let landing = candidate.y.floor() + 1.0;
                let mut snapped = *position;
                snapped.y = landing;
                if !collides(world, snapped) {
                    *position = snapped;
                }
            }
            return true;
        }

        *position = candidate;
        remaining -= step;
    }
    false
}

/// One fixed-rate integration step for a single session. Flying sessions
/// skip gravity but still collide against solid blocks. Returns true when
/// anything observable (position, velocity, on_ground) changed.
pub fn step(world: &WorldStore, session: &mut PlayerSession, dt: f32) -> bool {
    let before_position = session.position;
    let before_velocity = session.velocity;
    let before_ground = session.on_ground;

    if !session.flying {
        session.velocity.y = (session.velocity.y - GRAVITY * dt).max(-TERMINAL_VELOCITY);
    }

    let delta = session.velocity * dt;
    let mut position = session.position;

    if sweep_axis(world, &mut position, 0, delta.x) {
        session.velocity.x = 0.0;
    }
    if sweep_axis(world, &mut position, 2, delta.z) {
        session.velocity.z = 0.0;
    }

    session.on_ground = false;
    if sweep_axis(world, &mut position, 1, delta.y) {
        if delta.y < 0.0 {
            session.on_ground = true;
        }
        session.velocity.y = 0.0;
    }

    session.position = position;

    session.position != before_position
        || session.velocity != before_velocity
        || session.on_ground != before_ground
}

/// Gate for client-submitted absolute positions. This is a teleport catcher,
/// not a physics model: the budget is speed * elapsed, floored at one tick
/// so a burst of frames cannot shrink it to zero, and capped at one second
/// so a long-idle session cannot bank an arbitrary jump.
#[derive(Debug, Clone, Copy)]
pub struct MovementValidator {
    max_speed: f32,
    tick_seconds: f32,
}

const MAX_ELAPSED_WINDOW: f32 = 1.0;

impl MovementValidator {
    pub fn new(max_speed: f32, tick_duration: Duration) -> Self {
        Self {
            max_speed,
            tick_seconds: tick_duration.as_secs_f32(),
        }
    }

    pub fn check(&self, session: &PlayerSession, proposed: Vec3) -> bool {
        let elapsed = session
            .last_move
            .elapsed()
            .as_secs_f32()
            .clamp(self.tick_seconds, MAX_ELAPSED_WINDOW);
        let displacement = session.position.distance(proposed);
        let allowed = self.max_speed * elapsed;

        if displacement > allowed {
            warn!(
                "Rejected move for session {} ('{}'): {displacement:.2} blocks in {elapsed:.3}s exceeds {allowed:.2}",
                session.id, session.name
            );
            return false;
        }
        true
    }
}
