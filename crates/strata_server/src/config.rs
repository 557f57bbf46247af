use std::time::Duration;

use glam::Vec3;

/// Every policy constant the server runs on. Tick rate and the anti-cheat
/// speed bound are configuration, not invariants; tests pin the defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub seed: u64,
    pub world_size: i32,
    /// Overrides the generated spawn column when set.
    pub spawn_position: Option<Vec3>,
    /// Physics updates per second.
    pub tick_rate: u32,
    /// Maximum plausible player speed in blocks per second; moves whose
    /// displacement exceeds this budget for the elapsed time are rejected.
    pub max_speed: f32,
    /// Grace period before a disconnected session is garbage-collected.
    pub session_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            seed: 1,
            world_size: 64,
            spawn_position: None,
            tick_rate: 20,
            max_speed: 12.0,
            session_ttl: Duration::from_secs(300),
        }
    }
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
