use serde::{Deserialize, Serialize};

/// Closed block taxonomy. Wire frames carry the snake_case tag; anything a
/// newer client sends that we do not recognize lands on `Unknown` instead of
/// failing the whole envelope.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Grass,
    Stone,
    Sand,
    Brick,
    Camera,
    User,
    #[serde(other)]
    Unknown,
}

impl BlockKind {
    /// Stable tag used for block_id prefixes and hashing.
    pub fn tag(&self) -> &'static str {
        match self {
            BlockKind::Grass => "grass",
            BlockKind::Stone => "stone",
            BlockKind::Sand => "sand",
            BlockKind::Brick => "brick",
            BlockKind::Camera => "camera",
            BlockKind::User => "user",
            BlockKind::Unknown => "unknown",
        }
    }

    /// Default collision flag. User cubes are markers, not obstacles.
    pub fn solid(&self) -> bool {
        !matches!(self, BlockKind::User)
    }

    /// Kinds that get a block_id handle when placed in the world.
    pub fn addressable(&self) -> bool {
        matches!(self, BlockKind::Camera | BlockKind::User)
    }
}
