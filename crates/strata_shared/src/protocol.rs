use std::collections::BTreeMap;

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::block::BlockKind;

/// Everything a client may send. Frames are UTF-8 JSON text of the shape
/// `{"type": "player_move", "data": {...}}`; the adjacent tagging below maps
/// that envelope directly onto this enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    PlayerJoin {
        name: String,
    },
    PlayerMove {
        position: Vec3,
        rotation: [f32; 2],
    },
    BlockPlace {
        position: IVec3,
        block_type: BlockKind,
    },
    BlockDestroy {
        position: IVec3,
    },
    ChatMessage {
        text: String,
    },
    GetCamerasList {},
    GetUsersList {},
    GetBlocksList {
        query_type: QueryKind,
        #[serde(default)]
        position: Option<Vec3>,
        #[serde(default)]
        block_id: Option<String>,
        #[serde(default)]
        rotation: Option<[f32; 2]>,
        #[serde(default)]
        radius: Option<f32>,
        #[serde(default)]
        view_distance: Option<f32>,
    },
    PlayerDisconnect {},
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Region,
    View,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    WorldInit {
        world_size: i32,
        spawn_position: Vec3,
        player_id: u64,
    },
    WorldChunk {
        chunk_x: i32,
        chunk_z: i32,
        blocks: BTreeMap<String, BlockKind>,
    },
    /// Terminal marker of the init stream; a client is fully joined only
    /// once this has been sent.
    PlayerList {
        players: Vec<PlayerInfo>,
    },
    WorldUpdate {
        blocks: Vec<BlockChange>,
    },
    PlayerUpdate {
        id: u64,
        position: Vec3,
        rotation: [f32; 2],
        velocity: Vec3,
        on_ground: bool,
        flying: bool,
        name: String,
    },
    ChatBroadcast {
        player: String,
        message: String,
    },
    CamerasList {
        cameras: Vec<CameraInfo>,
    },
    UsersList {
        users: Vec<PlayerInfo>,
    },
    BlocksList {
        blocks: Vec<BlockInfo>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: u64,
    pub name: String,
    pub position: Vec3,
    pub rotation: [f32; 2],
    pub flying: bool,
    pub on_ground: bool,
}

/// One committed world mutation. `block_type` of None means the block was
/// destroyed; `player_id` is the session that caused it, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockChange {
    pub position: IVec3,
    pub block_type: Option<BlockKind>,
    pub player_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub position: IVec3,
    pub block_id: String,
    pub collision: bool,
    pub owner: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub position: IVec3,
    pub block_type: BlockKind,
    pub block_id: Option<String>,
    pub collision: bool,
    /// Euclidean distance from the viewpoint; present for view queries only.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub distance: Option<f32>,
}

pub fn encode(msg: &ServerMessage) -> String {
    serde_json::to_string(msg).expect("failed to encode protocol frame")
}

pub fn decode(text: &str) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_str(text)
}
