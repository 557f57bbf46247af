use std::time::Instant;

use glam::{IVec3, Vec3};
use tracing::{debug, info};

use strata_shared::block::BlockKind;
use strata_shared::protocol::{
    self, BlockChange, BlockInfo, CameraInfo, ClientMessage, QueryKind, ServerMessage,
};

use crate::server::{error_message, player_update, ServerState, SharedState};
use crate::view::{self, DEFAULT_VIEW_DISTANCE};

/// Entry point for one inbound text frame. Protocol errors are answered on
/// the same connection and never tear it down.
pub async fn handle_frame(state: &SharedState, conn_id: u64, text: &str) {
    match protocol::decode(text) {
        Ok(msg) => handle_message(state, conn_id, msg).await,
        Err(err) => {
            debug!("Connection {conn_id} sent a malformed frame: {err}");
            let state = state.read().await;
            state.send_to(conn_id, &error_message(format!("malformed message: {err}")));
        }
    }
}

pub async fn handle_message(state: &SharedState, conn_id: u64, msg: ClientMessage) {
    match msg {
        ClientMessage::PlayerJoin { name } => handle_join(state, conn_id, &name).await,
        ClientMessage::PlayerMove { position, rotation } => {
            handle_move(state, conn_id, position, rotation).await
        }
        ClientMessage::BlockPlace {
            position,
            block_type,
        } => handle_block_edit(state, conn_id, position, Some(block_type)).await,
        ClientMessage::BlockDestroy { position } => {
            handle_block_edit(state, conn_id, position, None).await
        }
        ClientMessage::ChatMessage { text } => handle_chat(state, conn_id, &text).await,
        ClientMessage::GetCamerasList {} => handle_cameras_list(state, conn_id).await,
        ClientMessage::GetUsersList {} => handle_users_list(state, conn_id).await,
        ClientMessage::GetBlocksList {
            query_type,
            position,
            block_id,
            rotation,
            radius,
            view_distance,
        } => {
            let state = state.read().await;
            let reply = match blocks_query(
                &state,
                query_type,
                position,
                block_id.as_deref(),
                rotation,
                radius,
                view_distance,
            ) {
                Ok(blocks) => ServerMessage::BlocksList { blocks },
                Err(message) => error_message(message),
            };
            state.send_to(conn_id, &reply);
        }
        ClientMessage::PlayerDisconnect {} => handle_voluntary_disconnect(state, conn_id).await,
    }
}

/// Creates or resumes the session, then streams the whole world: world_init,
/// every chunk, and the player roster as the terminal marker. The stream is
/// assembled and sent under one lock acquisition, so it is a consistent
/// snapshot and nothing broadcast mid-stream can interleave.
async fn handle_join(state: &SharedState, conn_id: u64, name: &str) {
    let mut state = state.write().await;

    // One session per transport. Rebinding would strand the old session
    // connected with nothing draining it; clients disconnect first.
    if let Some(bound) = state.peer_session(conn_id) {
        state.send_to(
            conn_id,
            &error_message(format!(
                "connection already joined as session {bound}; send player_disconnect first"
            )),
        );
        return;
    }

    let (session_id, outcome) = match state.sessions.join(name) {
        Ok(joined) => joined,
        Err(err) => {
            state.send_to(conn_id, &error_message(err.to_string()));
            return;
        }
    };
    state.attach_session(conn_id, session_id);

    state.send_to(
        conn_id,
        &ServerMessage::WorldInit {
            world_size: state.world.size(),
            spawn_position: state.sessions.spawn_position(),
            player_id: session_id,
        },
    );

    for payload in state.world.chunks() {
        state.send_to(
            conn_id,
            &ServerMessage::WorldChunk {
                chunk_x: payload.chunk.x,
                chunk_z: payload.chunk.z,
                blocks: payload.blocks,
            },
        );
    }

    state.send_to(
        conn_id,
        &ServerMessage::PlayerList {
            players: state.sessions.list(),
        },
    );
    state.mark_ready(conn_id);
    info!("Connection {conn_id} initialized as session {session_id} ({outcome:?})");

    if let Some(session) = state.sessions.get(session_id) {
        let update = player_update(session);
        state.broadcast(&update);
    }
}

async fn handle_move(state: &SharedState, conn_id: u64, position: Vec3, rotation: [f32; 2]) {
    let mut guard = state.write().await;
    let state = &mut *guard;

    let Some(session_id) = state.peer_session(conn_id) else {
        state.send_to(conn_id, &error_message("join required before moving"));
        return;
    };

    let validator = state.validator;
    let Some(session) = state.sessions.get_mut(session_id) else {
        return;
    };

    if !validator.check(session, position) {
        // Rejected: the authoritative position stands and nothing leaks
        // into broadcasts.
        return;
    }

    session.position = position;
    session.rotation = rotation;
    session.last_move = Instant::now();
    let update = player_update(session);
    state.broadcast(&update);
}

/// Applies a block mutation (place or destroy) and broadcasts the committed
/// change. The world write and the registry update happen in the same
/// critical section, so no observer can see a block without its handle or a
/// handle without its block.
async fn handle_block_edit(
    state: &SharedState,
    conn_id: u64,
    position: IVec3,
    kind: Option<BlockKind>,
) {
    let mut guard = state.write().await;
    let state = &mut *guard;

    let Some(session_id) = state.peer_session(conn_id) else {
        state.send_to(conn_id, &error_message("join required before editing blocks"));
        return;
    };

    let changed = match state.world.set(position, kind) {
        Ok(changed) => changed,
        Err(err) => {
            state.send_to(conn_id, &error_message(err.to_string()));
            return;
        }
    };
    if changed.is_empty() {
        return;
    }

    state.registry.remove(position);
    if let Some(kind) = kind {
        state.registry.place(position, kind, Some(session_id), None);
    }

    let update = ServerMessage::WorldUpdate {
        blocks: changed
            .into_iter()
            .map(|pos| BlockChange {
                position: pos,
                block_type: kind,
                player_id: Some(session_id),
            })
            .collect(),
    };
    state.broadcast(&update);
}

async fn handle_chat(state: &SharedState, conn_id: u64, text: &str) {
    let state = state.read().await;

    let Some(name) = state
        .peer_session(conn_id)
        .and_then(|id| state.sessions.get(id))
        .map(|session| session.name.clone())
    else {
        state.send_to(conn_id, &error_message("join required before chatting"));
        return;
    };

    state.broadcast(&ServerMessage::ChatBroadcast {
        player: name,
        message: text.to_string(),
    });
}

async fn handle_cameras_list(state: &SharedState, conn_id: u64) {
    let state = state.read().await;
    let cameras = state
        .registry
        .cameras()
        .into_iter()
        .map(|handle| CameraInfo {
            position: handle.position,
            block_id: handle.block_id.clone(),
            collision: handle.collision,
            owner: handle.owner,
        })
        .collect();
    state.send_to(conn_id, &ServerMessage::CamerasList { cameras });
}

async fn handle_users_list(state: &SharedState, conn_id: u64) {
    let state = state.read().await;
    state.send_to(
        conn_id,
        &ServerMessage::UsersList {
            users: state.sessions.list(),
        },
    );
}

async fn handle_voluntary_disconnect(state: &SharedState, conn_id: u64) {
    let mut state = state.write().await;
    if let Some(session_id) = state.peer_session(conn_id) {
        info!("Connection {conn_id} requested disconnect of session {session_id}");
        state.sessions.disconnect(session_id);
    }
    state.detach_session(conn_id);
}

fn blocks_query(
    state: &ServerState,
    query_type: QueryKind,
    position: Option<Vec3>,
    block_id: Option<&str>,
    rotation: Option<[f32; 2]>,
    radius: Option<f32>,
    view_distance: Option<f32>,
) -> Result<Vec<BlockInfo>, String> {
    let (origin, resolved_rotation) = resolve_viewpoint(state, position, block_id, rotation)?;

    match query_type {
        QueryKind::Region => {
            let radius = radius.ok_or("field 'radius' is required for region queries")?;
            Ok(view::region_query(
                &state.world,
                &state.registry,
                origin,
                radius,
            ))
        }
        QueryKind::View => Ok(view::view_query(
            &state.world,
            &state.registry,
            origin,
            resolved_rotation,
            view_distance.unwrap_or(DEFAULT_VIEW_DISTANCE),
        )),
    }
}

/// Turns the query's addressing fields into a concrete viewpoint. A block_id
/// takes precedence: registered blocks (cameras) use their stored position
/// and fixed rotation, user ids use the live session state. An explicit
/// rotation always overrides.
fn resolve_viewpoint(
    state: &ServerState,
    position: Option<Vec3>,
    block_id: Option<&str>,
    rotation: Option<[f32; 2]>,
) -> Result<(Vec3, [f32; 2]), String> {
    if let Some(id) = block_id {
        if let Ok(handle) = state.registry.resolve(id) {
            let origin = handle.position.as_vec3() + 0.5;
            let live_rotation = match handle.kind {
                BlockKind::User => handle
                    .owner
                    .and_then(|owner| state.sessions.get(owner))
                    .map(|session| session.rotation),
                _ => handle.rotation,
            };
            return Ok((origin, rotation.or(live_rotation).unwrap_or([0.0, 0.0])));
        }

        if let Some(session) = state.sessions.iter().find(|s| s.block_id() == id) {
            return Ok((session.position, rotation.unwrap_or(session.rotation)));
        }

        return Err(format!("unknown block_id '{id}'"));
    }

    let origin = position.ok_or("field 'position' or 'block_id' is required")?;
    Ok((origin, rotation.unwrap_or([0.0, 0.0])))
}
