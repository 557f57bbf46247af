use std::io;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::router;
use crate::server::SharedState;

/// Accept loop. Runs until the listener fails; every accepted socket gets
/// its own connection task.
pub async fn run(state: SharedState) -> io::Result<()> {
    let addr = state.read().await.config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on ws://{addr}");

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        tokio::spawn(handle_connection(state.clone(), stream));
        debug!("Accepted TCP connection from {peer_addr}");
    }
}

/// One task per client: upgrade to WebSocket, register the peer, pump frames
/// both ways until the socket dies, then tear the peer down. Outbound frames
/// go through an unbounded channel so state handlers never await the socket.
async fn handle_connection(state: SharedState, stream: TcpStream) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(err) => {
            warn!("WebSocket handshake failed: {err}");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let conn_id = state.write().await.register_peer(tx);
    info!("Connection {conn_id} established");

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(frame).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => router::handle_frame(&state, conn_id, &text).await,
            Ok(Message::Close(_)) => break,
            // Pings are answered by the protocol layer; binary frames are
            // not part of the protocol.
            Ok(_) => {}
            Err(err) => {
                debug!("Connection {conn_id} read error: {err}");
                break;
            }
        }
    }

    state.write().await.remove_peer(conn_id);
    writer.abort();
    info!("Connection {conn_id} closed");
}
