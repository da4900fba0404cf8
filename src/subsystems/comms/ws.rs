//! `GET /ws`: live room events.
//!
//! A socket joins any number of room groups with `JoinRoomGroup`. Each
//! joined group gets a forwarding task that feeds one outbound queue; a
//! single writer task drains that queue into the socket sink.

use std::collections::HashSet;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::AppState;
use crate::subsystems::hub::{ClientMessage, GameEvent, GameHub};

const OUTBOUND_QUEUE: usize = 64;

pub(super) async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();
    run_session(&state.hub, stream, sink).await;
}

/// Serve one connection: read client messages from `incoming` until it ends
/// or closes, writing events of every joined room to `outgoing`.
async fn run_session<St, Si, E>(hub: &GameHub, mut incoming: St, mut outgoing: Si)
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    Si: Sink<Message> + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::channel::<GameEvent>(OUTBOUND_QUEUE);

    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(t) => t,
                Err(e) => {
                    warn!("cannot encode event: {e}");
                    continue;
                }
            };
            if outgoing.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut forwarders = JoinSet::new();
    let mut joined: HashSet<String> = HashSet::new();

    while let Some(Ok(msg)) = incoming.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(client_msg) => {
                    if let Some((room, rx)) = apply(hub, client_msg, &mut joined).await {
                        debug!(%room, "socket joined room group");
                        forwarders.spawn(forward(rx, out_tx.clone()));
                    }
                }
                Err(e) => {
                    let _ = out_tx.send(GameEvent::Error { message: format!("unrecognised message: {e}") }).await;
                }
            },
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    forwarders.shutdown().await;
    drop(out_tx);
    let _ = writer.await;
    debug!(rooms = joined.len(), "socket closed");
}

/// Act on one client message. Returns the new subscription when the socket
/// joined a room it was not already in.
async fn apply(
    hub: &GameHub,
    msg: ClientMessage,
    joined: &mut HashSet<String>,
) -> Option<(String, broadcast::Receiver<GameEvent>)> {
    match msg {
        ClientMessage::JoinRoomGroup { room_id } => {
            if !joined.insert(room_id.clone()) {
                return None;
            }
            let rx = hub.subscribe(&room_id).await;
            Some((room_id, rx))
        }
        ClientMessage::StartGame { room_id } => {
            hub.publish(&room_id, GameEvent::GameStarted).await;
            None
        }
        ClientMessage::SendProgress { room_id, player_name } => {
            hub.publish(&room_id, GameEvent::PlayerAnswered { player_name }).await;
            None
        }
    }
}

async fn forward(mut rx: broadcast::Receiver<GameEvent>, out: mpsc::Sender<GameEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if out.send(event).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "socket fell behind its room"),
            Err(RecvError::Closed) => break,
        }
    }
}
