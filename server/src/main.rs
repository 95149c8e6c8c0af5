use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use chorus_protocol::{ClientToServer, ServerToClient};
use futures::{SinkExt, StreamExt};
use log::{info, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

mod game;
mod logging;

use game::{ConnId, GameError, OutTx, ServerState};

// ==== knobs ====
const DEFAULT_PORT: u16 = 8787;
/// Probe cadence; a connection that lets a whole interval pass without
/// answering the previous ping is evicted.
const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct AppState {
    inner: Arc<Mutex<ServerState>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    let state = AppState {
        inner: Arc::new(Mutex::new(ServerState::default())),
    };
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("server listening on ws://{addr}/ws");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (tx_out, mut rx_out) = mpsc::unbounded_channel::<ServerToClient>();
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx_out.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let conn_id: ConnId = Uuid::new_v4();
    info!("[CONN] conn={conn_id} open");

    // The probe interval lives inside this task, so every way out of the
    // loop below cancels it along with the connection.
    let mut probe = tokio::time::interval(PING_INTERVAL);
    probe.tick().await; // the first tick completes immediately
    let mut answered = true;

    loop {
        tokio::select! {
            _ = probe.tick() => {
                if !answered {
                    info!("[LIVENESS] conn={conn_id} unresponsive, closing");
                    break;
                }
                answered = false;
                let _ = tx_out.send(ServerToClient::Ping {});
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    route_frame(&state, conn_id, &tx_out, &text, &mut answered);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            }
        }
    }

    // Single teardown path: transport close, transport error, and liveness
    // eviction all land here exactly once.
    game::close_connection(&mut state.inner.lock(), conn_id);
    writer.abort();
    info!("[CONN] conn={conn_id} closed");
}

fn route_frame(state: &AppState, conn_id: ConnId, tx: &OutTx, text: &str, answered: &mut bool) {
    let cmd = match decode_frame(text) {
        Ok(cmd) => cmd,
        Err(err) => {
            let _ = tx.send(ServerToClient::Error {
                message: err.to_string(),
            });
            return;
        }
    };

    if matches!(cmd, ClientToServer::Pong {}) {
        *answered = true;
        return;
    }

    let mut st = state.inner.lock();
    let result = match cmd {
        ClientToServer::CreateRoom { name, song_count } => {
            game::create_room(&mut st, conn_id, tx, &name, song_count).map(|_| ())
        }
        ClientToServer::JoinRoom {
            name,
            room_code,
            player_id,
        } => game::join_room(&mut st, conn_id, tx, &name, &room_code, player_id).map(|_| ()),
        ClientToServer::StartGame { room_code } => game::start_game(&mut st, conn_id, &room_code),
        ClientToServer::SubmitGuess {
            room_code,
            player_id,
            title_guess,
            artist_guess,
        } => game::submit_guess(&mut st, &room_code, player_id, &title_guess, &artist_guess),
        ClientToServer::OpenReview { room_code } => game::open_review(&mut st, conn_id, &room_code),
        ClientToServer::MarkPlayer {
            room_code,
            player_id,
            field,
            correct,
        } => game::mark_player(&mut st, conn_id, &room_code, player_id, &field, correct),
        ClientToServer::NextSong { room_code } => game::next_song(&mut st, conn_id, &room_code),
        ClientToServer::Restart { room_code } => game::restart(&mut st, conn_id, &room_code),
        ClientToServer::DeleteRoom { room_code } => game::delete_room(&mut st, conn_id, &room_code),
        ClientToServer::ListRooms {} => {
            game::list_rooms(&st, tx);
            Ok(())
        }
        ClientToServer::Pong {} => Ok(()),
    };

    if let Err(err) = result {
        warn!("[WS] conn={conn_id} rejected: {err}");
        let _ = tx.send(ServerToClient::Error {
            message: err.to_string(),
        });
    }
}

const KNOWN_TYPES: [&str; 11] = [
    "create_room",
    "join_room",
    "start_game",
    "submit_guess",
    "open_review",
    "mark_player",
    "next_song",
    "restart",
    "delete_room",
    "list_rooms",
    "pong",
];

/// Sorts decode failures into the three reportable kinds: not JSON at all,
/// JSON with an unrecognized type tag, or a known type with a bad payload.
fn decode_frame(text: &str) -> Result<ClientToServer, GameError> {
    match serde_json::from_str::<ClientToServer>(text) {
        Ok(cmd) => Ok(cmd),
        Err(_) => {
            let value: serde_json::Value =
                serde_json::from_str(text).map_err(|_| GameError::Malformed)?;
            match value.get("type").and_then(|t| t.as_str()) {
                Some(t) if KNOWN_TYPES.contains(&t) => {
                    Err(GameError::Validation(format!("invalid payload for {t}")))
                }
                Some(t) => Err(GameError::UnknownType(t.to_string())),
                None => Err(GameError::Malformed),
            }
        }
    }
}
