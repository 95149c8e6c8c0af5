use std::collections::HashMap;

use chorus_protocol::{
    random_room_code, Correctness, GuessField, Phase, Player, Room, ServerToClient,
};
use log::{debug, info};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Handle for one open connection, minted at accept time.
pub type ConnId = Uuid;
/// Outbound channel to a connection's writer task.
pub type OutTx = mpsc::UnboundedSender<ServerToClient>;

/// What a connection currently is, inside a room. The binding never keeps a
/// room or player alive; it only routes broadcasts and authorizes actions.
pub struct Session {
    pub room_code: String,
    pub player_id: Uuid,
}

#[derive(Default)]
pub struct ServerState {
    pub rooms: HashMap<String, Room>,
    pub sessions: HashMap<ConnId, Session>,
    /// room code -> connections to push snapshots to. Kept in lockstep with
    /// `sessions` so a broadcast only scans the room's own members.
    pub subscribers: HashMap<String, HashMap<ConnId, OutTx>>,
}

#[derive(Debug, Error)]
pub enum GameError {
    #[error("invalid message frame")]
    Malformed,
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
}

fn room_not_found(code: &str) -> GameError {
    GameError::NotFound(format!("room {code} not found"))
}

/// Draw codes until one is free. The code space holds 900000 entries, so at
/// party-game room counts this resolves in O(1) expected draws.
fn unique_room_code(rooms: &HashMap<String, Room>) -> String {
    loop {
        let code = random_room_code();
        if !rooms.contains_key(&code) {
            return code;
        }
    }
}

pub fn create_room(
    st: &mut ServerState,
    conn: ConnId,
    tx: &OutTx,
    name: &str,
    song_count: u32,
) -> Result<String, GameError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GameError::Validation("name required".into()));
    }
    if song_count == 0 {
        return Err(GameError::Validation("songCount must be positive".into()));
    }

    let code = unique_room_code(&st.rooms);
    let host_id = Uuid::new_v4();
    let room = Room::new(code.clone(), song_count, Player::new(host_id, name));
    st.rooms.insert(code.clone(), room);

    bind_session(st, conn, tx.clone(), &code, host_id);
    let _ = tx.send(ServerToClient::Welcome {
        room_code: code.clone(),
        player_id: host_id,
    });
    broadcast_room(st, &code);

    info!("[CREATE] room={code} host={name} songs={song_count}");
    Ok(code)
}

pub fn join_room(
    st: &mut ServerState,
    conn: ConnId,
    tx: &OutTx,
    name: &str,
    room_code: &str,
    player_id: Option<Uuid>,
) -> Result<Uuid, GameError> {
    let name = name.trim();
    let room_code = room_code.trim();
    if name.is_empty() || room_code.is_empty() {
        return Err(GameError::Validation("name and room code required".into()));
    }

    let resolved = {
        let room = st
            .rooms
            .get_mut(room_code)
            .ok_or_else(|| room_not_found(room_code))?;
        resolve_join(room, name, player_id)
    };

    bind_session(st, conn, tx.clone(), room_code, resolved);
    let _ = tx.send(ServerToClient::Welcome {
        room_code: room_code.to_string(),
        player_id: resolved,
    });
    broadcast_room(st, room_code);

    info!("[JOIN] room={room_code} name={name} resolved={resolved}");
    Ok(resolved)
}

/// Rejoin precedence: exact id match, then exact name match, then a fresh
/// player appended to the roster tail.
fn resolve_join(room: &mut Room, name: &str, player_id: Option<Uuid>) -> Uuid {
    if let Some(id) = player_id {
        if let Some(p) = room.player_mut(id) {
            clear_pending_submission(p);
            return id;
        }
    }

    // Same display name means same person here; a client that reloaded and
    // lost its token gets its seat back this way. Two humans sharing a name
    // will merge onto one player.
    if let Some(p) = room.players.iter_mut().find(|p| p.name == name) {
        clear_pending_submission(p);
        return p.id;
    }

    let id = Uuid::new_v4();
    room.players.push(Player::new(id, name));
    id
}

/// A reconnecting player arrives mid-round with nothing submitted. Score
/// stays; correctness flags from an earlier round stay too, until the next
/// round reset clears them.
fn clear_pending_submission(p: &mut Player) {
    p.title_guess.clear();
    p.artist_guess.clear();
    p.submitted = false;
}

/// Looks up the room and checks that this connection is bound to its host.
/// All phase transitions and scoring run through this gate.
fn host_room<'a>(
    st: &'a mut ServerState,
    conn: ConnId,
    room_code: &str,
) -> Result<&'a mut Room, GameError> {
    let bound = st
        .sessions
        .get(&conn)
        .filter(|s| s.room_code == room_code)
        .map(|s| s.player_id);
    let room = st
        .rooms
        .get_mut(room_code)
        .ok_or_else(|| room_not_found(room_code))?;
    if bound != Some(room.host_id) {
        return Err(GameError::Unauthorized(
            "only the host can perform this action".into(),
        ));
    }
    Ok(room)
}

pub fn start_game(st: &mut ServerState, conn: ConnId, room_code: &str) -> Result<(), GameError> {
    let room = host_room(st, conn, room_code)?;
    room.phase = Phase::Playing;
    room.current_song_index = 0;
    for p in &mut room.players {
        p.reset_for_new_game();
    }
    broadcast_room(st, room_code);
    info!("[START] room={room_code}");
    Ok(())
}

/// Stale or late guesses (wrong phase, unknown player, dead room) are dropped
/// without an error reply.
pub fn submit_guess(
    st: &mut ServerState,
    room_code: &str,
    player_id: Uuid,
    title_guess: &str,
    artist_guess: &str,
) -> Result<(), GameError> {
    let Some(room) = st.rooms.get_mut(room_code) else {
        return Ok(());
    };
    if room.phase != Phase::Playing {
        return Ok(());
    }
    let Some(p) = room.player_mut(player_id) else {
        return Ok(());
    };

    p.title_guess = title_guess.trim().to_string();
    p.artist_guess = artist_guess.trim().to_string();
    p.submitted = true;
    broadcast_room(st, room_code);
    Ok(())
}

pub fn open_review(st: &mut ServerState, conn: ConnId, room_code: &str) -> Result<(), GameError> {
    let room = host_room(st, conn, room_code)?;
    room.phase = Phase::Review;
    broadcast_room(st, room_code);
    Ok(())
}

pub fn mark_player(
    st: &mut ServerState,
    conn: ConnId,
    room_code: &str,
    player_id: Uuid,
    field: &str,
    correct: bool,
) -> Result<(), GameError> {
    let room = host_room(st, conn, room_code)?;
    let Some(field) = GuessField::parse(field) else {
        // Unknown field: no mutation, no error.
        return Ok(());
    };
    let player = room
        .player_mut(player_id)
        .ok_or_else(|| GameError::NotFound(format!("player {player_id} not in room")))?;
    apply_mark(player, field, correct);
    broadcast_room(st, room_code);
    Ok(())
}

/// One field's mark transition. Re-marking the same state never moves the
/// score; flipping a previously-awarded field takes its point back, floored
/// at zero by the score type.
pub fn apply_mark(player: &mut Player, field: GuessField, correct: bool) {
    let slot = match field {
        GuessField::Title => &mut player.title_correct,
        GuessField::Artist => &mut player.artist_correct,
    };
    let had_point = slot.awarded();
    *slot = if correct {
        Correctness::Correct
    } else {
        Correctness::Incorrect
    };
    if correct && !had_point {
        player.score += 1;
    } else if !correct && had_point {
        player.score = player.score.saturating_sub(1);
    }
}

pub fn next_song(st: &mut ServerState, conn: ConnId, room_code: &str) -> Result<(), GameError> {
    let room = host_room(st, conn, room_code)?;
    if room.current_song_index + 1 < room.song_count {
        room.current_song_index += 1;
        room.phase = Phase::Playing;
        for p in &mut room.players {
            p.reset_round();
        }
    } else {
        room.phase = Phase::Results;
    }
    broadcast_room(st, room_code);
    Ok(())
}

/// Back to the lobby with scores intact; `start_game` is the one that zeroes
/// them.
pub fn restart(st: &mut ServerState, conn: ConnId, room_code: &str) -> Result<(), GameError> {
    let room = host_room(st, conn, room_code)?;
    room.phase = Phase::Lobby;
    room.current_song_index = 0;
    for p in &mut room.players {
        p.reset_round();
    }
    broadcast_room(st, room_code);
    Ok(())
}

pub fn delete_room(st: &mut ServerState, conn: ConnId, room_code: &str) -> Result<(), GameError> {
    host_room(st, conn, room_code)?;
    if let Some(subs) = st.subscribers.get(room_code) {
        for tx in subs.values() {
            let _ = tx.send(ServerToClient::RoomDeleted {
                room_code: room_code.to_string(),
            });
        }
    }
    remove_room(st, room_code);
    info!("[DELETE] room={room_code}");
    Ok(())
}

pub fn list_rooms(st: &ServerState, tx: &OutTx) {
    let rooms = st.rooms.values().map(Room::summary).collect();
    let _ = tx.send(ServerToClient::RoomsList { rooms });
}

/// Points the connection at `(room_code, player_id)`, dropping any previous
/// binding and subscription first. A connection is in at most one room.
pub fn bind_session(
    st: &mut ServerState,
    conn: ConnId,
    tx: OutTx,
    room_code: &str,
    player_id: Uuid,
) {
    if let Some(prev) = st.sessions.remove(&conn) {
        unsubscribe(st, &prev.room_code, conn);
    }
    st.sessions.insert(
        conn,
        Session {
            room_code: room_code.to_string(),
            player_id,
        },
    );
    st.subscribers
        .entry(room_code.to_string())
        .or_default()
        .insert(conn, tx);
}

/// The single teardown path for a closed connection, whatever closed it.
/// Host gone means the room goes with them, silently; anyone else stays in
/// the roster so a saved id can resume later.
pub fn close_connection(st: &mut ServerState, conn: ConnId) {
    let Some(session) = st.sessions.remove(&conn) else {
        return;
    };
    unsubscribe(st, &session.room_code, conn);

    let Some(room) = st.rooms.get(&session.room_code) else {
        return;
    };
    if room.host_id == session.player_id {
        remove_room(st, &session.room_code);
        info!(
            "[CLOSE] host left, room={} deleted",
            session.room_code
        );
    }
}

fn unsubscribe(st: &mut ServerState, room_code: &str, conn: ConnId) {
    if let Some(subs) = st.subscribers.get_mut(room_code) {
        subs.remove(&conn);
        if subs.is_empty() {
            st.subscribers.remove(room_code);
        }
    }
}

/// Drops the room, its subscriber set, and every binding that names it, so a
/// later room with a recycled code starts clean.
fn remove_room(st: &mut ServerState, code: &str) {
    st.rooms.remove(code);
    st.subscribers.remove(code);
    st.sessions.retain(|_, s| s.room_code != code);
}

/// Full-state fanout to the room's subscribers. No diffing: every mutation
/// ships the whole snapshot.
pub fn broadcast_room(st: &ServerState, code: &str) {
    let Some(room) = st.rooms.get(code) else {
        return;
    };
    let Some(subs) = st.subscribers.get(code) else {
        return;
    };
    for (conn, tx) in subs {
        if tx.send(ServerToClient::RoomState(room.clone())).is_err() {
            debug!("[BROADCAST] room={code} dropped send to conn={conn}");
        }
    }
}
