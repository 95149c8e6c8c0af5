use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
pub use uuid::Uuid;

/// ---- Game phases ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Lobby,
    Playing,
    Review,
    Results,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Lobby
    }
}

/// ---- Tri-state correctness ----
///
/// Host-assigned, per guessed field, per round. `Unset` is a first-class
/// state: a player whose guess was never marked scores the same as one
/// marked incorrect, but the two are distinguishable on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Correctness {
    Unset,
    Correct,
    Incorrect,
}

impl Default for Correctness {
    fn default() -> Self {
        Correctness::Unset
    }
}

impl Correctness {
    /// Whether a point is currently awarded for this field.
    pub fn awarded(self) -> bool {
        matches!(self, Correctness::Correct)
    }
}

/// ---- Guessed fields ----
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessField {
    Title,
    Artist,
}

impl GuessField {
    /// Maps the wire string; anything unrecognized is None so callers can
    /// drop the mark without erroring.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "title" => Some(GuessField::Title),
            "artist" => Some(GuessField::Artist),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: Uuid,
    pub name: String,
    pub score: u32,
    pub title_guess: String,
    pub artist_guess: String,
    pub submitted: bool,
    pub title_correct: Correctness,
    pub artist_correct: Correctness,
}

impl Player {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Player {
            id,
            name: name.into(),
            score: 0,
            title_guess: String::new(),
            artist_guess: String::new(),
            submitted: false,
            title_correct: Correctness::Unset,
            artist_correct: Correctness::Unset,
        }
    }

    /// Clears everything scoped to a single song round. Score survives.
    pub fn reset_round(&mut self) {
        self.title_guess.clear();
        self.artist_guess.clear();
        self.submitted = false;
        self.title_correct = Correctness::Unset;
        self.artist_correct = Correctness::Unset;
    }

    /// Round fields plus score, for a fresh game run.
    pub fn reset_for_new_game(&mut self) {
        self.score = 0;
        self.reset_round();
    }
}

/// Full room snapshot. This is also the `room_state` broadcast payload;
/// everyone in a room sees everyone's guesses and marks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_code: String,
    pub song_count: u32,
    pub phase: Phase,
    pub current_song_index: u32,
    pub host_id: Uuid,
    pub players: Vec<Player>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(room_code: String, song_count: u32, host: Player) -> Self {
        Room {
            room_code,
            song_count,
            phase: Phase::Lobby,
            current_song_index: 0,
            host_id: host.id,
            players: vec![host],
            created_at: Utc::now(),
        }
    }

    pub fn player(&self, id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: Uuid) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// Lobby-browser view: counts only, never the roster.
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_code: self.room_code.clone(),
            phase: self.phase,
            player_count: self.players.len(),
            song_count: self.song_count,
            current_song_index: self.current_song_index,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_code: String,
    pub phase: Phase,
    pub player_count: usize,
    pub song_count: u32,
    pub current_song_index: u32,
    pub created_at: DateTime<Utc>,
}

/// Uniform sample over the 6-digit code space. Uniqueness against live rooms
/// is the registry's job (rejection-and-retry).
pub fn random_room_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()) && !code.starts_with('0')
}

/// Every frame on the wire is `{ "type": "...", "payload": {...} }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientToServer {
    CreateRoom {
        name: String,
        song_count: u32,
    },
    JoinRoom {
        name: String,
        room_code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<Uuid>,
    },
    StartGame {
        room_code: String,
    },
    SubmitGuess {
        room_code: String,
        player_id: Uuid,
        title_guess: String,
        artist_guess: String,
    },
    OpenReview {
        room_code: String,
    },
    MarkPlayer {
        room_code: String,
        player_id: Uuid,
        /// Raw on purpose: unknown fields are dropped server-side, not
        /// rejected at decode time.
        field: String,
        correct: bool,
    },
    NextSong {
        room_code: String,
    },
    Restart {
        room_code: String,
    },
    DeleteRoom {
        room_code: String,
    },
    ListRooms {},
    Pong {},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerToClient {
    Welcome {
        room_code: String,
        player_id: Uuid,
    },
    /// The payload is the full room object, not a wrapper around one.
    RoomState(Room),
    RoomsList {
        rooms: Vec<RoomSummary>,
    },
    RoomDeleted {
        room_code: String,
    },
    Error {
        message: String,
    },
    Ping {},
}
