use std::io::{self, Write};

use chorus_protocol::{ClientToServer, Room, ServerToClient, Uuid};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🎵 Chorus CLI Client");
    println!("====================");

    print!("Enter your name: ");
    io::stdout().flush()?;
    let mut name = String::new();
    io::stdin().read_line(&mut name)?;
    let name = name.trim().to_string();

    if name.is_empty() {
        println!("❌ Name cannot be empty");
        return Ok(());
    }

    let url = std::env::var("CHORUS_URL").unwrap_or_else(|_| "ws://127.0.0.1:8787/ws".into());
    println!("🔗 Connecting to {url}...");

    let (ws_stream, _) = connect_async(&url).await?;
    println!("✅ Connected!");

    let (mut write, mut read) = ws_stream.split();

    println!("\n📋 Commands:");
    println!("  create <songs>             - host a room with that many songs");
    println!("  join <code>                - join a room (reuses your id on rejoin)");
    println!("  rooms                      - list open rooms");
    println!("  start                      - start the game (host)");
    println!("  guess <title> / <artist>   - submit a guess for the current song");
    println!("  review                     - open the review screen (host)");
    println!("  mark <n> <title|artist> <y|n> - mark player n's field (host)");
    println!("  next                       - next song, or results on the last (host)");
    println!("  restart                    - back to the lobby, scores kept (host)");
    println!("  delete                     - delete the room (host)");
    println!("  quit                       - exit");
    println!("\nType commands and press Enter:");

    // Remembered across messages so commands can reference the latest
    // snapshot, and so a rejoin can present the saved id.
    let mut my_id: Option<Uuid> = None;
    let mut room_code: Option<String> = None;
    let mut last_room: Option<Room> = None;

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                let line = line.trim();
                if line == "quit" {
                    break;
                }
                match parse_command(line, &name, my_id, room_code.as_deref(), last_room.as_ref()) {
                    Some(msg) => {
                        let json = serde_json::to_string(&msg)?;
                        write.send(Message::Text(json)).await?;
                    }
                    None => println!("❓ Unknown command: {line}"),
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(server_msg) = serde_json::from_str::<ServerToClient>(&text) else {
                            continue;
                        };
                        if matches!(server_msg, ServerToClient::Ping {}) {
                            let json = serde_json::to_string(&ClientToServer::Pong {})?;
                            write.send(Message::Text(json)).await?;
                            continue;
                        }
                        handle_server_message(server_msg, &mut my_id, &mut room_code, &mut last_room);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        println!("🔌 Connection closed by server");
                        break;
                    }
                    Some(Err(e)) => {
                        println!("❌ WebSocket error: {e}");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    println!("👋 Goodbye!");
    Ok(())
}

fn handle_server_message(
    msg: ServerToClient,
    my_id: &mut Option<Uuid>,
    room_code: &mut Option<String>,
    last_room: &mut Option<Room>,
) {
    match msg {
        ServerToClient::Welcome {
            room_code: code,
            player_id,
        } => {
            println!("👋 Welcome to room {code}! Your id: {player_id}");
            *my_id = Some(player_id);
            *room_code = Some(code);
        }
        ServerToClient::RoomState(room) => {
            print_room(&room, *my_id);
            *last_room = Some(room);
        }
        ServerToClient::RoomsList { rooms } => {
            println!("\n🏠 Open rooms ({}):", rooms.len());
            for r in rooms {
                println!(
                    "  {}  {:?}  {} players  song {}/{}",
                    r.room_code,
                    r.phase,
                    r.player_count,
                    r.current_song_index + 1,
                    r.song_count
                );
            }
        }
        ServerToClient::RoomDeleted { room_code: code } => {
            println!("🗑️  Room {code} was deleted");
            *room_code = None;
            *last_room = None;
        }
        ServerToClient::Error { message } => {
            println!("❌ Error: {message}");
        }
        ServerToClient::Ping {} => {}
    }
}

fn print_room(room: &Room, my_id: Option<Uuid>) {
    println!("\n🎶 === ROOM {} ===", room.room_code);
    println!(
        "🕹️  Phase: {:?}  (song {}/{})",
        room.phase,
        room.current_song_index + 1,
        room.song_count
    );
    println!("👥 Players ({}):", room.players.len());
    for (i, p) in room.players.iter().enumerate() {
        let host = if p.id == room.host_id { " 🎤 HOST" } else { "" };
        let you = if Some(p.id) == my_id { " 👈 YOU" } else { "" };
        let submitted = if p.submitted { " [SUBMITTED]" } else { "" };
        println!("  {}: {} ({} pts){submitted}{host}{you}", i, p.name, p.score);
        if p.submitted {
            println!(
                "     title: {:?} [{:?}]  artist: {:?} [{:?}]",
                p.title_guess, p.title_correct, p.artist_guess, p.artist_correct
            );
        }
    }
    println!("==================\n");
}

fn parse_command(
    input: &str,
    name: &str,
    my_id: Option<Uuid>,
    room_code: Option<&str>,
    last_room: Option<&Room>,
) -> Option<ClientToServer> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    if parts.is_empty() {
        return None;
    }

    match parts[0].to_lowercase().as_str() {
        "create" => {
            let song_count = parts.get(1)?.parse().ok()?;
            Some(ClientToServer::CreateRoom {
                name: name.to_string(),
                song_count,
            })
        }
        "join" => Some(ClientToServer::JoinRoom {
            name: name.to_string(),
            room_code: parts.get(1)?.to_string(),
            player_id: my_id,
        }),
        "rooms" => Some(ClientToServer::ListRooms {}),
        "start" => Some(ClientToServer::StartGame {
            room_code: room_code?.to_string(),
        }),
        "guess" => {
            let rest = input.strip_prefix(parts[0])?.trim();
            let (title, artist) = rest.split_once('/')?;
            Some(ClientToServer::SubmitGuess {
                room_code: room_code?.to_string(),
                player_id: my_id?,
                title_guess: title.trim().to_string(),
                artist_guess: artist.trim().to_string(),
            })
        }
        "review" => Some(ClientToServer::OpenReview {
            room_code: room_code?.to_string(),
        }),
        "mark" => {
            let index: usize = parts.get(1)?.parse().ok()?;
            let field = parts.get(2)?.to_string();
            let correct = matches!(*parts.get(3)?, "y" | "yes" | "true");
            let player = last_room?.players.get(index)?;
            Some(ClientToServer::MarkPlayer {
                room_code: room_code?.to_string(),
                player_id: player.id,
                field,
                correct,
            })
        }
        "next" => Some(ClientToServer::NextSong {
            room_code: room_code?.to_string(),
        }),
        "restart" => Some(ClientToServer::Restart {
            room_code: room_code?.to_string(),
        }),
        "delete" => Some(ClientToServer::DeleteRoom {
            room_code: room_code?.to_string(),
        }),
        _ => None,
    }
}
