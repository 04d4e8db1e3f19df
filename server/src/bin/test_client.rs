use futures::{SinkExt, StreamExt};
use shared::{ChatMessage, ClientEvent, PlayerProfile, ServerEvent};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

fn encode(event: &ClientEvent) -> Result<Message, serde_json::Error> {
    Ok(Message::Text(serde_json::to_string(event)?))
}

fn chat(player: &PlayerProfile, message: String) -> ClientEvent {
    ClientEvent::Chat(ChatMessage {
        player_id: player.id.clone(),
        username: player.username.clone(),
        message,
        timestamp: get_timestamp(),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:8080".to_string());

    println!("Connecting to {}", server_url);
    let (mut ws, _) = connect_async(server_url.as_str()).await?;

    let player = PlayerProfile {
        id: format!("bot-{}", get_timestamp() % 10_000),
        username: "Test Bot".to_string(),
        avatar_url: None,
    };

    ws.send(encode(&ClientEvent::CreateRoom {
        host_id: player.id.clone(),
        max_players: Some(4),
        max_rounds: Some(1),
    })?)
    .await?;

    let mut room_code = None;
    for i in 0..10 {
        let frame = match timeout(Duration::from_secs(2), ws.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                println!("Read error: {}", e);
                break;
            }
            Ok(None) => {
                println!("Server closed the connection");
                break;
            }
            Err(_) => {
                println!("No event within 2s");
                if room_code.is_some() {
                    ws.send(encode(&ClientEvent::Ping)?).await?;
                }
                continue;
            }
        };

        let Message::Text(text) = frame else {
            continue;
        };
        match serde_json::from_str::<ServerEvent>(&text) {
            Ok(ServerEvent::RoomCreated { room_code: code }) => {
                println!("Room created: {}", code);
                ws.send(encode(&ClientEvent::JoinRoom {
                    room_code: code.clone(),
                    player: player.clone(),
                })?)
                .await?;
                room_code = Some(code);
            }
            Ok(ServerEvent::State(state)) => {
                println!(
                    "State: room={} status={:?} round={}/{} players={} timeLeft={}",
                    state.room_code,
                    state.status,
                    state.round,
                    state.max_rounds,
                    state.players.len(),
                    state.time_left
                );
                ws.send(encode(&chat(&player, format!("hello #{}", i)))?)
                    .await?;
            }
            Ok(ServerEvent::Pong { timestamp }) => {
                println!("Pong, server clock {}", timestamp);
            }
            Ok(other) => println!("Event: {:?}", other),
            Err(e) => println!("Failed to decode event: {} ({})", e, text),
        }

        sleep(Duration::from_millis(200)).await;
    }

    ws.close(None).await?;
    println!("Test client finished");
    Ok(())
}
