use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CHOOSE_SECONDS: u32 = 15;
pub const DRAW_SECONDS: u32 = 80;
pub const ALL_GUESSED_BUFFER_SECONDS: u32 = 5;
pub const ROUND_DELAY_SECONDS: u32 = 3;
pub const GRACE_PERIOD_SECONDS: u32 = 5;
pub const DISPOSE_SECONDS: u32 = 30;

pub const WORD_CHOICES: usize = 3;
pub const MASK_CHAR: char = '_';

pub type PlayerId = String;

/// Identity a client presents when joining a room or the matchmaking queue.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    pub id: PlayerId,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub player_id: PlayerId,
    pub username: String,
    pub message: String,
    #[serde(default)]
    pub timestamp: u64,
}

/// Events sent by clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "room:create", rename_all = "camelCase")]
    CreateRoom {
        host_id: PlayerId,
        #[serde(default)]
        max_players: Option<usize>,
        #[serde(default)]
        max_rounds: Option<u32>,
    },
    #[serde(rename = "room:join", rename_all = "camelCase")]
    JoinRoom {
        room_code: String,
        player: PlayerProfile,
    },
    #[serde(rename = "room:reconnect", rename_all = "camelCase")]
    Reconnect {
        room_code: String,
        player: PlayerProfile,
    },
    #[serde(rename = "game:start")]
    StartGame,
    #[serde(rename = "game:selectWord")]
    SelectWord { word: String },
    #[serde(rename = "game:requestState", rename_all = "camelCase")]
    RequestState { room_code: String },
    #[serde(rename = "drawing:stroke")]
    Stroke(serde_json::Value),
    #[serde(rename = "drawing:clear")]
    ClearCanvas,
    #[serde(rename = "chat:message")]
    Chat(ChatMessage),
    #[serde(rename = "matchmaking:join")]
    JoinMatchmaking { player: PlayerProfile },
    #[serde(rename = "ping")]
    Ping,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Choosing,
    Drawing,
    Finished,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub username: String,
    pub avatar_url: Option<String>,
    pub score: u32,
    pub is_drawing: bool,
    pub is_ready: bool,
}

/// Authoritative view of a room as transmitted to one viewer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameStateDto {
    pub room_code: String,
    pub host_id: PlayerId,
    pub players: Vec<PlayerView>,
    pub current_drawer: Option<PlayerId>,
    pub current_word: Option<String>,
    pub word_choices: Option<Vec<String>>,
    pub round: u32,
    pub max_rounds: u32,
    pub time_left: u32,
    pub status: RoomStatus,
    pub scores: BTreeMap<PlayerId, u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    pub id: PlayerId,
    pub username: String,
    pub score: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatBroadcast {
    pub player_id: PlayerId,
    pub username: String,
    pub message: String,
    pub timestamp: u64,
    pub is_correct: bool,
}

/// Events sent by the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "room:created", rename_all = "camelCase")]
    RoomCreated { room_code: String },
    #[serde(rename = "room:joined", rename_all = "camelCase")]
    RoomJoined { room_code: String },
    #[serde(rename = "game:started")]
    GameStarted,
    #[serde(rename = "game:state")]
    State(GameStateDto),
    #[serde(rename = "game:roundStart", rename_all = "camelCase")]
    RoundStart { round: u32, drawer_id: PlayerId },
    #[serde(rename = "game:word")]
    Word { word: String },
    #[serde(rename = "game:allGuessed")]
    AllGuessed,
    #[serde(rename = "game:roundEnd")]
    RoundEnd {
        round: u32,
        word: Option<String>,
        winner: Option<Winner>,
    },
    #[serde(rename = "game:end")]
    GameEnd { winner: Option<Winner> },
    #[serde(rename = "chat:message")]
    Chat(ChatBroadcast),
    #[serde(rename = "drawing:stroke")]
    Stroke(serde_json::Value),
    #[serde(rename = "drawing:clear")]
    ClearCanvas,
    #[serde(rename = "matchmaking:found", rename_all = "camelCase")]
    MatchFound { room_code: String },
    #[serde(rename = "pong")]
    Pong { timestamp: u64 },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Replaces every letter with [`MASK_CHAR`], keeping length and word breaks.
pub fn mask_word(word: &str) -> String {
    word.chars()
        .map(|c| if c.is_alphabetic() { MASK_CHAR } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mask_word_keeps_length() {
        assert_eq!(mask_word("cat"), "___");
        assert_eq!(mask_word("ice cream"), "___ _____");
        assert_eq!(mask_word(""), "");
    }

    #[test]
    fn test_mask_word_hides_every_letter() {
        let word = "Watermelon";
        let masked = mask_word(word);
        assert_eq!(masked.chars().count(), word.chars().count());
        assert!(masked.chars().all(|c| c == MASK_CHAR));
    }

    #[test]
    fn test_client_event_wire_names() {
        let raw = json!({
            "event": "room:join",
            "data": {
                "roomCode": "ABC123",
                "player": { "id": "p1", "username": "alice" }
            }
        });

        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        match event {
            ClientEvent::JoinRoom { room_code, player } => {
                assert_eq!(room_code, "ABC123");
                assert_eq!(player.id, "p1");
                assert_eq!(player.avatar_url, None);
            }
            _ => panic!("Wrong event type after deserialization"),
        }
    }

    #[test]
    fn test_unit_client_event() {
        let event: ClientEvent = serde_json::from_str(r#"{"event":"game:start"}"#).unwrap();
        assert_eq!(event, ClientEvent::StartGame);
    }

    #[test]
    fn test_create_room_limits_are_optional() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"room:create","data":{"hostId":"p1"}}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::CreateRoom {
                host_id: "p1".to_string(),
                max_players: None,
                max_rounds: None,
            }
        );
    }

    #[test]
    fn test_stroke_payload_is_opaque() {
        let raw = json!({
            "event": "drawing:stroke",
            "data": { "points": [[1, 2], [3, 4]], "color": "#000" }
        });

        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        match event {
            ClientEvent::Stroke(payload) => assert_eq!(payload["color"], "#000"),
            _ => panic!("Wrong event type after deserialization"),
        }
    }

    #[test]
    fn test_state_event_uses_camel_case() {
        let state = GameStateDto {
            room_code: "ABC123".to_string(),
            host_id: "p1".to_string(),
            players: vec![],
            current_drawer: None,
            current_word: Some("___".to_string()),
            word_choices: None,
            round: 1,
            max_rounds: 3,
            time_left: 80,
            status: RoomStatus::Drawing,
            scores: BTreeMap::new(),
        };

        let value = serde_json::to_value(ServerEvent::State(state)).unwrap();
        assert_eq!(value["event"], "game:state");
        assert_eq!(value["data"]["roomCode"], "ABC123");
        assert_eq!(value["data"]["timeLeft"], 80);
        assert_eq!(value["data"]["status"], "drawing");
    }

    #[test]
    fn test_chat_broadcast_flags_correct_guess() {
        let event = ServerEvent::Chat(ChatBroadcast {
            player_id: "p2".to_string(),
            username: "bob".to_string(),
            message: "___".to_string(),
            timestamp: 42,
            is_correct: true,
        });

        let value = serde_json::to_value(event).unwrap();
        assert_eq!(value["event"], "chat:message");
        assert_eq!(value["data"]["isCorrect"], true);
        assert_eq!(value["data"]["playerId"], "p2");
    }
}
