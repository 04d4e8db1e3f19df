//! Snapshot rendering and the outbound queue.
//!
//! Room logic never touches sockets. It pushes [`Envelope`]s addressed to an
//! [`Audience`] and the coordinator resolves audiences to connections when
//! the outbox is drained, preserving emission order.

use crate::client_manager::ConnectionId;
use crate::room::Room;
use shared::{mask_word, GameStateDto, PlayerId, PlayerView, RoomStatus, ServerEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// One transport connection, bound to a room or not
    Connection(ConnectionId),
    /// Every connection bound to the room
    Room(String),
    /// Every connection bound to the room except those of one player
    RoomExcept { room: String, player: PlayerId },
    /// Only the connections of one player in the room
    Player { room: String, player: PlayerId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub audience: Audience,
    pub event: ServerEvent,
}

#[derive(Debug, Default)]
pub struct Outbox {
    envelopes: Vec<Envelope>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, audience: Audience, event: ServerEvent) {
        self.envelopes.push(Envelope { audience, event });
    }

    pub fn to_connection(&mut self, connection: ConnectionId, event: ServerEvent) {
        self.push(Audience::Connection(connection), event);
    }

    pub fn to_room(&mut self, room: &str, event: ServerEvent) {
        self.push(Audience::Room(room.to_string()), event);
    }

    pub fn to_player(&mut self, room: &str, player: &str, event: ServerEvent) {
        self.push(
            Audience::Player {
                room: room.to_string(),
                player: player.to_string(),
            },
            event,
        );
    }

    pub fn to_room_except(&mut self, room: &str, player: &str, event: ServerEvent) {
        self.push(
            Audience::RoomExcept {
                room: room.to_string(),
                player: player.to_string(),
            },
            event,
        );
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.envelopes)
    }
}

/// Renders the room as seen by `viewer`.
///
/// The secret word only ever leaves as a mask, and word choices are only
/// present in the drawer's own view.
pub fn snapshot(room: &Room, viewer: Option<&str>) -> GameStateDto {
    let current_word = match room.status {
        RoomStatus::Drawing => room.current_word.as_deref().map(mask_word),
        _ => None,
    };

    let viewer_is_drawer = viewer.map_or(false, |v| room.is_drawer(v));
    let word_choices = match room.status {
        RoomStatus::Choosing if viewer_is_drawer => room.word_choices.clone(),
        _ => None,
    };

    GameStateDto {
        room_code: room.code.clone(),
        host_id: room.host_id.clone(),
        players: room
            .players
            .iter()
            .map(|p| PlayerView {
                id: p.id.clone(),
                username: p.username.clone(),
                avatar_url: p.avatar_url.clone(),
                score: p.score,
                is_drawing: p.is_drawing,
                is_ready: p.is_ready,
            })
            .collect(),
        current_drawer: room.current_drawer.clone(),
        current_word,
        word_choices,
        round: room.current_round,
        max_rounds: room.max_rounds,
        time_left: room.time_left,
        status: room.status,
        scores: room
            .scores
            .iter()
            .map(|(id, score)| (id.clone(), *score))
            .collect(),
    }
}

/// Queues the current state for every member of the room.
pub fn broadcast_state(room: &Room, outbox: &mut Outbox) {
    match (&room.current_drawer, room.status) {
        (Some(drawer), RoomStatus::Choosing) => {
            outbox.to_room_except(
                &room.code,
                drawer,
                ServerEvent::State(snapshot(room, None)),
            );
            outbox.to_player(
                &room.code,
                drawer,
                ServerEvent::State(snapshot(room, Some(drawer.as_str()))),
            );
        }
        _ => outbox.to_room(&room.code, ServerEvent::State(snapshot(room, None))),
    }
}

/// Queues the current state for one connection, as seen by `viewer`.
pub fn send_state(
    room: &Room,
    connection: ConnectionId,
    viewer: Option<&str>,
    outbox: &mut Outbox,
) {
    outbox.to_connection(connection, ServerEvent::State(snapshot(room, viewer)));
}
