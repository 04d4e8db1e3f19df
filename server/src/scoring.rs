//! Chat handling and guess evaluation.
//!
//! Every chat line while drawing is a guess. A correct guess scores the
//! guesser `100 + time_left / 10` and the drawer a flat 50, once per player
//! per round. The text of a correct guess is only shown to the guesser;
//! everyone else sees it masked.

use crate::broadcast::broadcast_state;
use crate::persistence::Record;
use crate::room::{RecentMessage, Room, RECENT_MESSAGE_LIMIT};
use crate::round::{self, RoundContext};
use log::{debug, info};
use shared::{mask_word, ChatBroadcast, RoomStatus, ServerEvent};
use std::time::{Duration, Instant};

pub const GUESS_BASE_POINTS: u32 = 100;
pub const TIME_BONUS_DIVISOR: u32 = 10;
pub const DRAWER_POINTS: u32 = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct GuessOutcome {
    pub is_correct: bool,
    pub chat: ChatBroadcast,
}

/// Points for a correct guess with `time_left` seconds remaining.
pub fn guess_points(time_left: u32) -> u32 {
    GUESS_BASE_POINTS + time_left / TIME_BONUS_DIVISOR
}

/// Case-insensitive, whitespace-trimmed comparison against the secret word.
pub fn is_match(guess: &str, word: &str) -> bool {
    guess.trim().to_lowercase() == word.trim().to_lowercase()
}

/// Handles one chat line from `player_id`.
///
/// Returns `None` when the line is a retransmission of one the same player
/// sent within the duplicate window; nothing is broadcast or scored then.
pub fn submit_guess(
    room: &mut Room,
    player_id: &str,
    text: &str,
    timestamp: u64,
    ctx: &mut RoundContext,
    now: Instant,
) -> Option<GuessOutcome> {
    if is_duplicate(room, player_id, text, now, ctx.config.duplicate_window) {
        debug!("Dropping duplicate chat from {} in room {}", player_id, room.code);
        return None;
    }
    remember(room, player_id, text, now);

    let is_guess = room.status == RoomStatus::Drawing;
    let is_correct = is_guess
        && !room.is_drawer(player_id)
        && !room.correct_guessers.contains(player_id)
        && room
            .current_word
            .as_deref()
            .map_or(false, |word| is_match(text, word));

    let username = room
        .player(player_id)
        .map(|p| p.username.clone())
        .unwrap_or_default();
    let chat = ChatBroadcast {
        player_id: player_id.to_string(),
        username,
        message: text.to_string(),
        timestamp,
        is_correct,
    };

    ctx.persistence.record(Record::SaveChat {
        game_id: room.game_id,
        player_id: player_id.to_string(),
        message: text.to_string(),
        is_guess,
        is_correct,
    });

    if is_correct {
        award_correct_guess(room, player_id, ctx);

        let masked = ChatBroadcast {
            message: mask_word(text),
            ..chat.clone()
        };
        ctx.outbox
            .to_room_except(&room.code, player_id, ServerEvent::Chat(masked));
        ctx.outbox
            .to_player(&room.code, player_id, ServerEvent::Chat(chat.clone()));
        broadcast_state(room, ctx.outbox);

        round::check_all_guessed(room, ctx, now);
    } else {
        ctx.outbox.to_room(&room.code, ServerEvent::Chat(chat.clone()));
    }

    Some(GuessOutcome { is_correct, chat })
}

fn award_correct_guess(room: &mut Room, player_id: &str, ctx: &mut RoundContext) {
    room.correct_guessers.insert(player_id.to_string());

    let points = guess_points(room.time_left);
    let total = room.award(player_id, points).unwrap_or(points);
    ctx.persistence.record(Record::UpdateParticipantScore {
        game_id: room.game_id,
        player_id: player_id.to_string(),
        score: total,
    });
    info!(
        "Player {} guessed the word in room {} (+{})",
        player_id, room.code, points
    );

    if let Some(drawer) = room.current_drawer.clone() {
        if let Some(total) = room.award(&drawer, DRAWER_POINTS) {
            ctx.persistence.record(Record::UpdateParticipantScore {
                game_id: room.game_id,
                player_id: drawer,
                score: total,
            });
        }
    }
}

fn is_duplicate(room: &Room, player_id: &str, text: &str, now: Instant, window: Duration) -> bool {
    room.recent_messages.iter().any(|m| {
        m.player_id == player_id && m.text == text && now.saturating_duration_since(m.at) < window
    })
}

fn remember(room: &mut Room, player_id: &str, text: &str, now: Instant) {
    room.recent_messages.push_back(RecentMessage {
        player_id: player_id.to_string(),
        text: text.to_string(),
        at: now,
    });
    while room.recent_messages.len() > RECENT_MESSAGE_LIMIT {
        room.recent_messages.pop_front();
    }
}
