//! Joining, reconnecting and leaving rooms.
//!
//! A dropped connection never removes a player directly. The player gets a
//! pending departure with a deadline; if any connection re-binds the player
//! before the deadline the departure is cancelled, otherwise it is applied
//! on the next tick.

use crate::broadcast::broadcast_state;
use crate::error::GameError;
use crate::persistence::Record;
use crate::room::{Player, Room};
use crate::round::{self, RoundContext};
use crate::scheduler::TimerKind;
use log::{debug, info};
use shared::{PlayerProfile, RoomStatus};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new seat was taken
    Joined,
    /// The player was already seated; any pending departure was cancelled
    AlreadyMember,
    /// A previously removed player came back with their old score
    Resumed,
}

/// Seats a player. Joining twice is a no-op.
pub fn join(
    room: &mut Room,
    profile: &PlayerProfile,
    ctx: &mut RoundContext,
) -> Result<JoinOutcome, GameError> {
    if room.is_member(&profile.id) {
        cancel_departure(room, &profile.id);
        return Ok(JoinOutcome::AlreadyMember);
    }
    if room.is_full() {
        return Err(GameError::RoomFull);
    }

    seat(room, profile, 0);
    ctx.persistence.record(Record::AddParticipant {
        game_id: room.game_id,
        player_id: profile.id.clone(),
    });
    info!("Player {} joined room {}", profile.id, room.code);
    Ok(JoinOutcome::Joined)
}

/// Re-binds a player after a dropped connection.
///
/// Within the grace period this only cancels the pending departure. After
/// removal the player is seated again with the score they left with.
pub fn reconnect(
    room: &mut Room,
    profile: &PlayerProfile,
    ctx: &mut RoundContext,
) -> Result<JoinOutcome, GameError> {
    if room.is_member(&profile.id) {
        cancel_departure(room, &profile.id);
        debug!("Player {} reconnected to room {}", profile.id, room.code);
        return Ok(JoinOutcome::AlreadyMember);
    }

    let Some(score) = room.departed_scores.get(&profile.id).copied() else {
        return join(room, profile, ctx);
    };
    if room.is_full() {
        return Err(GameError::RoomFull);
    }

    room.departed_scores.remove(&profile.id);
    seat(room, profile, score);
    info!(
        "Player {} rejoined room {} with score {}",
        profile.id, room.code, score
    );
    Ok(JoinOutcome::Resumed)
}

fn seat(room: &mut Room, profile: &PlayerProfile, score: u32) {
    room.add_player(Player::from_profile(profile, score));
    if !room.has_started() && room.timer.kind() == Some(TimerKind::Dispose) {
        room.timer.cancel();
    }
}

/// Starts the grace period for a player whose last connection closed.
pub fn schedule_departure(room: &mut Room, player_id: &str, now: Instant, grace: Duration) {
    if room.is_member(player_id) {
        debug!(
            "Player {} left room {}, removing in {:?} unless they return",
            player_id, room.code, grace
        );
        room.pending_departures
            .insert(player_id.to_string(), now + grace);
    }
}

pub fn cancel_departure(room: &mut Room, player_id: &str) -> bool {
    room.pending_departures.remove(player_id).is_some()
}

/// Applies every departure whose grace period has elapsed.
///
/// Returns true when the room is empty with nobody pending and should be
/// disposed.
pub fn expire_departures(room: &mut Room, ctx: &mut RoundContext, now: Instant) -> bool {
    let mut due: Vec<_> = room
        .pending_departures
        .iter()
        .filter(|(_, deadline)| **deadline <= now)
        .map(|(id, deadline)| (*deadline, id.clone()))
        .collect();
    due.sort();

    for (_, player_id) in due {
        room.pending_departures.remove(&player_id);
        remove_departed(room, &player_id, ctx, now);
    }

    should_dispose(room)
}

pub fn should_dispose(room: &Room) -> bool {
    room.is_empty() && room.pending_departures.is_empty()
}

fn remove_departed(room: &mut Room, player_id: &str, ctx: &mut RoundContext, now: Instant) {
    let was_drawer = room.is_drawer(player_id);
    if room.remove_player(player_id).is_none() {
        return;
    }
    info!("Player {} removed from room {}", player_id, room.code);

    if room.is_empty() {
        room.timer.cancel();
        return;
    }

    if room.host_id == player_id {
        room.host_id = room.players[0].id.clone();
        info!("Room {} host is now {}", room.code, room.host_id);
    }

    let mid_round = matches!(room.status, RoomStatus::Choosing | RoomStatus::Drawing);
    if was_drawer && mid_round {
        round::end_round(room, ctx, now);
        return;
    }

    round::check_all_guessed(room, ctx, now);
    broadcast_state(room, ctx.outbox);
}
