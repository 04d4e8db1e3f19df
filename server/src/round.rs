//! Round state machine.
//!
//! ```text
//! waiting --start--> choosing --word/timeout--> drawing --timeout/all guessed--> waiting
//!    ^                                                                            |
//!    +------------------------- inter-round delay --------------------------------+
//!                                           (last round) --> finished --cooldown--> disposed
//! ```
//!
//! Every transition cancels the previous phase timer by re-arming the room's
//! single [`TimerSlot`](crate::scheduler::TimerSlot). Timer handlers receive
//! the timer's own deadline as the logical time, so countdowns never drift and
//! a late tick catches up deterministically.

use crate::broadcast::{broadcast_state, Outbox};
use crate::config::GameConfig;
use crate::error::GameError;
use crate::persistence::{Persistence, Record, SessionStatus};
use crate::room::Room;
use crate::scheduler::{PhaseTimer, TimerKind, TICK};
use crate::words::WordProvider;
use log::{debug, info};
use shared::{RoomStatus, ServerEvent};
use std::time::Instant;

/// Collaborators a room needs while it transitions.
pub struct RoundContext<'a> {
    pub config: &'a GameConfig,
    pub words: &'a mut WordProvider,
    pub persistence: &'a Persistence,
    pub outbox: &'a mut Outbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    Continue,
    /// The room's cooldown elapsed and it should be removed from the registry
    Dispose,
}

/// Starts the game on behalf of `requester`.
///
/// Returns `Ok(false)` when the requester is not the host; that is an
/// authorization failure and is not reported.
pub fn start_game(
    room: &mut Room,
    requester: &str,
    ctx: &mut RoundContext,
    now: Instant,
) -> Result<bool, GameError> {
    if room.host_id != requester {
        debug!(
            "Ignoring start from non-host {} in room {}",
            requester, room.code
        );
        return Ok(false);
    }
    if room.has_started() || room.status != RoomStatus::Waiting {
        return Err(GameError::AlreadyStarted);
    }
    if room.players.len() < ctx.config.min_players_to_start {
        return Err(GameError::NotEnoughPlayers(ctx.config.min_players_to_start));
    }

    room.current_round = 1;
    ctx.persistence.record(Record::UpdateSession {
        game_id: room.game_id,
        status: Some(SessionStatus::Playing),
        current_round: Some(1),
    });
    info!(
        "Room {} started with {} players, {} rounds",
        room.code,
        room.players.len(),
        room.max_rounds
    );

    ctx.outbox.to_room(&room.code, ServerEvent::GameStarted);
    start_round(room, ctx, now);
    Ok(true)
}

/// Enters `choosing` for `current_round` with a round-robin drawer.
pub fn start_round(room: &mut Room, ctx: &mut RoundContext, now: Instant) {
    room.timer.cancel();
    room.correct_guessers.clear();
    room.all_guessed = false;
    room.round_recorded = false;
    room.current_word = None;

    if room.players.is_empty() {
        room.set_drawer(None);
        room.status = RoomStatus::Waiting;
        return;
    }

    let drawer_index = drawer_index(room.current_round, room.players.len());
    let drawer_id = room.players[drawer_index].id.clone();
    room.set_drawer(Some(&drawer_id));

    room.word_choices = Some(ctx.words.choices(ctx.config.word_choices));
    room.status = RoomStatus::Choosing;
    room.time_left = ctx.config.choose_seconds;
    room.timer.arm(TimerKind::Countdown, now + TICK);

    info!(
        "Room {} round {}/{}: {} is choosing",
        room.code, room.current_round, room.max_rounds, drawer_id
    );
    ctx.outbox.to_room(
        &room.code,
        ServerEvent::RoundStart {
            round: room.current_round,
            drawer_id,
        },
    );
    broadcast_state(room, ctx.outbox);
}

/// Drawer order: `(round - 1) mod players`.
pub fn drawer_index(round: u32, players: usize) -> usize {
    (round.saturating_sub(1) as usize) % players.max(1)
}

/// Handles the drawer picking a word.
///
/// Requests from anyone but the drawer, or outside `choosing`, are ignored.
pub fn select_word(
    room: &mut Room,
    player_id: &str,
    word: &str,
    ctx: &mut RoundContext,
    now: Instant,
) -> Result<(), GameError> {
    if room.status != RoomStatus::Choosing || !room.is_drawer(player_id) {
        debug!(
            "Ignoring word selection from {} in room {} ({:?})",
            player_id, room.code, room.status
        );
        return Ok(());
    }

    let offered = room
        .word_choices
        .as_ref()
        .map_or(false, |choices| choices.iter().any(|c| c == word));
    if !offered {
        return Err(GameError::InvalidWord);
    }

    begin_drawing(room, word.to_string(), ctx, now);
    Ok(())
}

fn begin_drawing(room: &mut Room, word: String, ctx: &mut RoundContext, now: Instant) {
    let Some(drawer_id) = room.current_drawer.clone() else {
        return;
    };

    ctx.persistence.record(Record::CreateRound {
        game_id: room.game_id,
        round_number: room.current_round,
        drawer_id: drawer_id.clone(),
        word: word.clone(),
    });
    room.round_recorded = ctx.persistence.is_enabled();

    room.current_word = Some(word.clone());
    room.word_choices = None;
    room.status = RoomStatus::Drawing;
    room.time_left = ctx.config.draw_seconds;
    room.timer.arm(TimerKind::Countdown, now + TICK);

    debug!("Room {} drawing started by {}", room.code, drawer_id);
    broadcast_state(room, ctx.outbox);
    ctx.outbox
        .to_player(&room.code, &drawer_id, ServerEvent::Word { word });
}

/// Runs a fired timer. `timer.due` is used as the current time.
pub fn on_timer(room: &mut Room, timer: PhaseTimer, ctx: &mut RoundContext) -> TimerOutcome {
    let at = timer.due;
    match timer.kind {
        TimerKind::Countdown => countdown(room, ctx, at),
        TimerKind::NextRound => {
            if room.status == RoomStatus::Waiting && room.has_started() {
                start_round(room, ctx, at);
            }
        }
        TimerKind::Dispose => return TimerOutcome::Dispose,
    }
    TimerOutcome::Continue
}

fn countdown(room: &mut Room, ctx: &mut RoundContext, at: Instant) {
    room.time_left = room.time_left.saturating_sub(1);

    match room.status {
        RoomStatus::Choosing => {
            if room.time_left > 0 {
                room.timer.arm(TimerKind::Countdown, at + TICK);
                return;
            }
            let first = room
                .word_choices
                .as_ref()
                .and_then(|choices| choices.first().cloned());
            match first {
                Some(word) => {
                    debug!("Room {} choose timer expired, picking first word", room.code);
                    begin_drawing(room, word, ctx, at);
                }
                None => end_round(room, ctx, at),
            }
        }
        RoomStatus::Drawing => {
            if room.time_left == 0 {
                end_round(room, ctx, at);
            } else if !room.all_guessed && room.all_non_drawers_guessed() {
                enter_all_guessed(room, ctx, at);
            } else {
                room.timer.arm(TimerKind::Countdown, at + TICK);
            }
        }
        RoomStatus::Waiting | RoomStatus::Finished => {}
    }
}

/// Shortens the round once every guesser has the word.
pub fn check_all_guessed(room: &mut Room, ctx: &mut RoundContext, now: Instant) {
    if room.status == RoomStatus::Drawing && !room.all_guessed && room.all_non_drawers_guessed() {
        enter_all_guessed(room, ctx, now);
    }
}

fn enter_all_guessed(room: &mut Room, ctx: &mut RoundContext, now: Instant) {
    room.all_guessed = true;
    room.time_left = room.time_left.min(ctx.config.all_guessed_buffer_seconds);
    info!(
        "Room {} everyone guessed, round ends in {}s",
        room.code, room.time_left
    );

    ctx.outbox.to_room(&room.code, ServerEvent::AllGuessed);
    if room.time_left == 0 {
        end_round(room, ctx, now);
    } else {
        room.timer.arm(TimerKind::Countdown, now + TICK);
        broadcast_state(room, ctx.outbox);
    }
}

/// Closes the current round and either schedules the next one or finishes.
pub fn end_round(room: &mut Room, ctx: &mut RoundContext, now: Instant) {
    room.timer.cancel();

    if room.round_recorded {
        ctx.persistence.record(Record::EndRound {
            game_id: room.game_id,
            round_number: room.current_round,
        });
    }
    ctx.persistence.record(Record::UpdateSession {
        game_id: room.game_id,
        status: None,
        current_round: Some(room.current_round),
    });

    let word = room.current_word.take();
    room.set_drawer(None);
    room.word_choices = None;
    room.time_left = 0;
    room.round_recorded = false;
    room.all_guessed = false;
    room.correct_guessers.clear();
    room.status = RoomStatus::Waiting;

    info!(
        "Room {} round {}/{} ended",
        room.code, room.current_round, room.max_rounds
    );
    ctx.outbox.to_room(
        &room.code,
        ServerEvent::RoundEnd {
            round: room.current_round,
            word,
            winner: room.leader(),
        },
    );

    if room.current_round >= room.max_rounds {
        finish_game(room, ctx, now);
    } else {
        room.current_round += 1;
        room.timer
            .arm(TimerKind::NextRound, now + ctx.config.round_delay);
        broadcast_state(room, ctx.outbox);
    }
}

fn finish_game(room: &mut Room, ctx: &mut RoundContext, now: Instant) {
    room.status = RoomStatus::Finished;
    ctx.persistence.record(Record::UpdateSession {
        game_id: room.game_id,
        status: Some(SessionStatus::Finished),
        current_round: None,
    });

    let winner = room.leader();
    for player in &room.players {
        let won = winner.as_ref().map_or(false, |w| w.id == player.id);
        ctx.persistence.record(Record::UpdateUserStats {
            user_id: player.id.clone(),
            score_gained: player.score,
            won,
        });
        ctx.persistence.record(Record::UpdateParticipantScore {
            game_id: room.game_id,
            player_id: player.id.clone(),
            score: player.score,
        });
    }

    info!(
        "Room {} finished, winner: {}",
        room.code,
        winner.as_ref().map_or("none", |w| w.id.as_str())
    );
    room.timer.arm(TimerKind::Dispose, now + ctx.config.dispose_after);
    broadcast_state(room, ctx.outbox);
    ctx.outbox
        .to_room(&room.code, ServerEvent::GameEnd { winner });
}
