//! The room aggregate: one game session and everything it owns.
//!
//! Fields are public so the membership, round and scoring modules can drive
//! them, but anything that touches two fields which must agree (scores, the
//! drawer flag) goes through a method here.

use crate::scheduler::TimerSlot;
use shared::{PlayerId, PlayerProfile, RoomStatus, Winner};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

/// Messages kept for duplicate detection.
pub const RECENT_MESSAGE_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,
    pub avatar_url: Option<String>,
    pub score: u32,
    pub is_drawing: bool,
    pub is_ready: bool,
}

impl Player {
    pub fn from_profile(profile: &PlayerProfile, score: u32) -> Self {
        Self {
            id: profile.id.clone(),
            username: profile.username.clone(),
            avatar_url: profile.avatar_url.clone(),
            score,
            is_drawing: false,
            is_ready: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecentMessage {
    pub player_id: PlayerId,
    pub text: String,
    pub at: Instant,
}

#[derive(Debug)]
pub struct Room {
    pub code: String,
    /// Session id used for persistence records
    pub game_id: u64,
    pub host_id: PlayerId,
    /// Join order, which is also drawing order
    pub players: Vec<Player>,
    pub max_players: usize,
    pub max_rounds: u32,
    /// 0 until the game starts, then 1..=max_rounds
    pub current_round: u32,
    pub current_drawer: Option<PlayerId>,
    pub current_word: Option<String>,
    pub word_choices: Option<Vec<String>>,
    pub status: RoomStatus,
    pub time_left: u32,
    pub scores: HashMap<PlayerId, u32>,
    pub correct_guessers: HashSet<PlayerId>,
    pub timer: TimerSlot,
    /// A round row exists in persistence for `current_round`
    pub round_recorded: bool,
    /// Every guesser has the word and the buffer countdown is running
    pub all_guessed: bool,
    pub recent_messages: VecDeque<RecentMessage>,
    /// Players whose last connection dropped, with their removal deadline
    pub pending_departures: HashMap<PlayerId, Instant>,
    /// Scores of removed players, restored if they reconnect
    pub departed_scores: HashMap<PlayerId, u32>,
}

impl Room {
    pub fn new(
        code: String,
        game_id: u64,
        host_id: PlayerId,
        max_players: usize,
        max_rounds: u32,
    ) -> Self {
        Self {
            code,
            game_id,
            host_id,
            players: Vec::new(),
            max_players,
            max_rounds,
            current_round: 0,
            current_drawer: None,
            current_word: None,
            word_choices: None,
            status: RoomStatus::Waiting,
            time_left: 0,
            scores: HashMap::new(),
            correct_guessers: HashSet::new(),
            timer: TimerSlot::new(),
            round_recorded: false,
            all_guessed: false,
            recent_messages: VecDeque::with_capacity(RECENT_MESSAGE_LIMIT),
            pending_departures: HashMap::new(),
            departed_scores: HashMap::new(),
        }
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn is_member(&self, id: &str) -> bool {
        self.player(id).is_some()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn has_started(&self) -> bool {
        self.current_round > 0
    }

    pub fn is_drawer(&self, id: &str) -> bool {
        self.current_drawer.as_deref() == Some(id)
    }

    /// Appends a player with the given starting score.
    pub fn add_player(&mut self, player: Player) {
        self.scores.insert(player.id.clone(), player.score);
        self.players.push(player);
    }

    /// Removes a player, remembering their score for a later reconnect.
    pub fn remove_player(&mut self, id: &str) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id == id)?;
        let player = self.players.remove(index);
        self.scores.remove(id);
        self.correct_guessers.remove(id);
        self.departed_scores.insert(player.id.clone(), player.score);
        Some(player)
    }

    /// Marks `id` as the only drawing player, or clears the flag for everyone.
    pub fn set_drawer(&mut self, id: Option<&str>) {
        for player in &mut self.players {
            player.is_drawing = Some(player.id.as_str()) == id;
        }
        self.current_drawer = id.map(str::to_string);
    }

    /// Adds points to a player, keeping `scores` and the player's own field
    /// in step. Returns the new total.
    pub fn award(&mut self, id: &str, points: u32) -> Option<u32> {
        let player = self.players.iter_mut().find(|p| p.id == id)?;
        player.score = player.score.saturating_add(points);
        let total = player.score;
        self.scores.insert(player.id.clone(), total);
        Some(total)
    }

    /// True once at least one non-drawer exists and all of them guessed.
    pub fn all_non_drawers_guessed(&self) -> bool {
        let mut guessers = self
            .players
            .iter()
            .filter(|p| !self.is_drawer(&p.id))
            .peekable();

        guessers.peek().is_some() && guessers.all(|p| self.correct_guessers.contains(&p.id))
    }

    /// Highest score; ties go to whoever joined first.
    pub fn leader(&self) -> Option<Winner> {
        let mut best: Option<&Player> = None;
        for player in &self.players {
            if best.map_or(true, |b| player.score > b.score) {
                best = Some(player);
            }
        }

        best.map(|p| Winner {
            id: p.id.clone(),
            username: p.username.clone(),
            score: p.score,
        })
    }
}
