//! Room registry: the only owner of live rooms.

use crate::config::GameConfig;
use crate::error::GameError;
use crate::persistence::{Persistence, Record};
use crate::room::Room;
use crate::scheduler::TimerKind;
use log::info;
use rand::Rng;
use std::collections::HashMap;
use std::time::Instant;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const CODE_LENGTH: usize = 6;

#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
    next_game_id: u64,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty waiting room owned by `host_id`.
    ///
    /// Limits left unset take the configured defaults. The room is armed for
    /// disposal so that a room nobody ever joins does not live forever.
    pub fn create(
        &mut self,
        host_id: &str,
        max_players: Option<usize>,
        max_rounds: Option<u32>,
        config: &GameConfig,
        persistence: &Persistence,
        now: Instant,
    ) -> Result<String, GameError> {
        let max_players = max_players.unwrap_or(config.default_max_players);
        if max_players < 2 || max_players > config.max_players_cap {
            return Err(GameError::InvalidMaxPlayers(config.max_players_cap));
        }
        let max_rounds = max_rounds.unwrap_or(config.default_max_rounds);
        if max_rounds < 1 || max_rounds > config.max_rounds_cap {
            return Err(GameError::InvalidMaxRounds(config.max_rounds_cap));
        }

        let code = self.generate_code();
        self.next_game_id += 1;
        let game_id = self.next_game_id;

        let mut room = Room::new(
            code.clone(),
            game_id,
            host_id.to_string(),
            max_players,
            max_rounds,
        );
        room.timer
            .arm(TimerKind::Dispose, now + config.dispose_after);

        persistence.record(Record::CreateSession {
            game_id,
            room_code: code.clone(),
            host_id: host_id.to_string(),
            max_players,
            max_rounds,
        });
        info!(
            "Created room {} for host {} ({} players, {} rounds)",
            code, host_id, max_players, max_rounds
        );

        self.rooms.insert(code.clone(), room);
        Ok(code)
    }

    fn generate_code(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let code: String = (0..CODE_LENGTH)
                .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
                .collect();
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    pub fn get(&self, code: &str) -> Option<&Room> {
        self.rooms.get(code)
    }

    pub fn get_mut(&mut self, code: &str) -> Option<&mut Room> {
        self.rooms.get_mut(code)
    }

    pub fn remove(&mut self, code: &str) -> Option<Room> {
        let room = self.rooms.remove(code)?;
        info!("Disposed room {}", code);
        Some(room)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rooms.contains_key(code)
    }

    /// Room codes in sorted order
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.rooms.keys().cloned().collect();
        codes.sort();
        codes
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

/// Canonical form of a user-typed room code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
