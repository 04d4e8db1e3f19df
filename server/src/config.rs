//! Runtime configuration for the coordinator and the network layer.
//!
//! Every duration here is also shown to players as a countdown, so clients
//! must be built against the same values. The defaults mirror the constants
//! exported by `shared`.

use shared::{
    ALL_GUESSED_BUFFER_SECONDS, CHOOSE_SECONDS, DISPOSE_SECONDS, DRAW_SECONDS,
    GRACE_PERIOD_SECONDS, ROUND_DELAY_SECONDS, WORD_CHOICES,
};
use std::path::PathBuf;
use std::time::Duration;

/// Phase lengths and room limits used by the round state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    /// Seconds the drawer has to pick a word
    pub choose_seconds: u32,
    /// Seconds of drawing per round
    pub draw_seconds: u32,
    /// Countdown ceiling once every guesser has the word
    pub all_guessed_buffer_seconds: u32,
    /// Pause between a round ending and the next drawer choosing
    pub round_delay: Duration,
    /// How long a disconnected player keeps their seat
    pub grace_period: Duration,
    /// How long a finished (or never joined) room lingers
    pub dispose_after: Duration,
    pub word_choices: usize,
    pub min_players_to_start: usize,
    pub default_max_players: usize,
    pub default_max_rounds: u32,
    pub max_players_cap: usize,
    pub max_rounds_cap: u32,
    /// Queued players needed before matchmaking opens a room
    pub matchmaking_size: usize,
    /// Window in which an identical chat line counts as a retransmission
    pub duplicate_window: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            choose_seconds: CHOOSE_SECONDS,
            draw_seconds: DRAW_SECONDS,
            all_guessed_buffer_seconds: ALL_GUESSED_BUFFER_SECONDS,
            round_delay: Duration::from_secs(ROUND_DELAY_SECONDS as u64),
            grace_period: Duration::from_secs(GRACE_PERIOD_SECONDS as u64),
            dispose_after: Duration::from_secs(DISPOSE_SECONDS as u64),
            word_choices: WORD_CHOICES,
            min_players_to_start: 2,
            default_max_players: 8,
            default_max_rounds: 3,
            max_players_cap: 16,
            max_rounds_cap: 10,
            matchmaking_size: 4,
            duplicate_window: Duration::from_secs(1),
        }
    }
}

/// Settings for the transport and process-level adapters.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    /// Interval at which due timers are fired
    pub tick_duration: Duration,
    pub max_connections: usize,
    /// Connections silent for this long are treated as dropped
    pub idle_timeout: Duration,
    /// Append-only record journal; persistence is disabled when absent
    pub journal: Option<PathBuf>,
    /// Newline separated word list replacing the built-in catalog
    pub words_file: Option<PathBuf>,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            tick_duration: Duration::from_millis(100),
            max_connections: 256,
            idle_timeout: Duration::from_secs(60),
            journal: None,
            words_file: None,
            game: GameConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_shared_constants() {
        let config = GameConfig::default();
        assert_eq!(config.choose_seconds, 15);
        assert_eq!(config.draw_seconds, 80);
        assert_eq!(config.all_guessed_buffer_seconds, 5);
        assert_eq!(config.round_delay, Duration::from_secs(3));
        assert_eq!(config.grace_period, Duration::from_secs(5));
        assert_eq!(config.dispose_after, Duration::from_secs(30));
        assert_eq!(config.word_choices, 3);
    }

    #[test]
    fn test_room_limits_are_consistent() {
        let config = GameConfig::default();
        assert!(config.min_players_to_start >= 2);
        assert!(config.default_max_players <= config.max_players_cap);
        assert!(config.default_max_rounds <= config.max_rounds_cap);
        assert!(config.matchmaking_size <= config.default_max_players);
    }
}
