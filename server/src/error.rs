use thiserror::Error;

/// Validation failures reported back to the client that caused them.
///
/// Authorization failures (a non-drawer drawing, a non-host starting) are not
/// represented here; those requests are dropped without a reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("Room is full")]
    RoomFull,
    #[error("maxPlayers must be between 2 and {0}")]
    InvalidMaxPlayers(usize),
    #[error("maxRounds must be between 1 and {0}")]
    InvalidMaxRounds(u32),
    #[error("Need at least {0} players to start")]
    NotEnoughPlayers(usize),
    #[error("Game already started")]
    AlreadyStarted,
    #[error("Word not in offered choices")]
    InvalidWord,
    #[error("Not in a room")]
    NotInRoom,
    #[error("Server full")]
    ServerFull,
    #[error("Malformed event: {0}")]
    Malformed(String),
}
