//! Best-effort durability for game sessions.
//!
//! The coordinator never waits on storage. Every write is a [`Record`] pushed
//! onto an unbounded channel; a blocking worker drains the channel into a
//! [`Store`] and logs whatever fails. A game runs exactly the same with
//! persistence disabled, it just leaves no trace.

pub mod journal;
pub mod memory;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use journal::JournalStore;
pub use memory::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Waiting,
    Playing,
    Finished,
}

/// One durable write. Round rows are keyed by `(game_id, round_number)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    CreateSession {
        game_id: u64,
        room_code: String,
        host_id: String,
        max_players: usize,
        max_rounds: u32,
    },
    UpdateSession {
        game_id: u64,
        status: Option<SessionStatus>,
        current_round: Option<u32>,
    },
    AddParticipant {
        game_id: u64,
        player_id: String,
    },
    UpdateParticipantScore {
        game_id: u64,
        player_id: String,
        score: u32,
    },
    CreateRound {
        game_id: u64,
        round_number: u32,
        drawer_id: String,
        word: String,
    },
    EndRound {
        game_id: u64,
        round_number: u32,
    },
    SaveChat {
        game_id: u64,
        player_id: String,
        message: String,
        is_guess: bool,
        is_correct: bool,
    },
    /// `stroke` is the client's JSON payload, stored verbatim
    SaveStroke {
        game_id: u64,
        round_number: Option<u32>,
        player_id: String,
        stroke: String,
    },
    ClearStrokes {
        game_id: u64,
        round_number: u32,
    },
    UpdateUserStats {
        user_id: String,
        score_gained: u32,
        won: bool,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Destination for records. Runs on a blocking thread.
pub trait Store: Send {
    fn apply(&mut self, record: &Record) -> Result<(), StoreError>;

    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Fire-and-forget handle used by the coordinator.
#[derive(Debug, Clone, Default)]
pub struct Persistence {
    tx: Option<mpsc::UnboundedSender<Record>>,
}

impl Persistence {
    /// Drops every record.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Hands back the receiving side instead of spawning a worker.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Record>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Starts a blocking worker that drains records into `store`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S: Store + 'static>(store: S) -> (Self, JoinHandle<()>) {
        let (persistence, rx) = Self::channel();
        let handle = tokio::task::spawn_blocking(move || drain(rx, store));
        (persistence, handle)
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn record(&self, record: Record) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.send(record) {
                warn!("Persistence worker gone, dropping record: {:?}", e.0);
            }
        }
    }
}

/// Applies records until every sender is dropped.
pub fn drain<S: Store>(mut rx: mpsc::UnboundedReceiver<Record>, mut store: S) {
    let mut applied = 0u64;
    let mut failed = 0u64;

    while let Some(record) = rx.blocking_recv() {
        match store.apply(&record) {
            Ok(()) => applied += 1,
            Err(e) => {
                failed += 1;
                warn!("Failed to persist {:?}: {}", record, e);
            }
        }
        debug!("Persisted {} records ({} failed)", applied, failed);
    }

    if let Err(e) = store.flush() {
        warn!("Failed to flush store: {}", e);
    }
    info!(
        "Persistence worker stopped after {} records ({} failed)",
        applied, failed
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(message: &str) -> Record {
        Record::SaveChat {
            game_id: 1,
            player_id: "p1".to_string(),
            message: message.to_string(),
            is_guess: false,
            is_correct: false,
        }
    }

    #[test]
    fn test_disabled_persistence_drops_records() {
        let persistence = Persistence::disabled();
        assert!(!persistence.is_enabled());
        persistence.record(chat("hello"));
    }

    #[test]
    fn test_channel_delivers_in_order() {
        let (persistence, mut rx) = Persistence::channel();
        persistence.record(chat("one"));
        persistence.record(chat("two"));

        assert_eq!(rx.try_recv().unwrap(), chat("one"));
        assert_eq!(rx.try_recv().unwrap(), chat("two"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_record_after_worker_gone_does_not_panic() {
        let (persistence, rx) = Persistence::channel();
        drop(rx);
        persistence.record(chat("lost"));
    }

    #[tokio::test]
    async fn test_worker_drains_into_store() {
        let store = MemoryStore::new();
        let (persistence, handle) = Persistence::spawn(store.clone());

        persistence.record(chat("one"));
        persistence.record(chat("two"));
        drop(persistence);

        tokio_test::assert_ok!(handle.await);
        assert_eq!(store.records(), vec![chat("one"), chat("two")]);
    }

    #[tokio::test]
    async fn test_worker_survives_failing_store() {
        let store = MemoryStore::failing();
        let (persistence, handle) = Persistence::spawn(store.clone());

        persistence.record(chat("one"));
        persistence.record(chat("two"));
        drop(persistence);

        tokio_test::assert_ok!(handle.await);
        assert!(store.records().is_empty());
        assert_eq!(store.failures(), 2);
    }
}
