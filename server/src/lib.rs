//! # Drawing Game Server Library
//!
//! This library provides the authoritative server for a real-time drawing and
//! guessing game. Players gather in rooms identified by short codes; each round
//! one player draws a secret word while everyone else races to guess it in chat.
//!
//! ## Core Responsibilities
//!
//! ### Room Lifecycle
//! Rooms are created on request or by the quick-play queue, fill up with
//! players, run a fixed number of rounds and are disposed after a cooldown.
//! A room nobody joins is reaped on the same timer.
//!
//! ### Round State Machine
//! Every room moves through `waiting → choosing → drawing → waiting` once per
//! round and ends in `finished`. Each phase has a countdown that the server
//! owns; clients only ever display it.
//!
//! ### Secrecy
//! The secret word leaves the server in exactly two ways: a private
//! `game:word` event to the drawer and the reveal at round end. Every state
//! snapshot carries a masked form, and word choices only appear in the
//! drawer's own snapshot.
//!
//! ### Connection Resilience
//! A dropped connection starts a short grace period. A player who reconnects
//! within it keeps their seat, score and drawing turn.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Game Loop
//! All room state is owned by one [`game::Game`] value driven from the network
//! loop. Events and timer ticks are applied strictly in sequence, so there are
//! no locks around rooms and no timer can fire against a stale phase.
//!
//! ### Explicit Time
//! Every operation takes the current [`std::time::Instant`] as an argument.
//! Tests drive whole games, countdowns included, without sleeping.
//!
//! ### Best-Effort Persistence
//! Durable writes are queued to a background worker and never awaited. A
//! failing store is logged and the game carries on.
//!
//! ## Module Organization
//!
//! - `config`: phase lengths, room limits and server settings
//! - `words`: word catalog and the fallback used when a source fails
//! - `room`, `registry`: the room aggregate and the map that owns rooms
//! - `membership`: joins, reconnects and grace-period departures
//! - `round`, `scheduler`: the phase state machine and its per-room timer
//! - `scoring`: chat, guess evaluation and points
//! - `broadcast`: per-viewer snapshots and the outbound queue
//! - `matchmaking`: the quick-play queue
//! - `persistence`: record channel, in-memory store and on-disk journal
//! - `client_manager`, `game`, `network`: connections, the coordinator and
//!   the WebSocket transport
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::game::Game;
//! use server::network::Server;
//! use server::persistence::Persistence;
//! use server::words::WordProvider;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let game = Game::new(
//!         config.game.clone(),
//!         WordProvider::catalog(),
//!         Persistence::disabled(),
//!         config.max_connections,
//!     );
//!
//!     // Accepts WebSocket clients, applies their events and fires room
//!     // timers until shut down
//!     let mut server = Server::new(&config, game).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod client_manager;
pub mod config;
pub mod error;
pub mod game;
pub mod matchmaking;
pub mod membership;
pub mod network;
pub mod persistence;
pub mod registry;
pub mod room;
pub mod round;
pub mod scheduler;
pub mod scoring;
pub mod words;
