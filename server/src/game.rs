//! The coordinator: every client event and every tick goes through [`Game`].
//!
//! `Game` is plain synchronous state owned by the network loop. It never
//! touches a socket; it queues [`ServerEvent`]s in an outbox and the caller
//! collects them with [`Game::drain_outgoing`], already resolved to
//! connection ids. Time is passed in explicitly so the whole game can be
//! driven deterministically from tests.

use crate::broadcast::{broadcast_state, send_state, Audience, Envelope, Outbox};
use crate::client_manager::{ClientManager, ConnectionId};
use crate::config::GameConfig;
use crate::error::GameError;
use crate::matchmaking::MatchmakingQueue;
use crate::membership;
use crate::persistence::{Persistence, Record};
use crate::registry::{normalize_code, RoomRegistry};
use crate::room::Room;
use crate::round::{self, RoundContext, TimerOutcome};
use crate::scoring;
use crate::words::WordProvider;
use log::{debug, info, warn};
use shared::{ChatMessage, ClientEvent, PlayerId, PlayerProfile, RoomStatus, ServerEvent};
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// One event addressed to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub connection: ConnectionId,
    pub event: ServerEvent,
}

/// What room transitions borrow, kept apart from the rooms themselves.
struct Services {
    config: GameConfig,
    words: WordProvider,
    persistence: Persistence,
    outbox: Outbox,
}

impl Services {
    fn ctx(&mut self) -> RoundContext<'_> {
        RoundContext {
            config: &self.config,
            words: &mut self.words,
            persistence: &self.persistence,
            outbox: &mut self.outbox,
        }
    }
}

pub struct Game {
    rooms: RoomRegistry,
    clients: ClientManager,
    matchmaking: MatchmakingQueue,
    services: Services,
}

impl Game {
    pub fn new(
        config: GameConfig,
        words: WordProvider,
        persistence: Persistence,
        max_connections: usize,
    ) -> Self {
        Self {
            rooms: RoomRegistry::new(),
            clients: ClientManager::new(max_connections),
            matchmaking: MatchmakingQueue::new(),
            services: Services {
                config,
                words,
                persistence,
                outbox: Outbox::new(),
            },
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn room(&self, code: &str) -> Option<&Room> {
        self.rooms.get(&normalize_code(code))
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn matchmaking(&self) -> &MatchmakingQueue {
        &self.matchmaking
    }

    pub fn config(&self) -> &GameConfig {
        &self.services.config
    }

    /// Registers a transport connection. Returns false when at capacity.
    pub fn connect(&mut self, connection: ConnectionId, addr: SocketAddr, now: Instant) -> bool {
        self.clients.add_client(connection, addr, now)
    }

    /// Records transport-level activity (pings) on a connection.
    pub fn touch(&mut self, connection: ConnectionId, now: Instant) {
        self.clients.touch(connection, now);
    }

    /// Queues an error for a connection.
    pub fn reject(&mut self, connection: ConnectionId, error: &GameError) {
        debug!("Rejecting request on connection {}: {}", connection, error);
        self.services.outbox.to_connection(
            connection,
            ServerEvent::Error {
                message: error.to_string(),
            },
        );
    }

    pub fn handle_event(&mut self, connection: ConnectionId, event: ClientEvent, now: Instant) {
        if !self.clients.contains(connection) {
            debug!("Dropping event from unknown connection {}", connection);
            return;
        }
        self.clients.touch(connection, now);

        let result = match event {
            ClientEvent::CreateRoom {
                host_id,
                max_players,
                max_rounds,
            } => self.create_room(connection, &host_id, max_players, max_rounds, now),
            ClientEvent::JoinRoom { room_code, player } => {
                self.join_room(connection, &room_code, player, false, now)
            }
            ClientEvent::Reconnect { room_code, player } => {
                self.join_room(connection, &room_code, player, true, now)
            }
            ClientEvent::StartGame => self.start_game(connection, now),
            ClientEvent::SelectWord { word } => self.select_word(connection, &word, now),
            ClientEvent::RequestState { room_code } => self.request_state(connection, &room_code),
            ClientEvent::Stroke(payload) => {
                self.relay_stroke(connection, payload);
                Ok(())
            }
            ClientEvent::ClearCanvas => {
                self.clear_canvas(connection);
                Ok(())
            }
            ClientEvent::Chat(message) => self.chat(connection, message, now),
            ClientEvent::JoinMatchmaking { player } => {
                self.join_matchmaking(connection, player, now);
                Ok(())
            }
            ClientEvent::Ping => {
                self.services.outbox.to_connection(
                    connection,
                    ServerEvent::Pong {
                        timestamp: unix_millis(),
                    },
                );
                Ok(())
            }
        };

        if let Err(e) = result {
            self.reject(connection, &e);
        }
    }

    fn create_room(
        &mut self,
        connection: ConnectionId,
        host_id: &str,
        max_players: Option<usize>,
        max_rounds: Option<u32>,
        now: Instant,
    ) -> Result<(), GameError> {
        let room_code = self.rooms.create(
            host_id,
            max_players,
            max_rounds,
            &self.services.config,
            &self.services.persistence,
            now,
        )?;
        self.services
            .outbox
            .to_connection(connection, ServerEvent::RoomCreated { room_code });
        Ok(())
    }

    fn join_room(
        &mut self,
        connection: ConnectionId,
        room_code: &str,
        player: PlayerProfile,
        resume: bool,
        now: Instant,
    ) -> Result<(), GameError> {
        let code = normalize_code(room_code);
        let room = self.rooms.get_mut(&code).ok_or(GameError::RoomNotFound)?;
        let mut ctx = self.services.ctx();
        if resume {
            membership::reconnect(room, &player, &mut ctx)?;
        } else {
            membership::join(room, &player, &mut ctx)?;
        }

        if let Some((old_room, old_player)) =
            self.clients.bind_room(connection, &code, &player.id)
        {
            self.release(&old_room, &old_player, now);
        }
        self.matchmaking.remove(&player.id);

        self.services.outbox.to_connection(
            connection,
            ServerEvent::RoomJoined {
                room_code: code.clone(),
            },
        );
        if let Some(room) = self.rooms.get(&code) {
            broadcast_state(room, &mut self.services.outbox);
            // a drawer coming back mid-round needs the word again
            if room.status == RoomStatus::Drawing && room.is_drawer(&player.id) {
                if let Some(word) = &room.current_word {
                    self.services
                        .outbox
                        .to_connection(connection, ServerEvent::Word { word: word.clone() });
                }
            }
        }
        Ok(())
    }

    /// Starts the grace period for `player` unless another of their
    /// connections is still bound to the room.
    fn release(&mut self, room_code: &str, player: &str, now: Instant) {
        if self.clients.player_connected(room_code, player) {
            return;
        }
        if let Some(room) = self.rooms.get_mut(room_code) {
            membership::schedule_departure(room, player, now, self.services.config.grace_period);
        }
    }

    fn binding(&self, connection: ConnectionId) -> Option<(String, PlayerId)> {
        self.clients
            .binding(connection)
            .map(|(room, player)| (room.to_string(), player.to_string()))
    }

    fn start_game(&mut self, connection: ConnectionId, now: Instant) -> Result<(), GameError> {
        let (code, player) = self.binding(connection).ok_or(GameError::NotInRoom)?;
        let room = self.rooms.get_mut(&code).ok_or(GameError::RoomNotFound)?;
        round::start_game(room, &player, &mut self.services.ctx(), now)?;
        Ok(())
    }

    fn select_word(
        &mut self,
        connection: ConnectionId,
        word: &str,
        now: Instant,
    ) -> Result<(), GameError> {
        let (code, player) = self.binding(connection).ok_or(GameError::NotInRoom)?;
        let room = self.rooms.get_mut(&code).ok_or(GameError::RoomNotFound)?;
        round::select_word(room, &player, word, &mut self.services.ctx(), now)
    }

    fn request_state(
        &mut self,
        connection: ConnectionId,
        room_code: &str,
    ) -> Result<(), GameError> {
        let code = normalize_code(room_code);
        let room = self.rooms.get(&code).ok_or(GameError::RoomNotFound)?;
        let viewer = self
            .clients
            .binding(connection)
            .filter(|(bound, _)| *bound == code)
            .map(|(_, player)| player);
        send_state(room, connection, viewer, &mut self.services.outbox);
        Ok(())
    }

    /// Relays a stroke from the drawer to everyone else in the room.
    fn relay_stroke(&mut self, connection: ConnectionId, payload: serde_json::Value) {
        let Some((code, player)) = self.binding(connection) else {
            return;
        };
        let Some(room) = self.rooms.get(&code) else {
            return;
        };
        if !room.is_drawer(&player) {
            debug!("Dropping stroke from non-drawer {} in room {}", player, code);
            return;
        }

        self.services.persistence.record(Record::SaveStroke {
            game_id: room.game_id,
            round_number: room.round_recorded.then_some(room.current_round),
            player_id: player.clone(),
            stroke: payload.to_string(),
        });
        self.services
            .outbox
            .to_room_except(&code, &player, ServerEvent::Stroke(payload));
    }

    fn clear_canvas(&mut self, connection: ConnectionId) {
        let Some((code, player)) = self.binding(connection) else {
            return;
        };
        let Some(room) = self.rooms.get(&code) else {
            return;
        };
        if !room.is_drawer(&player) {
            debug!("Dropping clear from non-drawer {} in room {}", player, code);
            return;
        }

        if room.round_recorded {
            self.services.persistence.record(Record::ClearStrokes {
                game_id: room.game_id,
                round_number: room.current_round,
            });
        }
        self.services
            .outbox
            .to_room_except(&code, &player, ServerEvent::ClearCanvas);
    }

    /// Chat is attributed to the connection's bound player, whatever
    /// identity the payload claims.
    fn chat(
        &mut self,
        connection: ConnectionId,
        message: ChatMessage,
        now: Instant,
    ) -> Result<(), GameError> {
        let (code, player) = self.binding(connection).ok_or(GameError::NotInRoom)?;
        let room = self.rooms.get_mut(&code).ok_or(GameError::RoomNotFound)?;
        if !room.is_member(&player) || message.message.trim().is_empty() {
            return Ok(());
        }

        let timestamp = match message.timestamp {
            0 => unix_millis(),
            t => t,
        };
        scoring::submit_guess(
            room,
            &player,
            &message.message,
            timestamp,
            &mut self.services.ctx(),
            now,
        );
        Ok(())
    }

    fn join_matchmaking(&mut self, connection: ConnectionId, player: PlayerProfile, now: Instant) {
        if let Some((old_room, old_player)) = self.clients.unbind_room(connection) {
            self.release(&old_room, &old_player, now);
        }
        self.clients.bind_player(connection, &player.id);
        self.matchmaking.enqueue(player);
        self.try_match(now);
    }

    fn try_match(&mut self, now: Instant) {
        let threshold = self.services.config.matchmaking_size;
        let max = self.services.config.default_max_players;

        while let Some(batch) = self.matchmaking.take_batch(threshold, max) {
            let Some(host) = batch.first() else {
                break;
            };
            let code = match self.rooms.create(
                &host.id,
                None,
                None,
                &self.services.config,
                &self.services.persistence,
                now,
            ) {
                Ok(code) => code,
                Err(e) => {
                    warn!("Matchmaking could not open a room: {}", e);
                    break;
                }
            };
            info!("Matchmaking opened room {} for {} players", code, batch.len());

            if let Some(room) = self.rooms.get_mut(&code) {
                let mut ctx = self.services.ctx();
                for profile in &batch {
                    if let Err(e) = membership::join(room, profile, &mut ctx) {
                        warn!("Matchmaking could not seat {}: {}", profile.id, e);
                    }
                }
            }

            for profile in &batch {
                for connection in self.clients.unplaced_connections(&profile.id) {
                    self.clients.bind_room(connection, &code, &profile.id);
                    self.services.outbox.to_connection(
                        connection,
                        ServerEvent::MatchFound {
                            room_code: code.clone(),
                        },
                    );
                }
            }
            if let Some(room) = self.rooms.get(&code) {
                broadcast_state(room, &mut self.services.outbox);
            }
        }
    }

    /// Handles a closed transport connection.
    pub fn disconnect(&mut self, connection: ConnectionId, now: Instant) {
        let Some(client) = self.clients.remove_client(connection) else {
            return;
        };

        match (client.room_code, client.player_id) {
            (Some(room), Some(player)) => self.release(&room, &player, now),
            (None, Some(player)) => {
                if self.clients.unplaced_connections(&player).is_empty()
                    && self.matchmaking.remove(&player)
                {
                    debug!("Player {} left matchmaking", player);
                }
            }
            _ => {}
        }
    }

    /// Fires due room timers and applies expired departures.
    pub fn tick(&mut self, now: Instant) {
        for code in self.rooms.codes() {
            let Some(room) = self.rooms.get_mut(&code) else {
                continue;
            };
            let mut ctx = self.services.ctx();

            let mut dispose = false;
            while let Some(timer) = room.timer.take_due(now) {
                if round::on_timer(room, timer, &mut ctx) == TimerOutcome::Dispose {
                    dispose = true;
                    break;
                }
            }
            if !dispose && !room.pending_departures.is_empty() {
                dispose = membership::expire_departures(room, &mut ctx, now);
            }

            if dispose {
                self.dispose_room(&code);
            }
        }
    }

    fn dispose_room(&mut self, code: &str) {
        self.rooms.remove(code);
        let bound: Vec<ConnectionId> = self
            .clients
            .connections_in_room(code)
            .iter()
            .map(|c| c.id)
            .collect();
        for connection in bound {
            self.clients.unbind_room(connection);
        }
    }

    /// Disconnects every connection silent for longer than `timeout` and
    /// returns their ids so the transport can close them.
    pub fn expire_idle(&mut self, now: Instant, timeout: Duration) -> Vec<ConnectionId> {
        let idle = self.clients.timed_out(now, timeout);
        for connection in &idle {
            info!("Connection {} timed out", connection);
            self.disconnect(*connection, now);
        }
        idle
    }

    /// Connections that have been quiet for `after` and should be pinged.
    pub fn heartbeat_due(&mut self, now: Instant, after: Duration) -> Vec<ConnectionId> {
        self.clients.heartbeat_due(now, after)
    }

    /// Resolves queued events to connections, in emission order.
    pub fn drain_outgoing(&mut self) -> Vec<Outgoing> {
        let mut outgoing = Vec::new();

        for Envelope { audience, event } in self.services.outbox.drain() {
            let recipients: Vec<ConnectionId> = match &audience {
                Audience::Connection(id) => vec![*id],
                Audience::Room(room) => self
                    .clients
                    .connections_in_room(room)
                    .iter()
                    .map(|c| c.id)
                    .collect(),
                Audience::RoomExcept { room, player } => self
                    .clients
                    .connections_in_room(room)
                    .iter()
                    .filter(|c| c.player_id.as_deref() != Some(player.as_str()))
                    .map(|c| c.id)
                    .collect(),
                Audience::Player { room, player } => self
                    .clients
                    .connections_in_room(room)
                    .iter()
                    .filter(|c| c.player_id.as_deref() == Some(player.as_str()))
                    .map(|c| c.id)
                    .collect(),
            };

            for connection in recipients {
                outgoing.push(Outgoing {
                    connection,
                    event: event.clone(),
                });
            }
        }

        outgoing
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::words::tests::FixedWords;
    use shared::GameStateDto;

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn profile(id: &str) -> PlayerProfile {
        PlayerProfile {
            id: id.to_string(),
            username: format!("user-{}", id),
            avatar_url: None,
        }
    }

    fn new_game() -> Game {
        Game::new(
            GameConfig::default(),
            WordProvider::new(FixedWords(vec!["cat", "dog", "sun"])),
            Persistence::disabled(),
            16,
        )
    }

    fn events_for(out: &[Outgoing], connection: ConnectionId) -> Vec<ServerEvent> {
        out.iter()
            .filter(|o| o.connection == connection)
            .map(|o| o.event.clone())
            .collect()
    }

    fn last_state(out: &[Outgoing], connection: ConnectionId) -> Option<GameStateDto> {
        events_for(out, connection)
            .into_iter()
            .filter_map(|e| match e {
                ServerEvent::State(state) => Some(state),
                _ => None,
            })
            .last()
    }

    /// Creates a room via connection 1 and seats `ids` on connections 1..=n.
    fn seated_room(game: &mut Game, ids: &[&str], now: Instant) -> String {
        for (i, _) in ids.iter().enumerate() {
            game.connect(i as ConnectionId + 1, addr(), now);
        }
        game.handle_event(
            1,
            ClientEvent::CreateRoom {
                host_id: ids[0].to_string(),
                max_players: None,
                max_rounds: Some(2),
            },
            now,
        );
        let code = match &game.drain_outgoing()[0].event {
            ServerEvent::RoomCreated { room_code } => room_code.clone(),
            other => panic!("unexpected {:?}", other),
        };
        for (i, id) in ids.iter().enumerate() {
            game.handle_event(
                i as ConnectionId + 1,
                ClientEvent::JoinRoom {
                    room_code: code.clone(),
                    player: profile(id),
                },
                now,
            );
        }
        game.drain_outgoing();
        code
    }

    #[test]
    fn test_create_room_replies_with_code() {
        let mut game = new_game();
        let now = Instant::now();
        game.connect(1, addr(), now);

        game.handle_event(
            1,
            ClientEvent::CreateRoom {
                host_id: "p1".into(),
                max_players: Some(4),
                max_rounds: None,
            },
            now,
        );
        let out = game.drain_outgoing();
        assert_eq!(out.len(), 1);
        let ServerEvent::RoomCreated { room_code } = &out[0].event else {
            panic!("expected room:created");
        };
        assert_eq!(game.room(room_code).unwrap().max_players, 4);
    }

    #[test]
    fn test_invalid_limits_are_reported() {
        let mut game = new_game();
        let now = Instant::now();
        game.connect(1, addr(), now);

        game.handle_event(
            1,
            ClientEvent::CreateRoom {
                host_id: "p1".into(),
                max_players: Some(40),
                max_rounds: None,
            },
            now,
        );
        assert_eq!(
            game.drain_outgoing()[0].event,
            ServerEvent::Error {
                message: "maxPlayers must be between 2 and 16".into()
            }
        );
        assert!(game.rooms().is_empty());
    }

    #[test]
    fn test_join_unknown_room() {
        let mut game = new_game();
        let now = Instant::now();
        game.connect(1, addr(), now);

        game.handle_event(
            1,
            ClientEvent::JoinRoom {
                room_code: "NOPE00".into(),
                player: profile("p1"),
            },
            now,
        );
        assert_eq!(
            game.drain_outgoing()[0].event,
            ServerEvent::Error {
                message: "Room not found".into()
            }
        );
    }

    #[test]
    fn test_join_broadcasts_state_to_room() {
        let mut game = new_game();
        let now = Instant::now();
        let code = seated_room(&mut game, &["p1"], now);

        game.connect(2, addr(), now);
        game.handle_event(
            2,
            ClientEvent::JoinRoom {
                room_code: code.to_lowercase(),
                player: profile("p2"),
            },
            now,
        );
        let out = game.drain_outgoing();

        assert_eq!(
            events_for(&out, 2)[0],
            ServerEvent::RoomJoined {
                room_code: code.clone()
            }
        );
        for connection in [1, 2] {
            let state = last_state(&out, connection).unwrap();
            assert_eq!(state.players.len(), 2);
            assert_eq!(state.host_id, "p1");
        }
    }

    #[test]
    fn test_start_from_non_host_is_silent() {
        let mut game = new_game();
        let now = Instant::now();
        let code = seated_room(&mut game, &["p1", "p2"], now);

        game.handle_event(2, ClientEvent::StartGame, now);
        assert!(game.drain_outgoing().is_empty());
        assert_eq!(game.room(&code).unwrap().status, RoomStatus::Waiting);
    }

    #[test]
    fn test_start_alone_is_rejected() {
        let mut game = new_game();
        let now = Instant::now();
        seated_room(&mut game, &["p1"], now);

        game.handle_event(1, ClientEvent::StartGame, now);
        assert_eq!(
            game.drain_outgoing()[0].event,
            ServerEvent::Error {
                message: "Need at least 2 players to start".into()
            }
        );
    }

    #[test]
    fn test_choices_only_reach_the_drawer() {
        let mut game = new_game();
        let now = Instant::now();
        seated_room(&mut game, &["p1", "p2"], now);

        game.handle_event(1, ClientEvent::StartGame, now);
        let out = game.drain_outgoing();

        let drawer_view = last_state(&out, 1).unwrap();
        let guesser_view = last_state(&out, 2).unwrap();
        assert_eq!(drawer_view.status, RoomStatus::Choosing);
        assert_eq!(
            drawer_view.word_choices,
            Some(vec!["cat".into(), "dog".into(), "sun".into()])
        );
        assert_eq!(guesser_view.word_choices, None);
        assert!(events_for(&out, 2).contains(&ServerEvent::GameStarted));
    }

    #[test]
    fn test_full_round_over_events() {
        let mut game = new_game();
        let now = Instant::now();
        let code = seated_room(&mut game, &["p1", "p2"], now);

        game.handle_event(1, ClientEvent::StartGame, now);
        game.handle_event(1, ClientEvent::SelectWord { word: "dog".into() }, now);
        let out = game.drain_outgoing();
        assert!(events_for(&out, 1).contains(&ServerEvent::Word { word: "dog".into() }));
        assert!(!events_for(&out, 2)
            .iter()
            .any(|e| matches!(e, ServerEvent::Word { .. })));
        assert_eq!(last_state(&out, 2).unwrap().current_word.as_deref(), Some("___"));

        game.handle_event(
            2,
            ClientEvent::Chat(ChatMessage {
                player_id: "p2".into(),
                username: "user-p2".into(),
                message: "DOG".into(),
                timestamp: 5,
            }),
            now + Duration::from_millis(200),
        );
        let out = game.drain_outgoing();

        let seen_by = |connection| {
            events_for(&out, connection)
                .into_iter()
                .find_map(|e| match e {
                    ServerEvent::Chat(chat) => Some(chat),
                    _ => None,
                })
                .unwrap()
        };
        assert_eq!(seen_by(1).message, "___");
        assert_eq!(seen_by(2).message, "DOG");
        assert!(seen_by(1).is_correct);

        let room = game.room(&code).unwrap();
        assert_eq!(room.scores["p2"], 108);
        assert_eq!(room.scores["p1"], 50);
        assert!(room.all_guessed);
        assert_eq!(room.time_left, 5);

        game.tick(now + Duration::from_millis(5_200));
        let out = game.drain_outgoing();
        assert!(events_for(&out, 2).iter().any(|e| matches!(
            e,
            ServerEvent::RoundEnd { round: 1, word: Some(w), .. } if w == "dog"
        )));
        assert_eq!(game.room(&code).unwrap().current_round, 2);
    }

    #[test]
    fn test_two_player_game_to_the_end() {
        let mut game = new_game();
        let start = Instant::now();
        let code = seated_room(&mut game, &["p1", "p2"], start);

        game.handle_event(1, ClientEvent::StartGame, start);
        game.handle_event(1, ClientEvent::SelectWord { word: "cat".into() }, start);
        {
            let room = game.room(&code).unwrap();
            assert_eq!(room.status, RoomStatus::Drawing);
            assert_eq!(room.time_left, 80);
        }

        game.handle_event(
            2,
            ClientEvent::Chat(ChatMessage {
                player_id: "p2".into(),
                username: "user-p2".into(),
                message: "cat".into(),
                timestamp: 1,
            }),
            start,
        );

        // buffer of 5s, then the 3s inter-round delay
        game.tick(start + Duration::from_secs(8));
        {
            let room = game.room(&code).unwrap();
            assert_eq!(room.current_round, 2);
            assert_eq!(room.status, RoomStatus::Choosing);
            assert_eq!(room.current_drawer.as_deref(), Some("p2"));
        }
        game.drain_outgoing();

        // nobody guesses in round 2: 15s choosing + 80s drawing, plus slack
        game.tick(start + Duration::from_secs(8 + 100));
        let out = game.drain_outgoing();

        let room = game.room(&code).unwrap();
        assert_eq!(room.status, RoomStatus::Finished);
        assert_eq!(room.current_round, 2);
        let winner = events_for(&out, 1)
            .into_iter()
            .find_map(|e| match e {
                ServerEvent::GameEnd { winner } => winner,
                _ => None,
            })
            .unwrap();
        assert_eq!(winner.id, "p2");
        assert_eq!(winner.score, 108);
    }

    #[test]
    fn test_chat_uses_bound_identity() {
        let mut game = new_game();
        let now = Instant::now();
        seated_room(&mut game, &["p1", "p2"], now);

        game.handle_event(
            2,
            ClientEvent::Chat(ChatMessage {
                player_id: "p1".into(),
                username: "impostor".into(),
                message: "hello".into(),
                timestamp: 1,
            }),
            now,
        );
        let out = game.drain_outgoing();
        let ServerEvent::Chat(chat) = &events_for(&out, 1)[0] else {
            panic!("expected chat");
        };
        assert_eq!(chat.player_id, "p2");
        assert_eq!(chat.username, "user-p2");
    }

    #[test]
    fn test_strokes_relay_from_drawer_only() {
        let mut game = new_game();
        let now = Instant::now();
        seated_room(&mut game, &["p1", "p2", "p3"], now);
        game.handle_event(1, ClientEvent::StartGame, now);
        game.handle_event(1, ClientEvent::SelectWord { word: "cat".into() }, now);
        game.drain_outgoing();

        let stroke = serde_json::json!({"points": [[1, 2], [3, 4]], "color": "#000"});
        game.handle_event(2, ClientEvent::Stroke(stroke.clone()), now);
        assert!(game.drain_outgoing().is_empty());

        game.handle_event(1, ClientEvent::Stroke(stroke.clone()), now);
        let out = game.drain_outgoing();
        let recipients: Vec<ConnectionId> = out.iter().map(|o| o.connection).collect();
        assert_eq!(recipients, vec![2, 3]);
        assert_eq!(out[0].event, ServerEvent::Stroke(stroke));

        game.handle_event(1, ClientEvent::ClearCanvas, now);
        assert_eq!(game.drain_outgoing().len(), 2);
    }

    #[test]
    fn test_strokes_are_persisted_with_round() {
        let (persistence, mut rx) = Persistence::channel();
        let mut game = Game::new(
            GameConfig::default(),
            WordProvider::new(FixedWords(vec!["cat", "dog", "sun"])),
            persistence,
            16,
        );
        let now = Instant::now();
        seated_room(&mut game, &["p1", "p2"], now);
        game.handle_event(1, ClientEvent::StartGame, now);
        game.handle_event(1, ClientEvent::SelectWord { word: "cat".into() }, now);
        game.handle_event(1, ClientEvent::Stroke(serde_json::json!({"x": 1})), now);

        let mut saved = None;
        while let Ok(record) = rx.try_recv() {
            if let Record::SaveStroke { round_number, stroke, .. } = record {
                saved = Some((round_number, stroke));
            }
        }
        assert_eq!(saved, Some((Some(1), r#"{"x":1}"#.to_string())));
    }

    #[test]
    fn test_request_state_goes_to_requester_only() {
        let mut game = new_game();
        let now = Instant::now();
        let code = seated_room(&mut game, &["p1", "p2"], now);
        game.connect(9, addr(), now);

        game.handle_event(9, ClientEvent::RequestState { room_code: code.clone() }, now);
        let out = game.drain_outgoing();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].connection, 9);

        game.handle_event(9, ClientEvent::RequestState { room_code: "ZZZZZZ".into() }, now);
        assert!(matches!(game.drain_outgoing()[0].event, ServerEvent::Error { .. }));
    }

    #[test]
    fn test_disconnect_and_reconnect_within_grace() {
        let mut game = new_game();
        let now = Instant::now();
        let code = seated_room(&mut game, &["p1", "p2"], now);

        game.disconnect(2, now);
        game.tick(now + Duration::from_secs(3));
        assert!(game.room(&code).unwrap().is_member("p2"));

        game.connect(3, addr(), now + Duration::from_secs(3));
        game.handle_event(
            3,
            ClientEvent::Reconnect {
                room_code: code.clone(),
                player: profile("p2"),
            },
            now + Duration::from_secs(3),
        );
        game.tick(now + Duration::from_secs(10));
        assert!(game.room(&code).unwrap().is_member("p2"));
    }

    #[test]
    fn test_disconnect_removes_after_grace() {
        let mut game = new_game();
        let now = Instant::now();
        let code = seated_room(&mut game, &["p1", "p2"], now);

        game.disconnect(1, now);
        game.tick(now + Duration::from_secs(5));

        let room = game.room(&code).unwrap();
        assert!(!room.is_member("p1"));
        assert_eq!(room.host_id, "p2");
    }

    #[test]
    fn test_second_tab_keeps_player_seated() {
        let mut game = new_game();
        let now = Instant::now();
        let code = seated_room(&mut game, &["p1", "p2"], now);
        game.connect(3, addr(), now);
        game.handle_event(
            3,
            ClientEvent::JoinRoom {
                room_code: code.clone(),
                player: profile("p2"),
            },
            now,
        );

        game.disconnect(2, now);
        game.tick(now + Duration::from_secs(30));
        assert!(game.room(&code).unwrap().is_member("p2"));
    }

    #[test]
    fn test_abandoned_room_is_disposed() {
        let mut game = new_game();
        let now = Instant::now();
        let code = seated_room(&mut game, &["p1", "p2"], now);

        game.disconnect(1, now);
        game.disconnect(2, now);
        game.tick(now + Duration::from_secs(6));
        assert!(game.room(&code).is_none());
    }

    #[test]
    fn test_never_joined_room_is_reaped() {
        let mut game = new_game();
        let now = Instant::now();
        game.connect(1, addr(), now);
        game.handle_event(
            1,
            ClientEvent::CreateRoom {
                host_id: "p1".into(),
                max_players: None,
                max_rounds: None,
            },
            now,
        );

        game.tick(now + Duration::from_secs(29));
        assert_eq!(game.rooms().len(), 1);
        game.tick(now + Duration::from_secs(30));
        assert!(game.rooms().is_empty());
    }

    #[test]
    fn test_matchmaking_fills_a_room() {
        let mut game = new_game();
        let now = Instant::now();
        for id in 1..=4 {
            game.connect(id, addr(), now);
            game.handle_event(
                id,
                ClientEvent::JoinMatchmaking {
                    player: profile(&format!("m{}", id)),
                },
                now,
            );
        }

        let out = game.drain_outgoing();
        let code = out
            .iter()
            .find_map(|o| match &o.event {
                ServerEvent::MatchFound { room_code } => Some(room_code.clone()),
                _ => None,
            })
            .unwrap();
        for id in 1..=4 {
            assert!(events_for(&out, id).contains(&ServerEvent::MatchFound {
                room_code: code.clone()
            }));
        }

        let room = game.room(&code).unwrap();
        assert_eq!(room.host_id, "m1");
        assert_eq!(room.players.len(), 4);
        assert!(game.matchmaking().is_empty());
    }

    #[test]
    fn test_matchmaking_disconnect_leaves_queue() {
        let mut game = new_game();
        let now = Instant::now();
        game.connect(1, addr(), now);
        game.handle_event(1, ClientEvent::JoinMatchmaking { player: profile("m1") }, now);
        assert_eq!(game.matchmaking().len(), 1);

        game.disconnect(1, now);
        assert!(game.matchmaking().is_empty());
    }

    #[test]
    fn test_ping_gets_pong() {
        let mut game = new_game();
        let now = Instant::now();
        game.connect(1, addr(), now);

        game.handle_event(1, ClientEvent::Ping, now);
        assert!(matches!(game.drain_outgoing()[0].event, ServerEvent::Pong { .. }));
    }

    #[test]
    fn test_idle_connections_expire() {
        let mut game = new_game();
        let now = Instant::now();
        let code = seated_room(&mut game, &["p1", "p2"], now);
        game.touch(1, now + Duration::from_secs(50));

        let idle = game.expire_idle(now + Duration::from_secs(61), Duration::from_secs(60));
        assert_eq!(idle, vec![2]);
        assert_eq!(game.clients().len(), 1);
        assert!(game
            .room(&code)
            .unwrap()
            .pending_departures
            .contains_key("p2"));
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut game = Game::new(
            GameConfig::default(),
            WordProvider::catalog(),
            Persistence::disabled(),
            1,
        );
        let now = Instant::now();
        assert!(game.connect(1, addr(), now));
        assert!(!game.connect(2, addr(), now));
    }
}
