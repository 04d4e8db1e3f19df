//! Connection tracking for the game server
//!
//! This module keeps the server-side view of every open WebSocket connection:
//! - Connection lifecycle (connect, disconnect, idle timeout)
//! - Which player and room each connection is bound to
//! - Capacity limits on concurrent connections
//!
//! A player may hold several connections at once (two browser tabs), so
//! broadcasts are resolved against connections, never against players.

use log::info;
use shared::PlayerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Server-assigned identifier for one transport connection
pub type ConnectionId = u64;

/// A connected client and the identity it has claimed
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique connection identifier assigned by the acceptor
    pub id: ConnectionId,
    /// Remote address, for logging
    pub addr: SocketAddr,
    /// Last time any frame arrived from this connection
    pub last_seen: Instant,
    /// When the server last probed this connection with a ping
    pub pinged_at: Option<Instant>,
    /// Player identity claimed by a join, reconnect or matchmaking request
    pub player_id: Option<PlayerId>,
    /// Room this connection receives broadcasts for
    pub room_code: Option<String>,
}

impl Client {
    pub fn new(id: ConnectionId, addr: SocketAddr, now: Instant) -> Self {
        Self {
            id,
            addr,
            last_seen: now,
            pinged_at: None,
            player_id: None,
            room_code: None,
        }
    }

    /// Checks if the connection has been silent for longer than `timeout`
    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }

    /// True if this connection is bound to `player` inside `room`
    pub fn is_bound_to(&self, room: &str, player: &str) -> bool {
        self.room_code.as_deref() == Some(room) && self.player_id.as_deref() == Some(player)
    }
}

/// Manages all open connections and their room bindings
pub struct ClientManager {
    /// Connected clients indexed by connection id
    clients: HashMap<ConnectionId, Client>,
    /// Maximum number of concurrent connections allowed
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
        }
    }

    /// Registers a new connection
    ///
    /// Returns false if the server is at capacity or the id is already in
    /// use; the caller should close the transport in that case.
    pub fn add_client(&mut self, id: ConnectionId, addr: SocketAddr, now: Instant) -> bool {
        if self.clients.len() >= self.max_clients || self.clients.contains_key(&id) {
            return false;
        }

        info!("Connection {} opened from {}", id, addr);
        self.clients.insert(id, Client::new(id, addr, now));
        true
    }

    /// Removes a connection, returning its final bindings
    pub fn remove_client(&mut self, id: ConnectionId) -> Option<Client> {
        let client = self.clients.remove(&id)?;
        info!("Connection {} closed", client.id);
        Some(client)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Records activity on a connection
    pub fn touch(&mut self, id: ConnectionId, now: Instant) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.last_seen = now;
            client.pinged_at = None;
        }
    }

    /// Claims a player identity without joining a room (matchmaking)
    pub fn bind_player(&mut self, id: ConnectionId, player: &str) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.player_id = Some(player.to_string());
        }
    }

    /// Binds a connection to a player inside a room.
    ///
    /// Returns the previous `(room, player)` binding if it was different.
    pub fn bind_room(
        &mut self,
        id: ConnectionId,
        room: &str,
        player: &str,
    ) -> Option<(String, PlayerId)> {
        let client = self.clients.get_mut(&id)?;
        let previous = match (client.room_code.take(), client.player_id.take()) {
            (Some(old_room), Some(old_player)) if old_room != room || old_player != player => {
                Some((old_room, old_player))
            }
            _ => None,
        };
        client.room_code = Some(room.to_string());
        client.player_id = Some(player.to_string());
        previous
    }

    /// Detaches a connection from its room, keeping the claimed player.
    pub fn unbind_room(&mut self, id: ConnectionId) -> Option<(String, PlayerId)> {
        let client = self.clients.get_mut(&id)?;
        let room = client.room_code.take()?;
        Some((room, client.player_id.clone()?))
    }

    /// Returns `(room, player)` for a connection bound to a room
    pub fn binding(&self, id: ConnectionId) -> Option<(&str, &str)> {
        let client = self.clients.get(&id)?;
        Some((client.room_code.as_deref()?, client.player_id.as_deref()?))
    }

    /// Every connection bound to `room`, ordered by connection id
    pub fn connections_in_room(&self, room: &str) -> Vec<&Client> {
        let mut clients: Vec<&Client> = self
            .clients
            .values()
            .filter(|c| c.room_code.as_deref() == Some(room))
            .collect();
        clients.sort_by_key(|c| c.id);
        clients
    }

    /// True if `player` still has an open connection bound to `room`
    pub fn player_connected(&self, room: &str, player: &str) -> bool {
        self.clients.values().any(|c| c.is_bound_to(room, player))
    }

    /// Connections that claimed `player` but are not in any room yet
    pub fn unplaced_connections(&self, player: &str) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .clients
            .values()
            .filter(|c| c.room_code.is_none() && c.player_id.as_deref() == Some(player))
            .map(|c| c.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Connections silent for longer than `timeout`
    ///
    /// The connections are not removed; the caller runs the normal
    /// disconnect path for each one so room bookkeeping stays in one place.
    pub fn timed_out(&self, now: Instant, timeout: Duration) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .clients
            .values()
            .filter(|c| c.is_timed_out(now, timeout))
            .map(|c| c.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Connections quiet for at least `after` that need a ping
    ///
    /// A connection is pinged at most once per `after` while it stays quiet;
    /// any activity through [`ClientManager::touch`] resets that.
    pub fn heartbeat_due(&mut self, now: Instant, after: Duration) -> Vec<ConnectionId> {
        let mut ids = Vec::new();
        for client in self.clients.values_mut() {
            let quiet = now.saturating_duration_since(client.last_seen) >= after;
            let ping_stale = client
                .pinged_at
                .map_or(true, |at| now.saturating_duration_since(at) >= after);
            if quiet && ping_stale {
                client.pinged_at = Some(now);
                ids.push(client.id);
            }
        }
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
