//! Server network layer handling WebSocket connections and game loop coordination
//!
//! The server is split into a few cooperating tasks:
//! - **Acceptor**: accepts TCP connections and spawns one task per peer.
//!   A plain `GET /health` request is answered with a JSON status report
//!   instead of a WebSocket handshake
//! - **Peer tasks**: run the WebSocket handshake, decode JSON frames into
//!   [`ClientEvent`]s and forward them to the main loop
//! - **Network Sender**: serializes [`ServerEvent`]s and hands them to each
//!   peer's writer
//! - **Main Loop**: owns the [`Game`], applies events in arrival order and
//!   fires room timers on every tick
//!
//! All game state lives in the main loop, so room logic never needs a lock.
//! The main loop also pings connections that have gone quiet, so a client
//! that only listens is not mistaken for a dropped one.

use crate::client_manager::ConnectionId;
use crate::config::ServerConfig;
use crate::error::GameError;
use crate::game::{Game, Outgoing};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::Serialize;
use shared::{ClientEvent, ServerEvent};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Messages sent from network tasks to the main loop
#[derive(Debug)]
pub enum ServerMessage {
    /// Handshake completed and the peer can receive events
    Connected {
        connection: ConnectionId,
        addr: SocketAddr,
    },
    EventReceived {
        connection: ConnectionId,
        event: ClientEvent,
    },
    /// A text frame that is not a known event
    Malformed {
        connection: ConnectionId,
        reason: String,
    },
    /// Transport-level ping or pong
    Heartbeat { connection: ConnectionId },
    Disconnected { connection: ConnectionId },
    Shutdown,
}

/// Messages sent from the main loop to the network sender
#[derive(Debug)]
pub enum GameMessage {
    Send {
        connection: ConnectionId,
        event: ServerEvent,
    },
    /// Transport-level ping for a quiet connection
    Ping { connection: ConnectionId },
    Close { connection: ConnectionId },
}

/// Body of the `GET /health` response
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    /// Seconds since the server started
    pub uptime: f64,
    /// Unix time in milliseconds
    pub timestamp: u64,
}

/// Longest request head read while looking for the health route
const MAX_REQUEST_HEAD: usize = 4096;

/// Writer handle for every live peer, keyed by connection id
type Peers = Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Message>>>>;

/// Authoritative game server over WebSockets
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    peers: Peers,
    game: Game,
    tick_duration: Duration,
    idle_timeout: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    /// Binds the listener. Use port 0 to let the OS pick one and read it
    /// back with [`Server::local_addr`].
    pub async fn new(
        config: &ServerConfig,
        game: Game,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&config.address).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on ws://{}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            peers: Arc::new(RwLock::new(HashMap::new())),
            game,
            tick_duration: config.tick_duration,
            idle_timeout: config.idle_timeout,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sender for injecting [`ServerMessage::Shutdown`] from outside the loop
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let peers = Arc::clone(&self.peers);
        let server_tx = self.server_tx.clone();
        let started = Instant::now();

        tokio::spawn(async move {
            let mut next_connection: ConnectionId = 1;

            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let connection = next_connection;
                        next_connection += 1;
                        debug!("Accepted TCP connection {} from {}", connection, addr);
                        tokio::spawn(handle_peer(
                            stream,
                            addr,
                            connection,
                            started,
                            Arc::clone(&peers),
                            server_tx.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }

                if server_tx.is_closed() {
                    break;
                }
            }
        });
    }

    fn spawn_network_sender(&mut self) {
        let peers = Arc::clone(&self.peers);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::Send { connection, event } => {
                        let text = match serde_json::to_string(&event) {
                            Ok(text) => text,
                            Err(e) => {
                                error!("Failed to encode event for {}: {}", connection, e);
                                continue;
                            }
                        };

                        let peers = peers.read().await;
                        match peers.get(&connection) {
                            Some(tx) => {
                                if tx.send(Message::Text(text)).is_err() {
                                    debug!("Writer for connection {} is gone", connection);
                                }
                            }
                            None => debug!("Dropping event for closed connection {}", connection),
                        }
                    }
                    GameMessage::Ping { connection } => {
                        if let Some(tx) = peers.read().await.get(&connection) {
                            if tx.send(Message::Ping(Vec::new())).is_err() {
                                debug!("Writer for connection {} is gone", connection);
                            }
                        }
                    }
                    GameMessage::Close { connection } => {
                        if let Some(tx) = peers.write().await.remove(&connection) {
                            if tx.send(Message::Close(None)).is_err() {
                                debug!("Writer for connection {} is gone", connection);
                            }
                        }
                    }
                }
            }
        });
    }

    fn send(&self, outgoing: Outgoing) {
        if let Err(e) = self.game_tx.send(GameMessage::Send {
            connection: outgoing.connection,
            event: outgoing.event,
        }) {
            error!("Failed to queue event for sending: {}", e);
        }
    }

    fn ping(&self, connection: ConnectionId) {
        if let Err(e) = self.game_tx.send(GameMessage::Ping { connection }) {
            error!("Failed to queue ping for connection {}: {}", connection, e);
        }
    }

    fn close(&self, connection: ConnectionId) {
        if let Err(e) = self.game_tx.send(GameMessage::Close { connection }) {
            error!("Failed to queue close for connection {}: {}", connection, e);
        }
    }

    /// Hands every queued event to the sender task
    fn flush(&mut self) {
        for outgoing in self.game.drain_outgoing() {
            self.send(outgoing);
        }
    }

    fn handle_message(
        &mut self,
        message: ServerMessage,
        now: Instant,
    ) -> Option<Vec<ConnectionId>> {
        let mut to_close = Vec::new();

        match message {
            ServerMessage::Connected { connection, addr } => {
                if !self.game.connect(connection, addr, now) {
                    warn!("Rejecting connection {} from {}: server full", connection, addr);
                    self.game.reject(connection, &GameError::ServerFull);
                    to_close.push(connection);
                }
            }
            ServerMessage::EventReceived { connection, event } => {
                self.game.handle_event(connection, event, now);
            }
            ServerMessage::Malformed { connection, reason } => {
                debug!("Malformed frame from connection {}: {}", connection, reason);
                self.game.reject(connection, &GameError::Malformed(reason));
            }
            ServerMessage::Heartbeat { connection } => self.game.touch(connection, now),
            ServerMessage::Disconnected { connection } => self.game.disconnect(connection, now),
            ServerMessage::Shutdown => return None,
        }

        Some(to_close)
    }

    /// Runs the main loop until shutdown
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_acceptor();
        self.spawn_network_sender();

        let mut tick_interval = interval(self.tick_duration);

        info!("Server started successfully");

        loop {
            let to_close = tokio::select! {
                message = self.server_rx.recv() => {
                    match message.and_then(|m| self.handle_message(m, Instant::now())) {
                        Some(to_close) => to_close,
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    self.game.tick(now);
                    for connection in self.game.heartbeat_due(now, self.idle_timeout / 2) {
                        self.ping(connection);
                    }
                    self.game.expire_idle(now, self.idle_timeout)
                }
            };

            self.flush();
            for connection in to_close {
                self.close(connection);
            }
        }

        self.flush();
        Ok(())
    }
}

/// Peeks at the request line and returns its path once it has arrived.
async fn request_path(stream: &TcpStream) -> Option<String> {
    let mut buf = [0u8; 256];
    loop {
        let n = stream.peek(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        if let Some(end) = buf[..n].windows(2).position(|w| w == b"\r\n") {
            let line = std::str::from_utf8(&buf[..end]).ok()?;
            let mut parts = line.split(' ');
            let _method = parts.next()?;
            return parts.next().map(str::to_string);
        }
        if n == buf.len() {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Answers a health check and closes the stream.
async fn serve_health(mut stream: TcpStream, started: Instant) -> std::io::Result<()> {
    // consume the request head so closing does not reset the connection
    let mut head = Vec::new();
    let mut chunk = [0u8; 512];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") && head.len() < MAX_REQUEST_HEAD {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
    }

    let report = HealthReport {
        status: "ok",
        uptime: started.elapsed().as_secs_f64(),
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0),
    };
    let body = serde_json::to_string(&report)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// Drives one peer from handshake to close
async fn handle_peer(
    stream: TcpStream,
    addr: SocketAddr,
    connection: ConnectionId,
    started: Instant,
    peers: Peers,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    if request_path(&stream).await.as_deref() == Some("/health") {
        debug!("Health check from {}", addr);
        if let Err(e) = serve_health(stream, started).await {
            debug!("Health response to {} failed: {}", addr, e);
        }
        return;
    }

    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let (mut sink, mut frames) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    peers.write().await.insert(connection, tx);

    if server_tx
        .send(ServerMessage::Connected { connection, addr })
        .is_err()
    {
        peers.write().await.remove(&connection);
        return;
    }

    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(e) = sink.send(message).await {
                debug!("Write to connection {} failed: {}", connection, e);
                break;
            }
            if closing {
                break;
            }
        }
        if let Err(e) = sink.close().await {
            debug!("Closing connection {} failed: {}", connection, e);
        }
    });

    while let Some(frame) = frames.next().await {
        let message = match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => ServerMessage::EventReceived { connection, event },
                Err(e) => ServerMessage::Malformed {
                    connection,
                    reason: e.to_string(),
                },
            },
            Ok(Message::Binary(_)) => ServerMessage::Malformed {
                connection,
                reason: "binary frames are not supported".to_string(),
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => ServerMessage::Heartbeat { connection },
            Ok(Message::Close(_)) => break,
            Ok(Message::Frame(_)) => continue,
            Err(e) => {
                debug!("Read from connection {} failed: {}", connection, e);
                break;
            }
        };

        if server_tx.send(message).is_err() {
            break;
        }
    }

    // dropping the writer handle lets the writer task drain and exit
    peers.write().await.remove(&connection);
    if server_tx
        .send(ServerMessage::Disconnected { connection })
        .is_err()
    {
        debug!("Main loop gone before connection {} closed", connection);
    }
}
