use clap::Parser;
use log::{error, info};
use server::config::{GameConfig, ServerConfig};
use server::game::Game;
use server::network::{Server, ServerMessage};
use server::persistence::{JournalStore, Persistence};
use server::words::{WordList, WordProvider};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Timer resolution in milliseconds
    #[arg(long, default_value = "100")]
    tick_ms: u64,

    /// Maximum concurrent connections
    #[arg(short = 'c', long, default_value = "256")]
    max_connections: usize,

    /// Seconds without traffic before a connection is dropped
    #[arg(long, default_value = "60")]
    idle_timeout: u64,

    /// Seconds the drawer has to pick a word
    #[arg(long, default_value = "15")]
    choose_seconds: u32,

    /// Seconds of drawing per round
    #[arg(long, default_value = "80")]
    draw_seconds: u32,

    /// Seconds a disconnected player keeps their seat
    #[arg(long, default_value = "5")]
    grace_seconds: u64,

    /// Players needed in the quick-play queue before a room opens
    #[arg(long, default_value = "4")]
    matchmaking_size: usize,

    /// Append game records to this journal file
    #[arg(short, long)]
    journal: Option<PathBuf>,

    /// Newline separated word list to use instead of the built-in one
    #[arg(short, long)]
    words_file: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let game = GameConfig {
            choose_seconds: self.choose_seconds,
            draw_seconds: self.draw_seconds,
            grace_period: Duration::from_secs(self.grace_seconds),
            matchmaking_size: self.matchmaking_size,
            ..GameConfig::default()
        };

        ServerConfig {
            address: format!("{}:{}", self.host, self.port),
            tick_duration: Duration::from_millis(self.tick_ms.max(1)),
            max_connections: self.max_connections,
            idle_timeout: Duration::from_secs(self.idle_timeout),
            journal: self.journal,
            words_file: self.words_file,
            game,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Args::parse().into_config();

    let words = match &config.words_file {
        Some(path) => {
            let list = WordList::from_file(path)?;
            info!("Loaded {} words from {}", list.len(), path.display());
            WordProvider::new(list)
        }
        None => WordProvider::catalog(),
    };

    let (persistence, writer) = match &config.journal {
        Some(path) => {
            let (persistence, handle) = Persistence::spawn(JournalStore::open(path)?);
            (persistence, Some(handle))
        }
        None => {
            info!("No journal configured, game records will not be kept");
            (Persistence::disabled(), None)
        }
    };

    let game = Game::new(
        config.game.clone(),
        words,
        persistence,
        config.max_connections,
    );
    let mut server = Server::new(&config, game).await?;
    let shutdown = server.shutdown_handle();

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Server error: {}", e);
        }
    });

    tokio::select! {
        result = server_handle => {
            if let Err(e) = result {
                error!("Server task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            if shutdown.send(ServerMessage::Shutdown).is_err() {
                error!("Server loop already stopped");
            }
        }
    }

    // the game loop owns the last persistence handle; give the journal a
    // moment to drain once it is dropped
    if let Some(writer) = writer {
        if tokio::time::timeout(Duration::from_secs(2), writer).await.is_err() {
            error!("Journal writer did not finish in time");
        }
    }

    Ok(())
}
