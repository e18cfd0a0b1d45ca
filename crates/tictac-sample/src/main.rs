//! # Tic-Tac-Toe over Distributed Actors
//!
//! Two processes, one game:
//!
//! ```bash
//! # Host bots
//! RUST_LOG=info cargo run -p tictac-sample -- server --port 8888
//!
//! # Play a local bot against a bot on the server
//! RUST_LOG=info cargo run -p tictac-sample -- client --host 127.0.0.1 --port 8888 --games 3
//! ```
//!
//! The client's own bot is a local actor and the opponent is a remote proxy; both are driven
//! through the same [`BotClient`](tictac_sample::clients::BotClient).

use clap::{Parser, Subcommand};
use distributed_actors::system::tracing::setup_tracing;
use distributed_actors::SystemConfig;
use tictac_sample::bot_actor::BotPlayer;
use tictac_sample::clients::BotClient;
use tictac_sample::lifecycle::{join, play, serve};
use tictac_sample::model::Mark;
use tracing::{error, info, Instrument};

#[derive(Parser, Debug)]
#[command(name = "tictac")]
#[command(about = "Tic-tac-toe between distributed actor systems")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Host to bind (server) or connect to (client)
    #[arg(long, default_value = "127.0.0.1", global = true)]
    host: String,

    #[arg(short, long, default_value_t = 8888, global = true)]
    port: u16,

    /// Node name announced to the peer
    #[arg(long, global = true)]
    node: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Host bots until Ctrl-C
    Server,
    /// Play against a bot hosted by a server
    Client {
        /// Number of games to play
        #[arg(short, long, default_value_t = 1)]
        games: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();
    let args = Args::parse();

    let mut config = SystemConfig::default();
    if let Some(node) = &args.node {
        config = config.with_node_name(node.clone());
    }
    let addr = format!("{}:{}", args.host, args.port);

    match args.mode {
        Mode::Server => {
            let (system, bound) = serve(config, addr).await.map_err(|e| e.to_string())?;
            info!(%bound, "Waiting for players (Ctrl-C to stop)");
            tokio::signal::ctrl_c().await.map_err(|e| e.to_string())?;
            system.shutdown();
        }
        Mode::Client { games } => {
            let (system, remote) = join(config, addr).await.map_err(|e| e.to_string())?;
            let (_, local) = system
                .create_local_actor(|_, _| BotPlayer::new(Mark::X))
                .map_err(|e| e.to_string())?;
            let local = BotClient::new(local);

            for game in 1..=games {
                let span = tracing::info_span!("game", game);
                match play(&local, &remote).instrument(span).await {
                    Ok(outcome) => info!(game, ?outcome, "Finished"),
                    Err(e) => {
                        error!(game, error = %e, "Game aborted");
                        break;
                    }
                }
            }
            system.shutdown();
        }
    }

    info!("Application completed successfully");
    Ok(())
}
