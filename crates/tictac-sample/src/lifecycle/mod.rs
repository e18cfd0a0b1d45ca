//! # Game Lifecycle
//!
//! Wires actor systems together for the two sides of a match.
//!
//! - [`serve`]: starts a system that hosts bots. Any identity tagged `"bot"` that a client
//!   invokes is materialized on first contact, so the server never creates bots itself.
//! - [`join`]: connects to a server and mints a bot identity on the server's node. The
//!   returned [`BotClient`] is a remote proxy.
//! - [`play`]: referees one game between two clients, local or remote alike.
//!
//! ```rust,ignore
//! let (server, addr) = serve(SystemConfig::default(), "127.0.0.1:0").await?;
//! let (client, remote) = join(SystemConfig::default(), addr).await?;
//! let (_, local) = client.create_local_actor(|_, _| BotPlayer::new(Mark::X))?;
//! let outcome = play(&BotClient::new(local), &remote).await?;
//! ```

use crate::bot_actor::{BotError, BotPlayer};
use crate::clients::BotClient;
use crate::model::{Board, Mark, Outcome};
use distributed_actors::{ActorSystem, ActorSystemError, InvokeError, SystemConfig};
use std::net::SocketAddr;
use tokio::net::ToSocketAddrs;
use tracing::{info, instrument};

pub const BOT_ROLE: &str = "bot";

/// Starts a bot-hosting system listening on `addr`.
pub async fn serve(
    config: SystemConfig,
    addr: impl ToSocketAddrs,
) -> Result<(ActorSystem, SocketAddr), ActorSystemError> {
    let system = ActorSystem::new(config);
    system.register_role_handler(BOT_ROLE, |_, _| BotPlayer::new(Mark::O));
    let bound = system.listen(addr).await?;
    info!(node = %system.node_id(), %bound, "Bot server ready");
    Ok((system, bound))
}

/// Connects to a bot server and returns a client for a fresh remote bot.
pub async fn join(
    config: SystemConfig,
    addr: impl ToSocketAddrs,
) -> Result<(ActorSystem, BotClient), ActorSystemError> {
    let system = ActorSystem::new(config);
    let server = system.connect(addr).await?;
    let identity = system.assign_remote_identity(&server, Some(BOT_ROLE));
    let bot = system.resolve::<BotPlayer>(&identity)?;
    info!(%server, bot = %identity, "Joined bot server");
    Ok((system, BotClient::new(bot)))
}

/// Plays one game, `x` moving first, and returns the outcome.
///
/// The referee keeps its own board and relays each move to the other player. A move the
/// referee rejects is reported as that bot's operation error.
#[instrument(skip_all, fields(x = %x.identity(), o = %o.identity()))]
pub async fn play(x: &BotClient, o: &BotClient) -> Result<Outcome, InvokeError<BotError>> {
    x.reset().await?;
    o.reset().await?;

    let mut board = Board::default();
    let mut turn = Mark::X;
    loop {
        if let Some(outcome) = board.outcome() {
            info!(?outcome, board = %board, "Game over");
            return Ok(outcome);
        }
        let (mover, watcher) = match turn {
            Mark::X => (x, o),
            Mark::O => (o, x),
        };
        let mv = mover.make_move().await?;
        if mv.mark != turn {
            return Err(InvokeError::Operation(BotError::WrongMark(mv.mark)));
        }
        board.place(mv).map_err(InvokeError::Operation)?;
        info!(mark = %mv.mark, position = mv.position, "Move");
        watcher.opponent_moved(mv).await?;
        turn = turn.opponent();
    }
}
