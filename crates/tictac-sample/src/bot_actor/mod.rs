//! # Bot Actor
//!
//! A tic-tac-toe player hosted as a distributed actor.
//!
//! ## Structure
//!
//! - [`entity`] - [`BotPlayer`], the [`DistributedActor`](distributed_actors::DistributedActor)
//!   implementation
//! - [`error`] - [`BotError`] type, carried unchanged to remote callers
//! - [`BotOp`] / [`BotReply`] - the operations a bot exposes and what they return
//!
//! ## Usage
//!
//! ```rust,ignore
//! // Server: any identity tagged "bot" becomes a fresh player on first contact.
//! system.register_role_handler("bot", |_, _| BotPlayer::new(Mark::O));
//!
//! // Client: the bot is a plain ActorRef, wherever it lives.
//! let bot = BotClient::new(system.resolve::<BotPlayer>(&id)?);
//! let mv = bot.make_move().await?;
//! ```

pub mod entity;
pub mod error;

pub use entity::BotPlayer;
pub use error::BotError;

use crate::model::GameMove;
use distributed_actors::Operation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BotOp {
    /// Pick a square and place the bot's mark on it.
    MakeMove,
    /// Record the opponent's move.
    OpponentMoved(GameMove),
    /// Start a new game.
    Reset,
}

impl Operation for BotOp {
    const SELECTORS: &'static [&'static str] = &["make_move", "opponent_moved", "reset"];

    fn selector(&self) -> &'static str {
        match self {
            BotOp::MakeMove => "make_move",
            BotOp::OpponentMoved(_) => "opponent_moved",
            BotOp::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotReply {
    Moved(GameMove),
    Acknowledged,
}
