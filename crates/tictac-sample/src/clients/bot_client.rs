//! # Bot Client
//!
//! Provides a high‑level API for interacting with a `BotPlayer` actor.
//! It wraps an `ActorRef<BotPlayer>`, so the same client drives a local bot or a remote one.
//! Failures keep their origin: the bot's own [`BotError`] arrives as `InvokeError::Operation`,
//! anything the actor system reports as `InvokeError::System`.
use crate::bot_actor::{BotError, BotOp, BotPlayer, BotReply};
use crate::model::GameMove;
use distributed_actors::{ActorIdentity, ActorRef, ActorSystemError, InvokeError};
use tracing::{debug, instrument};

/// Client for interacting with a Bot actor.
#[derive(Clone, Debug)]
pub struct BotClient {
    inner: ActorRef<BotPlayer>,
}

impl BotClient {
    pub fn new(inner: ActorRef<BotPlayer>) -> Self {
        Self { inner }
    }

    pub fn identity(&self) -> &ActorIdentity {
        self.inner.identity()
    }

    pub fn is_local(&self) -> bool {
        self.inner.is_local()
    }

    /// Asks the bot for its next move.
    #[instrument(skip(self), fields(bot = %self.identity()))]
    pub async fn make_move(&self) -> Result<GameMove, InvokeError<BotError>> {
        debug!("Requesting move");
        match self.inner.invoke(BotOp::MakeMove).await? {
            BotReply::Moved(mv) => Ok(mv),
            BotReply::Acknowledged => Err(ActorSystemError::MalformedPayload(
                "bot acknowledged instead of moving".into(),
            )
            .into()),
        }
    }

    /// Tells the bot where its opponent played.
    #[instrument(skip(self), fields(bot = %self.identity()))]
    pub async fn opponent_moved(&self, mv: GameMove) -> Result<(), InvokeError<BotError>> {
        self.inner.invoke(BotOp::OpponentMoved(mv)).await.map(|_| ())
    }

    #[instrument(skip(self), fields(bot = %self.identity()))]
    pub async fn reset(&self) -> Result<(), InvokeError<BotError>> {
        self.inner.invoke(BotOp::Reset).await.map(|_| ())
    }
}
