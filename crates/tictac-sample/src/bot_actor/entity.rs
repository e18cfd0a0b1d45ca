use super::{BotError, BotOp, BotReply};
use crate::model::{Board, GameMove, Mark};
use async_trait::async_trait;
use distributed_actors::{ActorIdentity, DistributedActor};
use tracing::{debug, info};

const CENTER: u8 = 4;
const CORNERS: [u8; 4] = [0, 2, 6, 8];

/// A tic-tac-toe player that keeps its own copy of the board.
#[derive(Debug)]
pub struct BotPlayer {
    mark: Mark,
    board: Board,
}

impl BotPlayer {
    pub fn new(mark: Mark) -> Self {
        Self {
            mark,
            board: Board::default(),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Win if possible, else block, else center, else a corner, else anything.
    fn choose(&self) -> Option<u8> {
        let free: Vec<u8> = self.board.free_positions().collect();
        free.iter()
            .copied()
            .find(|&p| self.board.wins_with(p, self.mark))
            .or_else(|| {
                free.iter()
                    .copied()
                    .find(|&p| self.board.wins_with(p, self.mark.opponent()))
            })
            .or_else(|| free.contains(&CENTER).then_some(CENTER))
            .or_else(|| CORNERS.into_iter().find(|c| free.contains(c)))
            .or_else(|| free.first().copied())
    }
}

#[async_trait]
impl DistributedActor for BotPlayer {
    type Operation = BotOp;
    type Reply = BotReply;
    type Error = BotError;

    async fn on_start(&mut self, identity: &ActorIdentity) {
        info!(%identity, mark = %self.mark, "Bot ready");
    }

    async fn handle(&mut self, op: BotOp) -> Result<BotReply, BotError> {
        match op {
            BotOp::MakeMove => {
                if self.board.outcome().is_some() {
                    return Err(BotError::GameOver);
                }
                let position = self.choose().ok_or(BotError::GameOver)?;
                let mv = GameMove {
                    position,
                    mark: self.mark,
                };
                self.board.place(mv)?;
                debug!(position, mark = %self.mark, "Bot moved");
                Ok(BotReply::Moved(mv))
            }
            BotOp::OpponentMoved(mv) => {
                if mv.mark == self.mark {
                    return Err(BotError::WrongMark(mv.mark));
                }
                self.board.place(mv)?;
                Ok(BotReply::Acknowledged)
            }
            BotOp::Reset => {
                self.board = Board::default();
                Ok(BotReply::Acknowledged)
            }
        }
    }
}
