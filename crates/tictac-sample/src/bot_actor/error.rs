use serde::{Deserialize, Serialize};

/// Errors a bot reports for the moves it is asked to make or told about.
///
/// Travels to remote callers unchanged; they match on the same variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum BotError {
    #[error("Position {0} is off the board")]
    OutOfBounds(u8),

    #[error("Square {0} is already taken")]
    SquareTaken(u8),

    #[error("The game is over")]
    GameOver,

    #[error("Move was made with the bot's own mark {0}")]
    WrongMark(crate::model::Mark),
}
