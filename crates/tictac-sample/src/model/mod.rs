//! # Game Model
//!
//! Plain data shared by both players. Everything here crosses the network as JSON, so it
//! only derives serde and holds no references to actors.

use crate::bot_actor::BotError;
use serde::{Deserialize, Serialize};
use std::fmt;

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::X => write!(f, "X"),
            Mark::O => write!(f, "O"),
        }
    }
}

/// One placed mark. Positions run 0..9, row by row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMove {
    pub position: u8,
    pub mark: Mark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Winner(Mark),
    Draw,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    cells: [Option<Mark>; 9],
}

impl Board {
    pub fn get(&self, position: u8) -> Option<Mark> {
        self.cells.get(position as usize).copied().flatten()
    }

    /// Places `mv`, refusing out-of-range, occupied and post-game moves.
    pub fn place(&mut self, mv: GameMove) -> Result<(), BotError> {
        if self.outcome().is_some() {
            return Err(BotError::GameOver);
        }
        let cell = self
            .cells
            .get_mut(mv.position as usize)
            .ok_or(BotError::OutOfBounds(mv.position))?;
        if cell.is_some() {
            return Err(BotError::SquareTaken(mv.position));
        }
        *cell = Some(mv.mark);
        Ok(())
    }

    pub fn free_positions(&self) -> impl Iterator<Item = u8> + '_ {
        (0u8..9).filter(|&p| self.cells[p as usize].is_none())
    }

    pub fn winner(&self) -> Option<Mark> {
        LINES.iter().find_map(|&[a, b, c]| match self.cells[a] {
            Some(mark) if self.cells[b] == Some(mark) && self.cells[c] == Some(mark) => Some(mark),
            _ => None,
        })
    }

    /// `None` while the game is still running.
    pub fn outcome(&self) -> Option<Outcome> {
        match self.winner() {
            Some(mark) => Some(Outcome::Winner(mark)),
            None if self.cells.iter().all(Option::is_some) => Some(Outcome::Draw),
            None => None,
        }
    }

    /// Whether placing `mark` at `position` would win.
    pub fn wins_with(&self, position: u8, mark: Mark) -> bool {
        let mut probe = self.clone();
        probe.cells[position as usize] = Some(mark);
        probe.winner() == Some(mark)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(3) {
            let line: Vec<_> = row
                .iter()
                .map(|cell| cell.map_or_else(|| ".".to_string(), |m| m.to_string()))
                .collect();
            writeln!(f, "{}", line.join(" "))?;
        }
        Ok(())
    }
}
