//! Grid actions

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{MdpError, Result};

/// One of the four compass moves, with stable ordinals 0..=3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Row - 1
    Up = 0,
    /// Row + 1
    Down = 1,
    /// Column - 1
    Left = 2,
    /// Column + 1
    Right = 3,
}

impl Action {
    /// Number of actions
    pub const COUNT: usize = 4;

    /// All actions in ordinal order
    pub const ALL: [Action; Self::COUNT] = [Action::Up, Action::Down, Action::Left, Action::Right];

    /// Ordinal of the action
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Row and column offsets
    #[must_use]
    pub fn delta(self) -> (isize, isize) {
        match self {
            Action::Up => (-1, 0),
            Action::Down => (1, 0),
            Action::Left => (0, -1),
            Action::Right => (0, 1),
        }
    }

    /// Lowercase name, as used in iteration logs
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Action::Up => "up",
            Action::Down => "down",
            Action::Left => "left",
            Action::Right => "right",
        }
    }

    /// Arrow glyph used by policy renderings
    #[must_use]
    pub fn arrow(self) -> char {
        match self {
            Action::Up => '↑',
            Action::Down => '↓',
            Action::Left => '←',
            Action::Right => '→',
        }
    }

    /// Uniformly random action
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::COUNT)]
    }
}

impl TryFrom<usize> for Action {
    type Error = MdpError;

    fn try_from(index: usize) -> Result<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(MdpError::InvalidAction(index))
    }
}

impl From<Action> for usize {
    fn from(action: Action) -> Self {
        action.index()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Action {
    type Err = MdpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "up" => Ok(Action::Up),
            "down" => Ok(Action::Down),
            "left" => Ok(Action::Left),
            "right" => Ok(Action::Right),
            other => other
                .parse::<usize>()
                .map_err(|_| MdpError::InvalidConfig(format!("unrecognized action '{other}'")))
                .and_then(Action::try_from),
        }
    }
}
