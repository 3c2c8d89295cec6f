use std::fmt;

use serde::{Deserialize, Serialize};

use crate::direction::Dir;

/// World cell coordinate. Chunks share one coordinate space; a chunk's
/// origin is the position of its top-left cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Pos {
    pub x: i32,
    pub y: i32,
}

impl Pos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn step(self, dir: Dir) -> Pos {
        self.step_by(dir, 1)
    }

    pub fn step_by(self, dir: Dir, n: i32) -> Pos {
        let (dx, dy) = dir.offset(n);
        Pos {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub fn distance_sq(self, other: Pos) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        dx * dx + dy * dy
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Grass,
    /// `arrival` is the direction of travel that stepped onto the cell.
    /// Only the centre of the first chunk has none.
    Path { arrival: Option<Dir> },
}

impl Cell {
    pub fn is_path(&self) -> bool {
        matches!(self, Cell::Path { .. })
    }

    pub fn arrival(&self) -> Option<Dir> {
        match self {
            Cell::Grass => None,
            Cell::Path { arrival } => *arrival,
        }
    }
}
