use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dir {
    Up,
    Down,
    Right,
    Left,
}

impl Dir {
    pub const ALL: [Dir; 4] = [Dir::Up, Dir::Down, Dir::Right, Dir::Left];

    /// Grid delta for one step. `y` grows downwards, the way rows are drawn.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Dir::Up => (0, -1),
            Dir::Down => (0, 1),
            Dir::Right => (1, 0),
            Dir::Left => (-1, 0),
        }
    }

    pub fn opposite(self) -> Dir {
        match self {
            Dir::Up => Dir::Down,
            Dir::Down => Dir::Up,
            Dir::Right => Dir::Left,
            Dir::Left => Dir::Right,
        }
    }

    /// Displacement of `step` units in this direction.
    pub fn offset(self, step: i32) -> (i32, i32) {
        let (dx, dy) = self.delta();
        (dx * step, dy * step)
    }

    fn bit(self) -> u8 {
        match self {
            Dir::Up => 1,
            Dir::Down => 2,
            Dir::Right => 4,
            Dir::Left => 8,
        }
    }
}

/// Opposite of an optional direction; "no direction" stays "no direction".
pub fn opposite(dir: Option<Dir>) -> Option<Dir> {
    dir.map(Dir::opposite)
}

/// Small set of directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirSet(u8);

impl DirSet {
    pub fn insert(&mut self, dir: Dir) {
        self.0 |= dir.bit();
    }

    pub fn contains(&self, dir: Dir) -> bool {
        self.0 & dir.bit() != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_is_an_involution() {
        for dir in Dir::ALL {
            assert_ne!(dir, dir.opposite());
            assert_eq!(dir, dir.opposite().opposite());
        }
        assert_eq!(opposite(None), None);
        assert_eq!(opposite(Some(Dir::Left)), Some(Dir::Right));
    }

    #[test]
    fn offsets_cancel_with_their_opposite() {
        for dir in Dir::ALL {
            let (x, y) = dir.offset(13);
            let (ox, oy) = dir.opposite().offset(13);
            assert_eq!((x + ox, y + oy), (0, 0));
            assert_eq!(x.abs() + y.abs(), 13);
        }
    }

    #[test]
    fn dir_set_tracks_membership() {
        let mut set = DirSet::default();
        set.insert(Dir::Up);
        set.insert(Dir::Left);
        set.insert(Dir::Up);
        assert!(set.contains(Dir::Up));
        assert!(set.contains(Dir::Left));
        assert!(!set.contains(Dir::Down));
        assert!(!set.contains(Dir::Right));
    }
}
