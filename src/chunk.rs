//! One square chunk of the map and the search that lays its paths.
//!
//! A chunk keeps a dense grid of [`Cell`]s and an ordered list of branches.
//! Branch 0 is the trunk: it starts at the chunk centre (first chunk) or at
//! the cell matching the parent's exit, and is the first branch to reach an
//! edge. Every later branch starts at the trunk's fork cell.
//!
//! Each call to [`Chunk::grow_step`] does one unit of work: lay a cell, give
//! a dead-end cell back to grass, move the fork, or close the branch. The
//! batch entry points just loop it.

use rand::Rng;
use tracing::{debug, warn};

use crate::cell::{Cell, Pos};
use crate::direction::{opposite, Dir, DirSet};
use crate::error::ChunkError;
use crate::policy::{self, Candidate, Tuning};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    Placed(Pos),
    /// Dead end: the cell went back to grass.
    Backtracked(Pos),
    /// The branch died at its fork and restarted from the next trunk cell.
    ForkMoved(Pos),
    /// The branch reached the boundary, or the trunk reached its fork length.
    Finished,
    /// No way left towards the requested edge.
    Exhausted,
    /// The current branch is closed; request another one first.
    Idle,
}

impl Growth {
    pub fn is_done(&self) -> bool {
        matches!(self, Growth::Finished | Growth::Exhausted | Growth::Idle)
    }
}

#[derive(Debug, Clone, Default)]
struct Search {
    /// Direction of travel from the parent chunk into this one.
    entry: Option<Dir>,
    /// Trunk cells that backtracking may not remove.
    trunk_floor: usize,
    init_fork: usize,
    fork: usize,
    stopped: bool,
    last_finished: bool,
    /// Directions already proven dead from each cell of the current branch.
    dead_ends: Vec<DirSet>,
    /// Cells given back to grass since the current branch started, indexed
    /// like the grid. They are not entered again until a new branch starts.
    dead_cells: Vec<bool>,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    origin: Pos,
    size: usize,
    cell_size: f32,
    tuning: Tuning,
    step_mode: bool,
    cells: Vec<Cell>,
    branches: Vec<Vec<Pos>>,
    search: Search,
}

impl Chunk {
    pub fn new(origin: Pos, size: usize, cell_size: f32, tuning: Tuning, step_mode: bool) -> Self {
        Self {
            origin,
            size,
            cell_size,
            tuning,
            step_mode,
            cells: vec![Cell::Grass; size * size],
            branches: Vec::new(),
            search: Search::default(),
        }
    }

    pub fn origin(&self) -> Pos {
        self.origin
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn center(&self) -> Pos {
        let half = (self.size / 2) as i32;
        Pos::new(self.origin.x + half, self.origin.y + half)
    }

    pub fn branches(&self) -> &[Vec<Pos>] {
        &self.branches
    }

    pub fn entry(&self) -> Option<Dir> {
        self.search.entry
    }

    pub fn fork_cell(&self) -> Option<Pos> {
        self.branches
            .first()
            .and_then(|trunk| trunk.get(self.search.init_fork))
            .copied()
    }

    pub fn is_stopped(&self) -> bool {
        self.search.stopped
    }

    pub fn is_last_branch_finished(&self) -> bool {
        self.search.last_finished
    }

    /// World position of a cell's corner, in world units.
    pub fn world_position(&self, pos: Pos) -> (f32, f32) {
        (pos.x as f32 * self.cell_size, pos.y as f32 * self.cell_size)
    }

    fn index(&self, pos: Pos) -> Option<usize> {
        let lx = pos.x - self.origin.x;
        let ly = pos.y - self.origin.y;
        let size = self.size as i32;
        if lx < 0 || ly < 0 || lx >= size || ly >= size {
            return None;
        }
        Some(ly as usize * self.size + lx as usize)
    }

    pub fn contains(&self, pos: Pos) -> bool {
        self.index(pos).is_some()
    }

    pub fn cell(&self, pos: Pos) -> Option<&Cell> {
        self.index(pos).map(|idx| &self.cells[idx])
    }

    pub fn is_path(&self, pos: Pos) -> bool {
        self.cell(pos).is_some_and(Cell::is_path)
    }

    pub fn cells(&self) -> impl Iterator<Item = (Pos, &Cell)> + '_ {
        self.cells.iter().enumerate().map(move |(idx, cell)| {
            let x = (idx % self.size) as i32;
            let y = (idx / self.size) as i32;
            (Pos::new(self.origin.x + x, self.origin.y + y), cell)
        })
    }

    pub fn on_boundary(&self, pos: Pos) -> bool {
        if !self.contains(pos) {
            return false;
        }
        let last = self.size as i32 - 1;
        let lx = pos.x - self.origin.x;
        let ly = pos.y - self.origin.y;
        lx == 0 || ly == 0 || lx == last || ly == last
    }

    /// Side of the chunk a boundary cell lies on. Corners resolve in the
    /// order up, down, right, left.
    pub fn edge_of(&self, pos: Pos) -> Option<Dir> {
        if !self.contains(pos) {
            return None;
        }
        let last = self.size as i32 - 1;
        let lx = pos.x - self.origin.x;
        let ly = pos.y - self.origin.y;
        if ly == 0 {
            Some(Dir::Up)
        } else if ly == last {
            Some(Dir::Down)
        } else if lx == last {
            Some(Dir::Right)
        } else if lx == 0 {
            Some(Dir::Left)
        } else {
            None
        }
    }

    /// Final cells of the branches that ended on the boundary.
    pub fn exits(&self) -> impl Iterator<Item = Pos> + '_ {
        self.branches
            .iter()
            .filter_map(|branch| branch.last().copied())
            .filter(|pos| self.on_boundary(*pos))
    }

    fn set_cell(&mut self, pos: Pos, cell: Cell) -> Result<(), ChunkError> {
        let idx = self.index(pos).ok_or(ChunkError::MissingCell {
            origin: self.origin,
            pos,
        })?;
        self.cells[idx] = cell;
        Ok(())
    }

    fn arrival(&self, pos: Pos) -> Option<Dir> {
        self.cell(pos).and_then(Cell::arrival)
    }

    fn tail(&self) -> Result<Pos, ChunkError> {
        self.branches
            .last()
            .and_then(|branch| branch.last())
            .copied()
            .ok_or(ChunkError::NoBranch {
                origin: self.origin,
            })
    }

    fn start_branch(&mut self, pos: Pos) {
        self.branches.push(vec![pos]);
        self.search.dead_ends = vec![DirSet::default()];
        self.search.dead_cells = vec![false; self.cells.len()];
    }

    fn is_dead(&self, pos: Pos) -> bool {
        self.index(pos)
            .and_then(|idx| self.search.dead_cells.get(idx))
            .copied()
            .unwrap_or(false)
    }

    /// Turns `pos` into path, reached by moving `dir`, and appends it to the
    /// current branch.
    fn lay(&mut self, pos: Pos, dir: Dir) -> Result<(), ChunkError> {
        self.set_cell(pos, Cell::Path { arrival: Some(dir) })?;
        if let Some(branch) = self.branches.last_mut() {
            branch.push(pos);
            self.search.dead_ends.push(DirSet::default());
        }
        Ok(())
    }

    /// Seeds the very first chunk: a path cell on the centre and a straight
    /// run from it to the boundary in a random direction.
    pub fn create_first_path(&mut self, rng: &mut impl Rng) -> Result<(), ChunkError> {
        let center = self.center();
        self.set_cell(center, Cell::Path { arrival: None })?;
        self.start_branch(center);

        let dir = Dir::ALL[rng.gen_range(0..Dir::ALL.len())];
        let mut next = center.step(dir);
        while self.contains(next) {
            self.lay(next, dir)?;
            next = next.step(dir);
        }

        let len = self.branches[0].len();
        self.search.trunk_floor = len;
        self.search.init_fork = len / 2;
        self.search.fork = len / 2;
        self.search.stopped = true;
        self.search.last_finished = true;
        debug!(origin = %self.origin, ?dir, len, "first path laid");
        Ok(())
    }

    /// Starts the trunk of a chunk entered from a neighbour. `entry` is the
    /// neighbour's exit cell and `dir` the direction from it into this chunk.
    ///
    /// The first two cells always go straight: the edge cell cannot turn.
    /// A chunk one cell wide only gets the edge cell and is closed at once.
    pub fn create_path_until_fork(
        &mut self,
        entry: Pos,
        dir: Dir,
        rng: &mut impl Rng,
    ) -> Result<(), ChunkError> {
        self.search.entry = Some(dir);
        self.search.stopped = false;
        self.search.last_finished = false;

        let first = entry.step(dir);
        self.set_cell(first, Cell::Path { arrival: Some(dir) })?;
        self.start_branch(first);
        let second = first.step(dir);
        if !self.contains(second) {
            warn!(origin = %self.origin, size = self.size, "chunk too narrow for a trunk, closing it");
            self.search.trunk_floor = 1;
            self.search.stopped = true;
            self.search.last_finished = true;
            return Ok(());
        }
        self.lay(second, dir)?;
        self.search.trunk_floor = 2;

        if self.step_mode {
            debug!(origin = %self.origin, "trunk prepared, stepping");
            return Ok(());
        }
        self.finish_branch(None, rng)
    }

    /// Grows one more branch that should leave the chunk through `exit`.
    ///
    /// If the previous branch is closed, a new branch starts at the fork;
    /// otherwise the branch in progress keeps growing.
    pub fn create_path_until_edge(&mut self, exit: Dir, rng: &mut impl Rng) -> Result<(), ChunkError> {
        self.search.stopped = false;
        if self.search.last_finished {
            self.search.fork = self.search.init_fork;
            let fork = self
                .fork_cell()
                .ok_or(ChunkError::NoBranch { origin: self.origin })?;
            self.start_branch(fork);
            self.search.last_finished = false;
        }

        if self.step_mode {
            debug!(origin = %self.origin, ?exit, "edge branch prepared, stepping");
            return Ok(());
        }
        self.finish_branch(Some(exit), rng)
    }

    fn finish_branch(&mut self, exit: Option<Dir>, rng: &mut impl Rng) -> Result<(), ChunkError> {
        while !self.search.stopped {
            self.grow_step(exit, rng)?;
        }
        Ok(())
    }

    /// One unit of search work on the current branch. `exit` is `None`
    /// while growing the trunk towards its fork.
    pub fn grow_step(&mut self, exit: Option<Dir>, rng: &mut impl Rng) -> Result<Growth, ChunkError> {
        if self.search.stopped {
            return Ok(Growth::Idle);
        }
        if self.has_finished(exit, rng)? {
            return Ok(Growth::Finished);
        }

        let tail = self.tail()?;
        let candidates = self.candidates(tail);
        let dir = match candidates.len() {
            0 => return self.backtrack(exit),
            1 => candidates[0].dir,
            _ => {
                let weights =
                    policy::direction_weights(&self.tuning, &candidates, self.arrival(tail), exit);
                match policy::pick_weighted(rng, &weights) {
                    Some(dir) => dir,
                    None => return self.backtrack(exit),
                }
            }
        };

        let next = tail.step(dir);
        self.lay(next, dir)?;
        Ok(Growth::Placed(next))
    }

    fn has_finished(&mut self, exit: Option<Dir>, rng: &mut impl Rng) -> Result<bool, ChunkError> {
        match exit {
            None => {
                let len = self.branches.last().map_or(0, Vec::len);
                let Some(percent) = policy::fork_stop_percent(len, self.size) else {
                    return Ok(false);
                };
                if rng.gen_range(0..100) as f32 > percent {
                    return Ok(false);
                }
                debug!(origin = %self.origin, len, "trunk reached its fork");
            }
            Some(dir) => {
                let next = self.tail()?.step(dir);
                if !self.on_boundary(next) || self.is_path(next) {
                    return Ok(false);
                }
                self.lay(next, dir)?;
                if self.branches.len() == 1 {
                    let fork = self.branches[0].len() / 2;
                    self.search.init_fork = fork;
                    self.search.fork = fork;
                }
                self.search.last_finished = true;
                debug!(origin = %self.origin, exit = %next, "branch reached the edge");
            }
        }
        self.search.stopped = true;
        Ok(true)
    }

    fn candidates(&self, tail: Pos) -> Vec<Candidate> {
        let back = opposite(self.arrival(tail));
        let parent = opposite(self.search.entry);
        let dead = self.search.dead_ends.last().copied().unwrap_or_default();
        let center = self.center();

        Dir::ALL
            .into_iter()
            .filter(|dir| Some(*dir) != back && Some(*dir) != parent && !dead.contains(*dir))
            .filter_map(|dir| {
                let next = tail.step(dir);
                self.is_open(next, dir).then(|| Candidate {
                    dir,
                    distance_sq: next.distance_sq(center),
                })
            })
            .collect()
    }

    /// Whether the path may step onto `pos` by moving `dir`.
    fn is_open(&self, pos: Pos, dir: Dir) -> bool {
        match self.cell(pos) {
            Some(Cell::Grass) => {
                !self.on_boundary(pos) && !self.is_dead(pos) && !self.touches_path(pos, dir)
            }
            _ => false,
        }
    }

    fn touches_path(&self, pos: Pos, dir: Dir) -> bool {
        Dir::ALL
            .into_iter()
            .filter(|n| *n != dir.opposite())
            .any(|n| self.is_path(pos.step(n)))
    }

    fn backtrack(&mut self, exit: Option<Dir>) -> Result<Growth, ChunkError> {
        let is_trunk = self.branches.len() == 1;
        let len = self.branches.last().map_or(0, Vec::len);
        let floor = if is_trunk {
            self.search.trunk_floor.max(1)
        } else {
            1
        };

        if len <= floor {
            if !is_trunk {
                return self.move_fork();
            }
            warn!(origin = %self.origin, len, "trunk boxed in, closing it early");
            self.search.init_fork = len / 2;
            self.search.fork = len / 2;
            self.search.stopped = true;
            self.search.last_finished = true;
            return Ok(Growth::Exhausted);
        }

        let pos = self
            .branches
            .last_mut()
            .and_then(Vec::pop)
            .ok_or(ChunkError::NoBranch { origin: self.origin })?;
        self.search.dead_ends.pop();
        let arrival = self.arrival(pos);
        self.set_cell(pos, Cell::Grass)?;
        if let Some(dead) = self
            .index(pos)
            .and_then(|idx| self.search.dead_cells.get_mut(idx))
        {
            *dead = true;
        }

        if let Some(dead) = self.search.dead_ends.last_mut() {
            if let Some(dir) = arrival {
                dead.insert(dir);
            }
            if let Some(exit) = exit {
                dead.insert(exit.opposite());
            }
        }
        Ok(Growth::Backtracked(pos))
    }

    /// Drops the current branch and restarts it one trunk cell further on.
    fn move_fork(&mut self) -> Result<Growth, ChunkError> {
        let branch = self
            .branches
            .pop()
            .ok_or(ChunkError::NoBranch { origin: self.origin })?;
        for pos in branch.into_iter().skip(1) {
            self.set_cell(pos, Cell::Grass)?;
        }
        self.search.dead_ends.clear();

        let trunk_len = self.branches.first().map_or(0, Vec::len);
        if self.search.fork + 2 >= trunk_len {
            warn!(origin = %self.origin, fork = self.search.fork, "no fork cell left for this exit");
            self.search.stopped = true;
            self.search.last_finished = true;
            return Ok(Growth::Exhausted);
        }

        self.search.fork += 1;
        let fork = self.branches[0][self.search.fork];
        debug!(origin = %self.origin, fork = self.search.fork, trunk_len, "moving the fork");
        self.start_branch(fork);
        Ok(Growth::ForkMoved(fork))
    }
}
