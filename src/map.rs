//! Bookkeeping for the chunks of one map: where they sit, which exits are
//! still free to attach a neighbour to, and which directions the chunk under
//! construction may still branch towards.

use std::collections::{BTreeMap, HashMap};

use rand::Rng;
use tracing::{debug, warn};

use crate::cell::{Cell, Pos};
use crate::chunk::Chunk;
use crate::direction::Dir;

/// Where the next chunk goes and how its path enters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    /// Index of the chunk owning the exit.
    pub owner: usize,
    /// The owner's exit cell.
    pub exit: Pos,
    /// Direction from the owner into the new chunk.
    pub dir: Dir,
    /// Origin of the new chunk.
    pub origin: Pos,
}

#[derive(Debug, Clone)]
pub struct MapChunks {
    chunk_size: usize,
    chunks: Vec<Chunk>,
    by_origin: HashMap<Pos, usize>,
    // Ordered so that a seeded draw picks the same exit on every run.
    exits: BTreeMap<Pos, usize>,
    attachment: Option<Attachment>,
    branch_dirs: Vec<Dir>,
    chosen_dir: Option<Dir>,
}

impl MapChunks {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            chunks: Vec::new(),
            by_origin: HashMap::new(),
            exits: BTreeMap::new(),
            attachment: None,
            branch_dirs: Vec::new(),
            chosen_dir: None,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    pub fn chunk_mut(&mut self, index: usize) -> Option<&mut Chunk> {
        self.chunks.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn last_attachment(&self) -> Option<Attachment> {
        self.attachment
    }

    pub fn chosen_direction(&self) -> Option<Dir> {
        self.chosen_dir
    }

    pub fn available_exits(&self) -> impl Iterator<Item = (Pos, usize)> + '_ {
        self.exits.iter().map(|(pos, owner)| (*pos, *owner))
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.by_origin.clear();
        self.exits.clear();
        self.attachment = None;
        self.branch_dirs.clear();
        self.chosen_dir = None;
    }

    pub fn add_chunk(&mut self, chunk: Chunk) -> usize {
        let index = self.chunks.len();
        self.by_origin.insert(chunk.origin(), index);
        self.chunks.push(chunk);
        index
    }

    /// Removes the newest chunk. Only valid before its exits were recorded.
    pub fn discard_last(&mut self) -> Option<Chunk> {
        let chunk = self.chunks.pop()?;
        self.by_origin.remove(&chunk.origin());
        self.branch_dirs.clear();
        self.chosen_dir = None;
        Some(chunk)
    }

    pub fn is_occupied(&self, origin: Pos) -> bool {
        self.by_origin.contains_key(&origin)
    }

    fn origin_for(&self, pos: Pos) -> Pos {
        let size = self.chunk_size as i32;
        Pos::new(pos.x.div_euclid(size) * size, pos.y.div_euclid(size) * size)
    }

    pub fn chunk_at(&self, pos: Pos) -> Option<&Chunk> {
        self.by_origin
            .get(&self.origin_for(pos))
            .map(|index| &self.chunks[*index])
    }

    pub fn cell_at(&self, pos: Pos) -> Option<&Cell> {
        self.chunk_at(pos).and_then(|chunk| chunk.cell(pos))
    }

    pub fn is_path(&self, pos: Pos) -> bool {
        self.cell_at(pos).is_some_and(Cell::is_path)
    }

    /// Registers every boundary-ending branch of a finished chunk as an exit.
    pub fn record_exits(&mut self, index: usize) {
        let Some(chunk) = self.chunks.get(index) else {
            return;
        };
        for exit in chunk.exits() {
            self.exits.entry(exit).or_insert(index);
        }
    }

    /// Draws a free exit and works out the chunk it leads to. Exits leading
    /// into an existing chunk are thrown away. `None` once no exit is left.
    pub fn pick_next_attachment(&mut self, rng: &mut impl Rng) -> Option<Attachment> {
        loop {
            if self.exits.is_empty() {
                warn!("no exits left, the network closed on itself");
                return None;
            }
            let pick = rng.gen_range(0..self.exits.len());
            let (exit, owner) = self.exits.iter().nth(pick).map(|(p, o)| (*p, *o))?;
            self.exits.remove(&exit);

            let chunk = &self.chunks[owner];
            let Some(dir) = chunk.edge_of(exit) else {
                warn!(%exit, owner, "exit is not on its chunk's edge");
                continue;
            };
            let origin = chunk.origin().step_by(dir, self.chunk_size as i32);
            if self.is_occupied(origin) {
                debug!(%exit, %origin, "exit leads into an existing chunk");
                continue;
            }

            let attachment = Attachment {
                owner,
                exit,
                dir,
                origin,
            };
            self.attachment = Some(attachment);
            return Some(attachment);
        }
    }

    /// Directions a chunk may still send a branch to: never back to its
    /// parent, never into an existing chunk.
    pub fn available_directions(&self, index: usize) -> Vec<Dir> {
        let Some(chunk) = self.chunks.get(index) else {
            return Vec::new();
        };
        let parent = chunk.entry().map(Dir::opposite);
        Dir::ALL
            .into_iter()
            .filter(|dir| Some(*dir) != parent)
            .filter(|dir| {
                !self.is_occupied(chunk.origin().step_by(*dir, self.chunk_size as i32))
            })
            .collect()
    }

    pub fn prepare_branch_directions(&mut self, index: usize) {
        self.branch_dirs = self.available_directions(index);
        self.chosen_dir = None;
    }

    /// Picks the exit direction of the chunk's next branch, each direction at
    /// most once. Once a branch has closed, another one only follows with
    /// `probability` percent chance.
    pub fn choose_branch_direction(
        &mut self,
        index: usize,
        probability: f32,
        rng: &mut impl Rng,
    ) -> Option<Dir> {
        if self.branch_dirs.is_empty() {
            debug!(index, "no branch directions left");
            return None;
        }
        let finished = self
            .chunks
            .get(index)
            .is_some_and(Chunk::is_last_branch_finished);
        if finished && rng.gen_range(0.0..100.0) > probability {
            return None;
        }

        let dir = self.branch_dirs.remove(rng.gen_range(0..self.branch_dirs.len()));
        self.chosen_dir = Some(dir);
        Some(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Tuning;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SIZE: usize = 13;

    fn first_chunk(rng: &mut StdRng) -> MapChunks {
        let mut map = MapChunks::new(SIZE);
        let mut chunk = Chunk::new(Pos::new(0, 0), SIZE, 1.0, Tuning::default(), false);
        chunk.create_first_path(rng).unwrap();
        let index = map.add_chunk(chunk);
        map.record_exits(index);
        map
    }

    #[test]
    fn attachment_follows_the_exit_edge() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut map = first_chunk(&mut rng);
        let exit = map.available_exits().next().unwrap().0;

        let attachment = map.pick_next_attachment(&mut rng).unwrap();
        assert_eq!(attachment.exit, exit);
        assert_eq!(attachment.owner, 0);
        assert_eq!(map.chunks()[0].edge_of(exit), Some(attachment.dir));
        assert_eq!(attachment.origin, Pos::new(0, 0).step_by(attachment.dir, SIZE as i32));
        assert!(map.chunk_at(exit.step(attachment.dir)).is_none());
        assert_eq!(map.available_exits().count(), 0);
    }

    #[test]
    fn exits_into_existing_chunks_are_dropped() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut map = first_chunk(&mut rng);
        let exit = map.available_exits().next().unwrap().0;
        let dir = map.chunks()[0].edge_of(exit).unwrap();
        let blocker = Chunk::new(
            Pos::new(0, 0).step_by(dir, SIZE as i32),
            SIZE,
            1.0,
            Tuning::default(),
            false,
        );
        map.add_chunk(blocker);

        assert_eq!(map.pick_next_attachment(&mut rng), None);
        assert_eq!(map.available_exits().count(), 0);
    }

    #[test]
    fn branch_directions_skip_parent_and_neighbours() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut map = MapChunks::new(SIZE);
        map.add_chunk(Chunk::new(Pos::new(0, 0), SIZE, 1.0, Tuning::default(), false));
        let mut child = Chunk::new(Pos::new(13, 0), SIZE, 1.0, Tuning::default(), false);
        child
            .create_path_until_fork(Pos::new(12, 6), Dir::Right, &mut rng)
            .unwrap();
        let index = map.add_chunk(child);

        let dirs = map.available_directions(index);
        assert!(!dirs.contains(&Dir::Left));
        assert_eq!(dirs.len(), 3);

        map.add_chunk(Chunk::new(Pos::new(13, -13), SIZE, 1.0, Tuning::default(), false));
        let dirs = map.available_directions(index);
        assert_eq!(dirs, vec![Dir::Down, Dir::Right]);
    }

    #[test]
    fn each_branch_direction_is_used_once() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut map = MapChunks::new(SIZE);
        let mut child = Chunk::new(Pos::new(0, 13), SIZE, 1.0, Tuning::default(), false);
        child
            .create_path_until_fork(Pos::new(6, 12), Dir::Down, &mut rng)
            .unwrap();
        let index = map.add_chunk(child);
        map.prepare_branch_directions(index);

        let mut seen = Vec::new();
        while let Some(dir) = map.choose_branch_direction(index, 100.0, &mut rng) {
            assert!(!seen.contains(&dir));
            seen.push(dir);
        }
        assert_eq!(seen.len(), 3);
        assert!(!seen.contains(&Dir::Up));
    }

    #[test]
    fn closed_branches_need_the_probability_roll() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut map = first_chunk(&mut rng);
        map.prepare_branch_directions(0);
        // The first chunk's trunk is closed already.
        assert_eq!(map.choose_branch_direction(0, 0.0, &mut rng), None);
        assert!(map.choose_branch_direction(0, 100.0, &mut rng).is_some());
    }

    #[test]
    fn queries_resolve_negative_coordinates() {
        let mut map = MapChunks::new(SIZE);
        map.add_chunk(Chunk::new(Pos::new(-13, -13), SIZE, 1.0, Tuning::default(), false));
        assert_eq!(map.chunk_at(Pos::new(-1, -1)).unwrap().origin(), Pos::new(-13, -13));
        assert_eq!(map.cell_at(Pos::new(-13, -1)), Some(&Cell::Grass));
        assert!(map.chunk_at(Pos::new(0, 0)).is_none());
        assert!(!map.is_path(Pos::new(-5, -5)));
    }
}
