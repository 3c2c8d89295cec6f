//! Drives a whole generation run as a resumable state machine.
//!
//! [`MapGenerator::advance`] performs one unit of work and reports it;
//! [`MapGenerator::run`] loops it until the run is over, so a stepped run and
//! a batch run with the same seed produce the same map.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info};

use crate::cell::{Cell, Pos};
use crate::chunk::{Chunk, Growth};
use crate::config::MapConfig;
use crate::direction::Dir;
use crate::error::{ChunkError, GenerationError, Result};
use crate::map::MapChunks;
use crate::policy;

/// Hooks for whoever turns the map into something visible. Both are
/// advisory: the generator never looks at what they do.
pub trait MapObserver {
    /// Called for every cell of a chunk once the chunk is complete.
    fn materialize_cell(&mut self, _chunk: usize, _pos: Pos, _cell: &Cell) {}

    /// Called once per chunk after all its branches are laid.
    fn chunk_completed(&mut self, _index: usize, _chunk: &Chunk) {}
}

impl MapObserver for () {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    /// Every exit was used up or led into an existing chunk.
    ExhaustedExits,
    /// An invariant fault discarded the chunk under construction.
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    InitialChunk,
    PickNextChunk,
    GrowTrunk,
    ChooseBranch,
    GrowBranch(Dir),
    FinalizeChunk,
    Done(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    ChunkCreated(usize),
    Grew(Growth),
    BranchChosen(Dir),
    BranchesClosed(usize),
    ChunkFinished(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Pending(Progress),
    Done(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationReport {
    pub requested: usize,
    pub produced: usize,
    pub seed: u64,
    pub reason: StopReason,
}

#[derive(Debug, Clone)]
pub struct MapGenerator {
    config: MapConfig,
    seed: u64,
    rng: StdRng,
    map: MapChunks,
    phase: Phase,
    branch_probability: f32,
}

impl MapGenerator {
    /// Validates the configuration and seeds the run. No chunk exists yet.
    pub fn new(config: MapConfig) -> Result<Self> {
        config.validate()?;
        let seed = policy::resolve_seed(config.seed);
        Ok(Self {
            map: MapChunks::new(config.chunk_size),
            rng: StdRng::seed_from_u64(seed),
            seed,
            config,
            phase: Phase::InitialChunk,
            branch_probability: 0.0,
        })
    }

    /// Throws the map away and starts over with `seed` (negative for random).
    pub fn reset(&mut self, seed: i64) {
        self.config.seed = seed;
        self.seed = policy::resolve_seed(seed);
        self.rng = StdRng::seed_from_u64(self.seed);
        self.map.clear();
        self.phase = Phase::InitialChunk;
        self.branch_probability = 0.0;
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn map(&self) -> &MapChunks {
        &self.map
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done(_))
    }

    pub fn branch_probability(&self) -> f32 {
        self.branch_probability
    }

    /// Runs to the end and reports how many chunks were produced.
    pub fn run(&mut self, observer: &mut impl MapObserver) -> Result<GenerationReport> {
        loop {
            if let Step::Done(reason) = self.advance(observer)? {
                return Ok(self.report(reason));
            }
        }
    }

    pub fn report(&self, reason: StopReason) -> GenerationReport {
        GenerationReport {
            requested: self.config.chunk_count,
            produced: self.map.len(),
            seed: self.seed,
            reason,
        }
    }

    pub fn advance(&mut self, observer: &mut impl MapObserver) -> Result<Step> {
        let step = match self.phase {
            Phase::InitialChunk => {
                let mut chunk = self.new_chunk(Pos::new(0, 0));
                if let Err(source) = chunk.create_first_path(&mut self.rng) {
                    return Err(self.fault(0, source));
                }
                let index = self.map.add_chunk(chunk);
                info!(index, "initial chunk created");
                self.phase = Phase::FinalizeChunk;
                Step::Pending(Progress::ChunkCreated(index))
            }
            Phase::PickNextChunk => {
                if self.map.len() >= self.config.chunk_count {
                    info!(chunks = self.map.len(), "number of chunks reached");
                    return Ok(self.finish(StopReason::TargetReached));
                }
                let Some(attachment) = self.map.pick_next_attachment(&mut self.rng) else {
                    return Ok(self.finish(StopReason::ExhaustedExits));
                };

                self.branch_probability =
                    policy::branch_probability(self.config.branch_increment, self.map.len());
                let index = self.map.len();
                let mut chunk = self.new_chunk(attachment.origin);
                if let Err(source) =
                    chunk.create_path_until_fork(attachment.exit, attachment.dir, &mut self.rng)
                {
                    return Err(self.fault(index, source));
                }
                self.map.add_chunk(chunk);
                self.map.prepare_branch_directions(index);
                info!(
                    index,
                    origin = %attachment.origin,
                    dir = ?attachment.dir,
                    branch_probability = self.branch_probability,
                    "chunk created"
                );
                self.phase = Phase::GrowTrunk;
                Step::Pending(Progress::ChunkCreated(index))
            }
            Phase::GrowTrunk => {
                let growth = self.grow(None)?;
                if growth.is_done() {
                    self.phase = Phase::ChooseBranch;
                }
                Step::Pending(Progress::Grew(growth))
            }
            Phase::ChooseBranch => {
                let index = self.current();
                match self
                    .map
                    .choose_branch_direction(index, self.branch_probability, &mut self.rng)
                {
                    Some(dir) => {
                        let result = match self.map.chunk_mut(index) {
                            Some(chunk) => chunk.create_path_until_edge(dir, &mut self.rng),
                            None => Ok(()),
                        };
                        if let Err(source) = result {
                            return Err(self.fault(index, source));
                        }
                        debug!(index, ?dir, "growing branch");
                        self.phase = Phase::GrowBranch(dir);
                        Step::Pending(Progress::BranchChosen(dir))
                    }
                    None => {
                        self.phase = Phase::FinalizeChunk;
                        Step::Pending(Progress::BranchesClosed(index))
                    }
                }
            }
            Phase::GrowBranch(dir) => {
                let growth = self.grow(Some(dir))?;
                if growth.is_done() {
                    self.phase = Phase::ChooseBranch;
                }
                Step::Pending(Progress::Grew(growth))
            }
            Phase::FinalizeChunk => {
                let index = self.current();
                self.map.record_exits(index);
                if let Some(chunk) = self.map.chunk(index) {
                    for (pos, cell) in chunk.cells() {
                        observer.materialize_cell(index, pos, cell);
                    }
                    observer.chunk_completed(index, chunk);
                }
                self.phase = Phase::PickNextChunk;
                Step::Pending(Progress::ChunkFinished(index))
            }
            Phase::Done(reason) => Step::Done(reason),
        };
        Ok(step)
    }

    fn new_chunk(&self, origin: Pos) -> Chunk {
        Chunk::new(
            origin,
            self.config.chunk_size,
            self.config.cell_size,
            self.config.tuning(),
            self.config.step_mode,
        )
    }

    fn current(&self) -> usize {
        self.map.len().saturating_sub(1)
    }

    fn grow(&mut self, exit: Option<Dir>) -> Result<Growth> {
        let index = self.current();
        let result = match self.map.chunk_mut(index) {
            Some(chunk) => chunk.grow_step(exit, &mut self.rng),
            None => Ok(Growth::Idle),
        };
        result.map_err(|source| self.fault(index, source))
    }

    fn finish(&mut self, reason: StopReason) -> Step {
        info!(chunks = self.map.len(), ?reason, "generation finished");
        self.phase = Phase::Done(reason);
        Step::Done(reason)
    }

    /// Drops the chunk under construction so the map only holds consistent
    /// chunks, and ends the run.
    fn fault(&mut self, index: usize, source: ChunkError) -> GenerationError {
        error!(index, %source, "invariant fault, discarding chunk");
        if self.map.len() > index {
            self.map.discard_last();
        }
        self.phase = Phase::Done(StopReason::Aborted);
        GenerationError::Chunk { index, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        cells: usize,
        completed: Vec<usize>,
    }

    impl MapObserver for Recorder {
        fn materialize_cell(&mut self, _chunk: usize, _pos: Pos, _cell: &Cell) {
            self.cells += 1;
        }

        fn chunk_completed(&mut self, index: usize, _chunk: &Chunk) {
            self.completed.push(index);
        }
    }

    fn seeded(seed: i64) -> MapConfig {
        MapConfig {
            seed,
            ..MapConfig::default()
        }
    }

    #[test]
    fn seed_42_builds_from_the_centre() {
        let mut generator = MapGenerator::new(seeded(42)).unwrap();
        let report = generator.run(&mut ()).unwrap();
        assert_eq!(report.seed, 42);
        assert_eq!(report.produced, 5);
        assert_eq!(report.reason, StopReason::TargetReached);

        let chunks = generator.map().chunks();
        assert_eq!(chunks[0].branches()[0][0], Pos::new(6, 6));
        let second = &chunks[1];
        let dir = second.entry().unwrap();
        assert_eq!(second.origin(), chunks[0].origin().step_by(dir, 13));
        let exit = second.branches()[0][0].step(dir.opposite());
        assert!(chunks[0].exits().any(|e| e == exit));
        assert_eq!(chunks[0].edge_of(exit), Some(dir));
    }

    #[test]
    fn stepped_and_batch_runs_agree() {
        for seed in [1, 7, 42, 1234] {
            let mut batch = MapGenerator::new(seeded(seed)).unwrap();
            batch.run(&mut ()).unwrap();
            let mut stepped = MapGenerator::new(MapConfig {
                step_mode: true,
                ..seeded(seed)
            })
            .unwrap();
            let mut steps = 0;
            while let Step::Pending(_) = stepped.advance(&mut ()).unwrap() {
                steps += 1;
            }
            assert!(steps > batch.map().len());
            assert_eq!(batch.map().len(), stepped.map().len());
            for (a, b) in batch.map().chunks().iter().zip(stepped.map().chunks()) {
                assert_eq!(a.origin(), b.origin());
                assert_eq!(a.branches(), b.branches());
            }
        }
    }

    #[test]
    fn observer_sees_every_finished_chunk() {
        let mut generator = MapGenerator::new(seeded(3)).unwrap();
        let mut recorder = Recorder::default();
        let report = generator.run(&mut recorder).unwrap();
        assert_eq!(recorder.completed, (0..report.produced).collect::<Vec<_>>());
        assert_eq!(recorder.cells, report.produced * 13 * 13);
    }

    #[test]
    fn invalid_config_builds_nothing() {
        let err = MapGenerator::new(MapConfig {
            irregularity: 3.0,
            ..MapConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, GenerationError::Config(_)));
    }

    #[test]
    fn fault_discards_the_broken_chunk() {
        let mut generator = MapGenerator::new(MapConfig {
            step_mode: true,
            ..seeded(0)
        })
        .unwrap();
        while generator.phase() != Phase::GrowTrunk {
            generator.advance(&mut ()).unwrap();
        }
        assert_eq!(generator.map().len(), 2);

        let err = generator.fault(1, ChunkError::NoBranch { origin: Pos::new(0, 0) });
        assert!(matches!(err, GenerationError::Chunk { index: 1, .. }));
        assert_eq!(generator.map().len(), 1);
        assert_eq!(generator.phase(), Phase::Done(StopReason::Aborted));
        assert_eq!(
            generator.advance(&mut ()).unwrap(),
            Step::Done(StopReason::Aborted)
        );
    }

    #[test]
    fn one_cell_chunks_end_the_run_cleanly() {
        let mut generator = MapGenerator::new(MapConfig {
            chunk_size: 1,
            ..seeded(0)
        })
        .unwrap();
        let report = generator.run(&mut ()).unwrap();
        assert!(report.produced >= 2);
        assert_ne!(report.reason, StopReason::Aborted);
    }

    #[test]
    fn reset_replays_the_same_seed() {
        let mut generator = MapGenerator::new(seeded(11)).unwrap();
        generator.run(&mut ()).unwrap();
        let first: Vec<Pos> = generator.map().chunks().iter().map(Chunk::origin).collect();
        generator.reset(11);
        assert!(generator.map().is_empty());
        generator.run(&mut ()).unwrap();
        let second: Vec<Pos> = generator.map().chunks().iter().map(Chunk::origin).collect();
        assert_eq!(first, second);
    }
}
