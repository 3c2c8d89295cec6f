//! Probability knobs of the path search and seed handling.
//!
//! Weights are plain percentages: every candidate direction gets a share of
//! the proximity pools (`100 * (1 - edge_bias)` for the cells nearest the
//! chunk centre, `100 * edge_bias` for the farthest) and of the straightness
//! pools (`100 * (1 - irregularity)` for carrying on straight,
//! `100 * irregularity` split among the turns). A candidate pointing at the
//! branch's exit gets a flat [`EXIT_BONUS`] on top.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::direction::Dir;

pub const EXIT_BONUS: f32 = 100.0;

/// Upper bound (exclusive) for seeds drawn when none was configured.
const MAX_RANDOM_SEED: i64 = 9_999_999;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tuning {
    /// 0 keeps paths near the chunk centre, 1 pushes them to the edges.
    pub edge_bias: f32,
    /// 0 keeps paths straight, 1 makes them turn erratically.
    pub irregularity: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            edge_bias: 0.5,
            irregularity: 0.5,
        }
    }
}

impl Tuning {
    pub fn new(edge_bias: f32, irregularity: f32) -> Self {
        Self {
            edge_bias: edge_bias.clamp(0.0, 1.0),
            irregularity: irregularity.clamp(0.0, 1.0),
        }
    }

    fn near_pool(&self) -> f32 {
        100.0 * (1.0 - self.edge_bias)
    }

    fn far_pool(&self) -> f32 {
        100.0 * self.edge_bias
    }

    fn straight_pool(&self) -> f32 {
        100.0 * (1.0 - self.irregularity)
    }

    fn turn_pool(&self) -> f32 {
        100.0 * self.irregularity
    }
}

/// A direction the search may take, with the squared distance from the cell
/// it leads to up to the chunk centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub dir: Dir,
    pub distance_sq: i64,
}

/// Selection weight for every candidate, in candidate order.
///
/// A candidate that is both nearest and farthest (all candidates equidistant)
/// collects both proximity shares.
pub fn direction_weights(
    tuning: &Tuning,
    candidates: &[Candidate],
    heading: Option<Dir>,
    exit: Option<Dir>,
) -> Vec<(Dir, f32)> {
    let Some(min) = candidates.iter().map(|c| c.distance_sq).min() else {
        return Vec::new();
    };
    let max = candidates
        .iter()
        .map(|c| c.distance_sq)
        .max()
        .unwrap_or(min);
    let min_count = candidates.iter().filter(|c| c.distance_sq == min).count() as f32;
    let max_count = candidates.iter().filter(|c| c.distance_sq == max).count() as f32;

    let has_straight = candidates.iter().any(|c| Some(c.dir) == heading);
    let turns = candidates.len() - usize::from(has_straight);

    candidates
        .iter()
        .map(|c| {
            let mut weight = 0.0;
            if c.distance_sq == min {
                weight += tuning.near_pool() / min_count;
            }
            if c.distance_sq == max {
                weight += tuning.far_pool() / max_count;
            }
            if Some(c.dir) == exit {
                weight += EXIT_BONUS;
            }
            if Some(c.dir) == heading {
                weight += tuning.straight_pool();
            } else if turns > 0 {
                weight += tuning.turn_pool() / turns as f32;
            }
            (c.dir, weight)
        })
        .collect()
}

/// Weighted draw. Falls back to a uniform draw when every weight is zero.
pub fn pick_weighted(rng: &mut impl Rng, weights: &[(Dir, f32)]) -> Option<Dir> {
    if weights.is_empty() {
        return None;
    }
    let total: f32 = weights.iter().map(|(_, w)| w.max(0.0)).sum();
    if total <= 0.0 {
        return Some(weights[rng.gen_range(0..weights.len())].0);
    }
    let roll = rng.gen_range(0.0..total);
    let mut sum = 0.0;
    for (dir, weight) in weights {
        sum += weight.max(0.0);
        if roll < sum {
            return Some(*dir);
        }
    }
    weights.iter().rev().find(|(_, w)| *w > 0.0).map(|(d, _)| *d)
}

/// Chance, in percent, that a trunk of `branch_len` cells stops here.
///
/// Zero until the trunk spans half the chunk, then grows linearly and hits
/// 100% once the trunk has gone a further half chunk. The half size is
/// clamped to at least one cell.
pub fn fork_stop_percent(branch_len: usize, chunk_size: usize) -> Option<f32> {
    let half = chunk_size as f32 / 2.0;
    let len = branch_len as f32;
    if len < half {
        return None;
    }
    Some((len - half) * 100.0 / half.max(1.0))
}

/// Chance, in percent, that a chunk keeps adding branches after its first.
pub fn branch_probability(increment: f32, chunks_so_far: usize) -> f32 {
    (increment * chunks_so_far as f32).min(100.0)
}

/// Turns the configured seed into the one actually used. Negative seeds ask
/// for a fresh random one, which is logged so the run can be replayed.
pub fn resolve_seed(seed: i64) -> u64 {
    let seed = if seed < 0 {
        rand::thread_rng().gen_range(0..MAX_RANDOM_SEED)
    } else {
        seed
    };
    info!(seed, "seed created");
    seed as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn weight_of(weights: &[(Dir, f32)], dir: Dir) -> f32 {
        weights.iter().find(|(d, _)| *d == dir).map(|(_, w)| *w).unwrap()
    }

    #[test]
    fn proximity_pools_split_between_nearest_and_farthest() {
        let tuning = Tuning::new(0.25, 0.0);
        let candidates = [
            Candidate { dir: Dir::Up, distance_sq: 4 },
            Candidate { dir: Dir::Left, distance_sq: 4 },
            Candidate { dir: Dir::Right, distance_sq: 9 },
        ];
        let weights = direction_weights(&tuning, &candidates, None, None);
        assert_eq!(weight_of(&weights, Dir::Up), 37.5);
        assert_eq!(weight_of(&weights, Dir::Left), 37.5);
        assert_eq!(weight_of(&weights, Dir::Right), 25.0);
    }

    #[test]
    fn equidistant_candidates_collect_both_pools() {
        let tuning = Tuning::new(0.3, 0.0);
        let candidates = [
            Candidate { dir: Dir::Up, distance_sq: 5 },
            Candidate { dir: Dir::Down, distance_sq: 5 },
        ];
        let weights = direction_weights(&tuning, &candidates, None, None);
        assert!((weight_of(&weights, Dir::Up) - 50.0).abs() < 1e-4);
        assert!((weight_of(&weights, Dir::Down) - 50.0).abs() < 1e-4);
    }

    #[test]
    fn straight_and_exit_bonuses() {
        let tuning = Tuning::new(0.5, 0.2);
        let candidates = [
            Candidate { dir: Dir::Up, distance_sq: 1 },
            Candidate { dir: Dir::Right, distance_sq: 1 },
            Candidate { dir: Dir::Left, distance_sq: 1 },
        ];
        let weights = direction_weights(&tuning, &candidates, Some(Dir::Up), Some(Dir::Right));
        // 100 / 3 proximity for everyone, 80 straight, 10 per turn, 100 exit.
        assert!((weight_of(&weights, Dir::Up) - (100.0 / 3.0 + 80.0)).abs() < 1e-4);
        assert!((weight_of(&weights, Dir::Right) - (100.0 / 3.0 + 10.0 + 100.0)).abs() < 1e-4);
        assert!((weight_of(&weights, Dir::Left) - (100.0 / 3.0 + 10.0)).abs() < 1e-4);
    }

    #[test]
    fn straight_wins_when_it_owns_both_pools() {
        // Heading away from the centre with edge bias 1 and irregularity 0:
        // the turns only qualify for empty pools.
        let tuning = Tuning::new(1.0, 0.0);
        let candidates = [
            Candidate { dir: Dir::Right, distance_sq: 16 },
            Candidate { dir: Dir::Up, distance_sq: 10 },
            Candidate { dir: Dir::Down, distance_sq: 10 },
        ];
        let weights = direction_weights(&tuning, &candidates, Some(Dir::Right), None);
        let mut rng = StdRng::seed_from_u64(9);
        let straight = (0..1000)
            .filter(|_| pick_weighted(&mut rng, &weights) == Some(Dir::Right))
            .count();
        assert!(straight >= 990, "straight picked {straight} times");
    }

    #[test]
    fn pick_weighted_respects_zero_weights() {
        let mut rng = StdRng::seed_from_u64(1);
        let weights = [(Dir::Up, 0.0), (Dir::Down, 3.0), (Dir::Left, 0.0)];
        for _ in 0..200 {
            assert_eq!(pick_weighted(&mut rng, &weights), Some(Dir::Down));
        }
        assert_eq!(pick_weighted(&mut rng, &[]), None);
        let all_zero = [(Dir::Up, 0.0), (Dir::Down, 0.0)];
        assert!(pick_weighted(&mut rng, &all_zero).is_some());
    }

    #[test]
    fn fork_stop_percent_ramps_over_half_a_chunk() {
        assert_eq!(fork_stop_percent(5, 13), None);
        assert_eq!(fork_stop_percent(7, 14), Some(0.0));
        assert_eq!(fork_stop_percent(14, 14), Some(100.0));
        // Tiny chunks clamp the half size to one cell.
        assert_eq!(fork_stop_percent(2, 1), Some(150.0));
    }

    #[test]
    fn branch_probability_is_capped() {
        assert_eq!(branch_probability(10.0, 3), 30.0);
        assert_eq!(branch_probability(40.0, 5), 100.0);
        assert_eq!(branch_probability(0.0, 50), 0.0);
    }

    #[test]
    fn explicit_seeds_are_kept() {
        assert_eq!(resolve_seed(42), 42);
        assert!(resolve_seed(-1) < MAX_RANDOM_SEED as u64);
    }
}
