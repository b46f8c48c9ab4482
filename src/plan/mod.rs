//! Combination selector.
//!
//! Given the lengths of the reactant streams and a [`CombinationPolicy`],
//! the planner decides which `(primary, secondary)` index pairs are actual
//! work. Paired mode aligns the two streams row by row; Matrix mode expands
//! the full cross product in row-major order so that per-primary-row cleanup
//! can bound memory to one row's worth of combinations. Optional sampling
//! restricts either mode to a bounded, seed-reproducible subset.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How two reactant streams combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombinationMode {
    /// Index i of stream 1 reacts with index i of stream 2.
    Paired,
    /// Every index of stream 1 reacts with every index of stream 2.
    Matrix,
}

/// Bounded random sub-sampling of the combination space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingSpec {
    /// Upper bound on the number of included combinations.
    pub max_count: u64,
    /// Seed for reproducible subsets; `None` seeds from entropy, making the
    /// run deliberately non-reproducible.
    pub seed: Option<i64>,
}

/// Combination policy of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinationPolicy {
    pub mode: CombinationMode,
    pub sampling: Option<SamplingSpec>,
}

impl CombinationPolicy {
    pub fn paired() -> Self {
        CombinationPolicy { mode: CombinationMode::Paired, sampling: None }
    }

    pub fn matrix() -> Self {
        CombinationPolicy { mode: CombinationMode::Matrix, sampling: None }
    }

    pub fn with_sampling(mut self, max_count: u64, seed: Option<i64>) -> Self {
        self.sampling = Some(SamplingSpec { max_count, seed });
        self
    }
}

/// Errors raised while planning combinations.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("random sampling requires input streams with a known length")]
    SamplingRequiresLength,
}

/// Which combinations of the enumerated space are included.
///
/// Mirrors the include/exclude optimization of randomized picking: when the
/// requested count exceeds half the total, the complement is sampled instead
/// so the stored set stays small.
#[derive(Debug, Clone)]
enum Selection {
    All,
    Include(HashSet<(u64, u64)>),
    Exclude(HashSet<(u64, u64)>),
}

/// The planned combination space of one run.
#[derive(Debug, Clone)]
pub struct CombinationPlan {
    arity: usize,
    mode: CombinationMode,
    len1: Option<u64>,
    len2: Option<u64>,
    selection: Selection,
    length_mismatch: bool,
}

/// Builds a [`CombinationPlan`].
///
/// `arity` is 1 or 2; `len1`/`len2` are the stream lengths where known
/// (`None` for streaming sources of unknown length; sampling then fails
/// with [`PlanError::SamplingRequiresLength`]).
pub fn plan(
    arity: usize,
    len1: Option<u64>,
    len2: Option<u64>,
    policy: &CombinationPolicy,
) -> Result<CombinationPlan, PlanError> {
    debug_assert!(arity == 1 || arity == 2);

    let length_mismatch = arity == 2
        && policy.mode == CombinationMode::Paired
        && matches!((len1, len2), (Some(a), Some(b)) if a != b);

    let selection = match &policy.sampling {
        None => Selection::All,
        Some(spec) => build_selection(arity, len1, len2, policy.mode, spec)?,
    };

    Ok(CombinationPlan { arity, mode: policy.mode, len1, len2, selection, length_mismatch })
}

fn build_selection(
    arity: usize,
    len1: Option<u64>,
    len2: Option<u64>,
    mode: CombinationMode,
    spec: &SamplingSpec,
) -> Result<Selection, PlanError> {
    let matrix = arity == 2 && mode == CombinationMode::Matrix;

    let len1 = len1.ok_or(PlanError::SamplingRequiresLength)?;
    let len2 = if arity == 2 { Some(len2.ok_or(PlanError::SamplingRequiresLength)?) } else { None };

    // Row-by-row combination spaces are bounded by the shortest stream; the
    // matrix space is the product of both lengths.
    let total = if matrix {
        len1.saturating_mul(len2.unwrap_or(0))
    } else {
        len2.map_or(len1, |l2| len1.min(l2))
    };

    if total <= spec.max_count {
        return Ok(Selection::All);
    }

    let inclusion_mode = spec.max_count <= total / 2;
    let target = if inclusion_mode { spec.max_count } else { total - spec.max_count };

    if target > 1_000_000 {
        log::warn!(
            "sampling {} combinations out of {}; the picked set may use considerable memory",
            target,
            total
        );
    }

    let mut rng = match spec.seed {
        Some(seed) => StdRng::seed_from_u64(seed as u64),
        None => StdRng::from_entropy(),
    };

    let mut picked: HashSet<(u64, u64)> = HashSet::with_capacity(target as usize);
    while (picked.len() as u64) < target {
        let pair = if matrix {
            (rng.gen_range(0..len1), rng.gen_range(0..len2.unwrap_or(1)))
        } else {
            let n = rng.gen_range(0..total);
            (n, n)
        };
        picked.insert(pair);
    }

    Ok(if inclusion_mode { Selection::Include(picked) } else { Selection::Exclude(picked) })
}

impl CombinationPlan {
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn mode(&self) -> CombinationMode {
        self.mode
    }

    /// True if paired mode was planned over streams of unequal known
    /// lengths; the caller reports this exactly once.
    pub fn has_length_mismatch(&self) -> bool {
        self.length_mismatch
    }

    /// True if the primary stream, or a required secondary stream, is known
    /// to be empty.
    pub fn is_empty_input(&self) -> bool {
        self.len1 == Some(0) || (self.arity == 2 && self.len2 == Some(0))
    }

    /// Number of rows paired iteration may cover, where both lengths are
    /// known.
    pub fn paired_len(&self) -> Option<u64> {
        match (self.len1, self.len2) {
            (Some(a), Some(b)) => Some(a.min(b)),
            _ => None,
        }
    }

    pub fn secondary_len(&self) -> Option<u64> {
        self.len2
    }

    /// Whether the combination `(i, j)` is part of the plan. `j` is `None`
    /// for single-reactant reactions (the row index keys the selection).
    pub fn is_included(&self, i: u64, j: Option<u64>) -> bool {
        let key = (i, j.unwrap_or(i));
        match &self.selection {
            Selection::All => true,
            Selection::Include(set) => set.contains(&key),
            Selection::Exclude(set) => !set.contains(&key),
        }
    }

    /// Enumerates the planned pairs in row-major order (primary index outer,
    /// secondary inner). Requires known stream lengths; streaming sources of
    /// unknown length are driven by the engine until exhaustion instead.
    pub fn pairs(&self) -> Box<dyn Iterator<Item = (u64, Option<u64>)> + '_> {
        let len1 = self.len1.unwrap_or(0);
        match (self.arity, self.mode) {
            (1, _) => Box::new(
                (0..len1).filter(move |i| self.is_included(*i, None)).map(|i| (i, None)),
            ),
            (_, CombinationMode::Paired) => {
                let bound = self.paired_len().unwrap_or(len1);
                Box::new(
                    (0..bound)
                        .filter(move |i| self.is_included(*i, Some(*i)))
                        .map(|i| (i, Some(i))),
                )
            }
            (_, CombinationMode::Matrix) => {
                let len2 = self.len2.unwrap_or(0);
                Box::new(
                    (0..len1)
                        .flat_map(move |i| (0..len2).map(move |j| (i, j)))
                        .filter(move |(i, j)| self.is_included(*i, Some(*j)))
                        .map(|(i, j)| (i, Some(j))),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_reactant_plan_covers_all_rows() {
        let policy = CombinationPolicy::paired();
        let plan = plan(1, Some(4), None, &policy).unwrap();
        let pairs: Vec<_> = plan.pairs().collect();
        assert_eq!(pairs, vec![(0, None), (1, None), (2, None), (3, None)]);
    }

    #[test]
    fn test_paired_plan_uses_shorter_stream() {
        let policy = CombinationPolicy::paired();
        let plan = plan(2, Some(5), Some(3), &policy).unwrap();
        assert!(plan.has_length_mismatch());
        assert_eq!(plan.pairs().count(), 3);
    }

    #[test]
    fn test_matrix_plan_is_row_major() {
        let policy = CombinationPolicy::matrix();
        let plan = plan(2, Some(2), Some(3), &policy).unwrap();
        let pairs: Vec<_> = plan.pairs().collect();
        assert_eq!(
            pairs,
            vec![
                (0, Some(0)),
                (0, Some(1)),
                (0, Some(2)),
                (1, Some(0)),
                (1, Some(1)),
                (1, Some(2)),
            ]
        );
    }

    #[test]
    fn test_sampling_is_reproducible_for_same_seed() {
        let policy = CombinationPolicy::matrix().with_sampling(5, Some(42));
        let first = plan(2, Some(10), Some(10), &policy).unwrap();
        let second = plan(2, Some(10), Some(10), &policy).unwrap();

        let a: Vec<_> = first.pairs().collect();
        let b: Vec<_> = second.pairs().collect();
        assert_eq!(a, b);
        assert!(a.len() <= 5);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_sampling_covers_everything_when_bound_exceeds_total() {
        let policy = CombinationPolicy::matrix().with_sampling(100, Some(1));
        let plan = plan(2, Some(3), Some(3), &policy).unwrap();
        assert_eq!(plan.pairs().count(), 9);
    }

    #[test]
    fn test_sampling_exclusion_mode_keeps_requested_count() {
        // 9 of 12: the complement (3 pairs) is sampled and excluded.
        let policy = CombinationPolicy::matrix().with_sampling(9, Some(7));
        let plan = plan(2, Some(3), Some(4), &policy).unwrap();
        assert_eq!(plan.pairs().count(), 9);
    }

    #[test]
    fn test_sampling_requires_known_lengths() {
        let policy = CombinationPolicy::matrix().with_sampling(5, Some(42));
        assert!(matches!(
            plan(2, Some(10), None, &policy),
            Err(PlanError::SamplingRequiresLength)
        ));
    }

    #[test]
    fn test_empty_input_detection() {
        let policy = CombinationPolicy::matrix();
        assert!(plan(2, Some(0), Some(4), &policy).unwrap().is_empty_input());
        assert!(plan(2, Some(4), Some(0), &policy).unwrap().is_empty_input());
        assert!(!plan(1, Some(4), None, &policy).unwrap().is_empty_input());
    }
}
