//! Adaptive sequence policy.
//!
//! A session is split into bands of `band_size` rounds. Every earlier band the
//! child finished without a mistake promotes the recall length by one tier, up
//! to the last tier. The tier is recomputed from the round history on every
//! call, so the same history always yields the same length.
//!
//! Sequences are drawn by rejection sampling: shuffle the playable stones,
//! take a prefix, sort it (the rabbit only hops forward) and accept it when the
//! number of adjacent ids differing by one stays within the tier's bound.

use std::collections::BTreeSet;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::machine::RoundResult;
use crate::stones::{StoneId, is_sentinel};

/// Rejection-sampling budget before falling back to an unconstrained draw.
pub const MAX_ATTEMPTS: usize = 500;

/// Recall length used for practice rounds by the shipped presets.
pub const TRIAL_LENGTH: usize = 3;

/// One allowed sequence length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tier {
    pub length: usize,
    /// How many adjacent `n, n + 1` pairs a sorted sequence may contain.
    pub max_consecutive_pairs: usize,
}

impl Tier {
    pub const fn new(length: usize, max_consecutive_pairs: usize) -> Self {
        Self {
            length,
            max_consecutive_pairs,
        }
    }
}

/// Declarative description of a grade's progression.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    #[serde(default = "default_trial_length")]
    pub trial_length: usize,
    pub band_size: usize,
    /// Ascending by length; `tiers[0]` is where every session starts.
    pub tiers: Vec<Tier>,
}

fn default_trial_length() -> usize {
    TRIAL_LENGTH
}

impl PolicyConfig {
    /// Grade 3: bands of three rounds, lengths 3 → 4 → 5, never two
    /// neighbouring stones.
    pub fn grade3() -> Self {
        Self {
            trial_length: TRIAL_LENGTH,
            band_size: 3,
            tiers: vec![Tier::new(3, 0), Tier::new(4, 0), Tier::new(5, 0)],
        }
    }

    /// Grade 4: bands of four rounds, lengths 4 → 5 → 6, allowing one and
    /// then two neighbouring pairs as the sequence grows.
    pub fn grade4() -> Self {
        Self {
            trial_length: TRIAL_LENGTH,
            band_size: 4,
            tiers: vec![Tier::new(4, 0), Tier::new(5, 1), Tier::new(6, 2)],
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.band_size == 0 {
            return Err(ConfigError::invalid("policy bandSize must be at least 1"));
        }
        if self.trial_length == 0 {
            return Err(ConfigError::invalid("policy trialLength must be at least 1"));
        }
        let Some(first) = self.tiers.first() else {
            return Err(ConfigError::invalid("policy needs at least one tier"));
        };
        if first.length == 0 {
            return Err(ConfigError::invalid("tier length must be at least 1"));
        }
        if self.tiers.windows(2).any(|w| w[1].length <= w[0].length) {
            return Err(ConfigError::invalid(
                "policy tiers must have strictly ascending lengths",
            ));
        }
        Ok(())
    }
}

/// Outcome of [`SequencePolicy::generate_sequence`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedSequence {
    /// Distinct playable ids, ascending.
    pub stones: Vec<StoneId>,
    /// Draws used, including the accepted one.
    pub attempts: usize,
    /// False when the attempt budget ran out and the last draw was kept
    /// despite breaking the consecutive-pair bound.
    pub constrained: bool,
}

/// Computes recall lengths and draws sequences for one policy variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequencePolicy {
    config: PolicyConfig,
}

impl SequencePolicy {
    pub fn new(config: PolicyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Target length for `round_index`.
    pub fn compute_length(
        &self,
        round_index: usize,
        history: &[RoundResult],
        is_trial: bool,
    ) -> usize {
        if is_trial {
            return self.config.trial_length;
        }
        let band = round_index / self.config.band_size;
        let top = self.config.tiers.len().saturating_sub(1);
        let tier = (0..band)
            .filter(|&b| self.band_passed(b, history))
            .count()
            .min(top);
        self.config.tiers[tier].length
    }

    /// A band passes when each of its round indices was recorded correct.
    /// Bands still in progress are never considered passed.
    pub fn band_passed(&self, band: usize, history: &[RoundResult]) -> bool {
        let size = self.config.band_size;
        let rounds = band * size..(band + 1) * size;
        let correct: BTreeSet<usize> = history
            .iter()
            .filter(|r| r.correct && rounds.contains(&r.round))
            .map(|r| r.round)
            .collect();
        correct.len() == size
    }

    /// Allowed consecutive pairs for a sequence of `length`.
    pub fn max_consecutive_for(&self, length: usize) -> usize {
        let tiers = &self.config.tiers;
        tiers
            .iter()
            .rev()
            .find(|t| t.length <= length)
            .or(tiers.first())
            .map_or(0, |t| t.max_consecutive_pairs)
    }

    /// Draw a sequence of `length` stones from `playable`.
    ///
    /// Sentinels and duplicates in `playable` are dropped first. When fewer
    /// stones remain than requested the whole pool is returned.
    pub fn generate_sequence<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        playable: &[StoneId],
        length: usize,
    ) -> GeneratedSequence {
        let mut pool: Vec<StoneId> = playable
            .iter()
            .copied()
            .filter(|&id| !is_sentinel(id))
            .collect();
        pool.sort_unstable();
        pool.dedup();

        let take = if length > pool.len() {
            warn!(
                requested = length,
                available = pool.len(),
                "Not enough playable stones, clamping sequence length"
            );
            pool.len()
        } else {
            length
        };
        let limit = self.max_consecutive_for(take);

        let mut candidate = Vec::with_capacity(take);
        for attempt in 1..=MAX_ATTEMPTS {
            pool.shuffle(rng);
            candidate.clear();
            candidate.extend_from_slice(&pool[..take]);
            candidate.sort_unstable();
            if count_consecutive_pairs(&candidate) <= limit {
                debug!(?candidate, attempt, "Sequence accepted");
                return GeneratedSequence {
                    stones: candidate,
                    attempts: attempt,
                    constrained: true,
                };
            }
        }

        warn!(
            ?candidate,
            limit,
            attempts = MAX_ATTEMPTS,
            "Consecutive-pair bound not met, using last draw"
        );
        GeneratedSequence {
            stones: candidate,
            attempts: MAX_ATTEMPTS,
            constrained: false,
        }
    }
}

/// Adjacent pairs in `sorted` whose ids differ by exactly one.
pub fn count_consecutive_pairs(sorted: &[StoneId]) -> usize {
    sorted.windows(2).filter(|w| w[1] == w[0].wrapping_add(1)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn result(round: usize, correct: bool) -> RoundResult {
        RoundResult {
            round,
            sequence: vec![1, 3, 5],
            input: if correct { vec![1, 3, 5] } else { vec![2] },
            correct,
        }
    }

    fn playable() -> Vec<StoneId> {
        (1..=10).collect()
    }

    #[test]
    fn trial_rounds_use_trial_length() {
        let policy = SequencePolicy::new(PolicyConfig::grade4()).unwrap();
        let history: Vec<_> = (0..8).map(|r| result(r, true)).collect();
        assert_eq!(policy.compute_length(9, &history, true), 3);
    }

    #[test]
    fn grade3_promotes_after_perfect_band() {
        let policy = SequencePolicy::new(PolicyConfig::grade3()).unwrap();
        let history: Vec<_> = (0..4).map(|r| result(r, true)).collect();
        assert_eq!(policy.compute_length(2, &history[..3], false), 3);
        assert_eq!(policy.compute_length(4, &history, false), 4);
    }

    #[test]
    fn grade4_tiers_climb_and_cap() {
        let policy = SequencePolicy::new(PolicyConfig::grade4()).unwrap();
        let all: Vec<_> = (0..16).map(|r| result(r, true)).collect();
        assert_eq!(policy.compute_length(0, &[], false), 4);
        assert_eq!(policy.compute_length(4, &all[..4], false), 5);
        assert_eq!(policy.compute_length(8, &all[..8], false), 6);
        assert_eq!(policy.compute_length(12, &all[..12], false), 6);
    }

    #[test]
    fn failed_band_keeps_tier_and_later_band_still_promotes() {
        let policy = SequencePolicy::new(PolicyConfig::grade4()).unwrap();
        let mut history: Vec<_> = (0..4).map(|r| result(r, true)).collect();
        history.extend((4..8).map(|r| result(r, r != 6)));
        assert_eq!(policy.compute_length(8, &history, false), 5);

        history.extend((8..12).map(|r| result(r, true)));
        assert_eq!(policy.compute_length(12, &history, false), 6);
    }

    #[test]
    fn partial_band_is_not_evaluated() {
        let policy = SequencePolicy::new(PolicyConfig::grade4()).unwrap();
        let history: Vec<_> = (0..3).map(|r| result(r, true)).collect();
        assert!(!policy.band_passed(0, &history));
        assert_eq!(policy.compute_length(3, &history, false), 4);
    }

    #[test]
    fn duplicate_entries_do_not_fake_a_pass() {
        let policy = SequencePolicy::new(PolicyConfig::grade3()).unwrap();
        let history = vec![result(0, true), result(0, true), result(1, true)];
        assert!(!policy.band_passed(0, &history));
    }

    #[test]
    fn consecutive_bound_follows_tiers() {
        let policy = SequencePolicy::new(PolicyConfig::grade4()).unwrap();
        assert_eq!(policy.max_consecutive_for(3), 0);
        assert_eq!(policy.max_consecutive_for(4), 0);
        assert_eq!(policy.max_consecutive_for(5), 1);
        assert_eq!(policy.max_consecutive_for(6), 2);
        assert_eq!(policy.max_consecutive_for(9), 2);
    }

    #[test]
    fn count_pairs() {
        assert_eq!(count_consecutive_pairs(&[1, 3, 5]), 0);
        assert_eq!(count_consecutive_pairs(&[1, 2, 3, 7]), 2);
        assert_eq!(count_consecutive_pairs(&[]), 0);
    }

    #[test]
    fn strict_sequences_have_no_neighbours() {
        let policy = SequencePolicy::new(PolicyConfig::grade3()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for length in [3, 4] {
            for _ in 0..200 {
                let generated = policy.generate_sequence(&mut rng, &playable(), length);
                assert!(generated.constrained);
                assert_eq!(generated.stones.len(), length);
                assert_eq!(count_consecutive_pairs(&generated.stones), 0);
            }
        }
    }

    #[test]
    fn impossible_bound_falls_back_to_last_draw() {
        let policy = SequencePolicy::new(PolicyConfig::grade3()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let generated = policy.generate_sequence(&mut rng, &playable(), 10);
        assert!(!generated.constrained);
        assert_eq!(generated.attempts, MAX_ATTEMPTS);
        assert_eq!(generated.stones, playable());
    }

    #[test]
    fn short_pool_is_clamped_and_sentinels_dropped() {
        let policy = SequencePolicy::new(PolicyConfig::grade3()).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let generated = policy.generate_sequence(&mut rng, &[0, 2, 2, 4, 11], 3);
        assert_eq!(generated.stones, vec![2, 4]);
        assert!(generated.constrained);
    }

    #[test]
    fn validation_rejects_bad_tiers() {
        let mut config = PolicyConfig::grade3();
        config.tiers.swap(0, 2);
        assert!(SequencePolicy::new(config).is_err());

        let empty = PolicyConfig {
            trial_length: 3,
            band_size: 3,
            tiers: Vec::new(),
        };
        assert!(SequencePolicy::new(empty).is_err());

        let zero_band = PolicyConfig {
            band_size: 0,
            ..PolicyConfig::grade4()
        };
        assert!(SequencePolicy::new(zero_band).is_err());
    }
}
