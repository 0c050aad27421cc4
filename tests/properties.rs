//! Property-based tests for sequence generation and round scoring.

use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use rabbit_path::policy::count_consecutive_pairs;
use rabbit_path::{
    Command, GameConfig, Outcome, Phase, PolicyConfig, RoundResult, RoundStateMachine,
    SequencePolicy, StoneLayout,
};

fn playable() -> Vec<u8> {
    StoneLayout::default_river().playable_ids()
}

/// Machine in the input phase of its first scored round.
fn machine_at_input(seed: u64) -> RoundStateMachine<StdRng> {
    let config = GameConfig {
        trial_rounds: 0,
        ..GameConfig::default()
    };
    let mut m = RoundStateMachine::new(&config, playable(), StdRng::seed_from_u64(seed)).unwrap();
    m.handle(0.0, Command::Start);
    m.tick(10_000.0);
    assert_eq!(m.phase(), Phase::Input);
    m
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // 1. Sequences are ascending, distinct and sentinel-free
    #[test]
    fn generated_sequences_are_well_formed(seed in any::<u64>(), length in 1usize..=12) {
        let policy = SequencePolicy::new(PolicyConfig::grade4()).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let generated = policy.generate_sequence(&mut rng, &playable(), length);
        let stones = &generated.stones;
        prop_assert_eq!(stones.len(), length.min(10));
        prop_assert!(stones.windows(2).all(|w| w[0] < w[1]), "not ascending: {stones:?}");
        prop_assert!(stones.iter().all(|s| (1..=10).contains(s)));
        if generated.constrained {
            prop_assert!(count_consecutive_pairs(stones) <= policy.max_consecutive_for(stones.len()));
        }
    }

    // 2. Strict tiers never produce neighbours at the short lengths
    #[test]
    fn strict_policy_has_no_neighbours(seed in any::<u64>(), length in 3usize..=4) {
        let policy = SequencePolicy::new(PolicyConfig::grade3()).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let generated = policy.generate_sequence(&mut rng, &playable(), length);
        prop_assert!(generated.constrained);
        prop_assert_eq!(count_consecutive_pairs(&generated.stones), 0);
    }

    // 3. Length depends only on round index and history, and stays on a tier
    #[test]
    fn length_is_a_function_of_history(
        outcomes in prop::collection::vec(any::<bool>(), 0..12),
    ) {
        let policy = SequencePolicy::new(PolicyConfig::grade3()).unwrap();
        let history: Vec<RoundResult> = outcomes
            .iter()
            .enumerate()
            .map(|(round, &correct)| RoundResult {
                round,
                sequence: vec![1, 3, 5],
                input: vec![],
                correct,
            })
            .collect();
        let next = history.len();
        let a = policy.compute_length(next, &history, false);
        let b = policy.compute_length(next, &history, false);
        prop_assert_eq!(a, b);
        prop_assert!((3..=5).contains(&a));
        prop_assert_eq!(policy.compute_length(next, &history, true), 3);
    }

    // 4. Tapping the exact target scores
    #[test]
    fn exact_input_is_correct(seed in any::<u64>()) {
        let mut m = machine_at_input(seed);
        for stone in m.target() {
            m.handle(10_500.0, Command::Tap(stone));
        }
        prop_assert_eq!(m.state().last_outcome, Some(Outcome::Correct));
        prop_assert_eq!(m.state().score, 1);
    }

    // 5. Swapping two taps fails the round at the first mismatch
    #[test]
    fn reordered_input_is_wrong(seed in any::<u64>(), i in 0usize..3, j in 0usize..3) {
        prop_assume!(i != j);
        let mut m = machine_at_input(seed);
        let mut taps = m.target();
        taps.swap(i, j);
        for stone in taps {
            m.handle(10_500.0, Command::Tap(stone));
        }
        prop_assert_eq!(m.state().last_outcome, Some(Outcome::Wrong));
        prop_assert_eq!(m.state().score, 0);
    }

    // 6. A correct prefix left unfinished is wrong once the buffer runs out
    #[test]
    fn short_input_is_wrong(seed in any::<u64>(), keep in 1usize..3) {
        let mut m = machine_at_input(seed);
        for stone in m.target().into_iter().take(keep) {
            m.handle(10_500.0, Command::Tap(stone));
        }
        m.tick(40_000.0);
        prop_assert_eq!(m.phase(), Phase::Feedback);
        prop_assert_eq!(m.state().last_outcome, Some(Outcome::Wrong));
        prop_assert_eq!(m.state().history[0].input.len(), keep);
    }
}
