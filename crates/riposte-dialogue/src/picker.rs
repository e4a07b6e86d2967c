//! Variant selection for line sets.
//!
//! The picker owns no data of its own; per-line pick state lives with the
//! caller (the speaker scheduler keeps one [`PickState`] per line set) so
//! the line database itself stays immutable and shareable.

use rand::Rng;

use crate::lines::{LineSet, PickPolicy};

/// Mutable pick bookkeeping for one line set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PickState {
    /// Next index for the sequential policies.
    pub next_index: usize,
    /// Most recently picked index, for repeat avoidance.
    pub last_picked: Option<usize>,
}

/// Choose a variant index from `set` according to its pick policy.
///
/// Returns `None` when no variant is available: the set is empty, or a
/// [`PickPolicy::SequentialOnce`] set has been exhausted.
pub fn pick_variant(set: &LineSet, state: &mut PickState, rng: &mut impl Rng) -> Option<usize> {
    let len = set.variants.len();
    if len == 0 {
        return None;
    }

    let picked = match set.policy {
        PickPolicy::RandomNoRepeat => pick_random_no_repeat(len, state.last_picked, rng),
        PickPolicy::SequentialRepeat => {
            let index = state.next_index.checked_rem(len).unwrap_or(0);
            state.next_index = index.saturating_add(1).checked_rem(len).unwrap_or(0);
            index
        }
        PickPolicy::SequentialOnce => {
            if state.next_index >= len {
                return None;
            }
            let index = state.next_index;
            state.next_index = state.next_index.saturating_add(1);
            index
        }
        PickPolicy::SequentialClamp => {
            let last = len.saturating_sub(1);
            let index = state.next_index.min(last);
            state.next_index = state.next_index.saturating_add(1).min(last);
            index
        }
        // The whole set plays as one chained utterance, starting at the
        // first variant; `successor` walks the rest.
        PickPolicy::AllInOrder => 0,
    };

    state.last_picked = Some(picked);
    Some(picked)
}

/// Uniform pick avoiding an immediate repeat when the set allows it.
fn pick_random_no_repeat(len: usize, last: Option<usize>, rng: &mut impl Rng) -> usize {
    match last {
        Some(last) if len > 1 && last < len => {
            // Draw from the set without the previous index, then shift
            // the draw past it so the distribution stays uniform.
            let draw = rng.random_range(0..len.saturating_sub(1));
            if draw >= last {
                draw.saturating_add(1)
            } else {
                draw
            }
        }
        _ => rng.random_range(0..len),
    }
}

/// The follow-up variant after `index` finishes, for chained sets.
///
/// Only [`PickPolicy::AllInOrder`] sets chain; every other policy ends
/// the utterance after a single variant.
pub fn successor(set: &LineSet, index: usize) -> Option<usize> {
    if set.policy != PickPolicy::AllInOrder {
        return None;
    }
    let next = index.checked_add(1)?;
    (next < set.variants.len()).then_some(next)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use crate::lines::{LineSet, LineVariant, PickPolicy};

    use super::*;

    fn set_of(count: usize, policy: PickPolicy) -> LineSet {
        let variants = (0..count)
            .map(|i| LineVariant::text_only(format!("variant {i}")))
            .collect();
        LineSet::new(variants).with_policy(policy)
    }

    #[test]
    fn empty_set_yields_nothing() {
        let set = set_of(0, PickPolicy::RandomNoRepeat);
        let mut state = PickState::default();
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(pick_variant(&set, &mut state, &mut rng), None);
    }

    #[test]
    fn random_never_repeats_immediately() {
        let set = set_of(3, PickPolicy::RandomNoRepeat);
        let mut state = PickState::default();
        let mut rng = SmallRng::seed_from_u64(7);

        let mut last = None;
        for _ in 0..200 {
            let picked = pick_variant(&set, &mut state, &mut rng);
            assert!(picked.is_some());
            if last.is_some() {
                assert_ne!(picked, last, "immediate repeat");
            }
            last = picked;
        }
    }

    #[test]
    fn random_single_variant_repeats() {
        let set = set_of(1, PickPolicy::RandomNoRepeat);
        let mut state = PickState::default();
        let mut rng = SmallRng::seed_from_u64(7);
        assert_eq!(pick_variant(&set, &mut state, &mut rng), Some(0));
        assert_eq!(pick_variant(&set, &mut state, &mut rng), Some(0));
    }

    #[test]
    fn sequential_repeat_wraps() {
        let set = set_of(3, PickPolicy::SequentialRepeat);
        let mut state = PickState::default();
        let mut rng = SmallRng::seed_from_u64(7);
        let picks: Vec<_> = (0..5)
            .filter_map(|_| pick_variant(&set, &mut state, &mut rng))
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn sequential_once_exhausts() {
        let set = set_of(2, PickPolicy::SequentialOnce);
        let mut state = PickState::default();
        let mut rng = SmallRng::seed_from_u64(7);
        assert_eq!(pick_variant(&set, &mut state, &mut rng), Some(0));
        assert_eq!(pick_variant(&set, &mut state, &mut rng), Some(1));
        assert_eq!(pick_variant(&set, &mut state, &mut rng), None);
    }

    #[test]
    fn sequential_clamp_sticks_on_last() {
        let set = set_of(2, PickPolicy::SequentialClamp);
        let mut state = PickState::default();
        let mut rng = SmallRng::seed_from_u64(7);
        assert_eq!(pick_variant(&set, &mut state, &mut rng), Some(0));
        assert_eq!(pick_variant(&set, &mut state, &mut rng), Some(1));
        assert_eq!(pick_variant(&set, &mut state, &mut rng), Some(1));
    }

    #[test]
    fn all_in_order_starts_at_zero_and_chains() {
        let set = set_of(3, PickPolicy::AllInOrder);
        let mut state = PickState::default();
        let mut rng = SmallRng::seed_from_u64(7);
        assert_eq!(pick_variant(&set, &mut state, &mut rng), Some(0));
        assert_eq!(successor(&set, 0), Some(1));
        assert_eq!(successor(&set, 1), Some(2));
        assert_eq!(successor(&set, 2), None);
    }

    #[test]
    fn non_chaining_policies_have_no_successor() {
        let set = set_of(3, PickPolicy::SequentialRepeat);
        assert_eq!(successor(&set, 0), None);
    }
}
