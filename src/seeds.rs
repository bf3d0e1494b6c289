use serde::Serialize;

use crate::types::{EventId, GroupId, PerilCorrelationGroup};

// Changing any constant invalidates every stored seed.
pub const GROUP_ID_HASH_CODE: i64 = 1_543_270_363;
pub const EVENT_ID_HASH_CODE: i64 = 1_943_272_559;
pub const PERIL_CORRELATION_GROUP_HASH: i64 = 1_836_311_903;
pub const HASH_MOD_CODE: i64 = 2_147_483_648;

/// A random seed in `[0, 2^31)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Seed(u32);

impl Seed {
    /// Reduces `raw` modulo `2^31`.
    pub fn new(raw: i64) -> Self {
        Seed(raw.rem_euclid(HASH_MOD_CODE) as u32)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

#[inline]
fn mix(key: i32, code: i64) -> i128 {
    (i128::from(key) * i128::from(code)).rem_euclid(i128::from(HASH_MOD_CODE))
}

#[inline]
fn reduce(sum: i128) -> Seed {
    // The remainder is below 2^31 so the narrowing is exact.
    Seed(sum.rem_euclid(i128::from(HASH_MOD_CODE)) as u32)
}

/// Seed for the independent stream of `group_id` in `event_id`.
pub fn seed_for_group_event(group_id: GroupId, event_id: EventId, base_seed: i64) -> Seed {
    reduce(
        i128::from(base_seed)
            + mix(group_id.0, GROUP_ID_HASH_CODE)
            + mix(event_id.0, EVENT_ID_HASH_CODE),
    )
}

/// Event-only seed, shared by every item of the event.
pub fn seed_for_event(event_id: EventId, base_seed: i64) -> Seed {
    reduce(i128::from(base_seed) + mix(event_id.0, EVENT_ID_HASH_CODE))
}

/// One shared seed per peril correlation group, in input order.
pub fn seed_vector_for_correlation_groups(
    peril_correlation_groups: &[PerilCorrelationGroup],
    event_id: EventId,
    base_seed: i64,
) -> Vec<Seed> {
    let event_term = mix(event_id.0, EVENT_ID_HASH_CODE);
    peril_correlation_groups
        .iter()
        .map(|g| {
            reduce(i128::from(base_seed) + mix(g.0, PERIL_CORRELATION_GROUP_HASH) + event_term)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn group_event_seed_matches_hand_computation() {
        // 7 * 1543270363 mod 2^31 = 65_474_301
        // 42 * 1943272559 mod 2^31 = 13_068_854
        let seed = seed_for_group_event(GroupId(7), EventId(42), 0);
        assert_eq!(seed.value(), 78_543_155);
    }

    #[test]
    fn group_event_seed_is_stable_across_calls() {
        let a = seed_for_group_event(GroupId(123), EventId(456), 789);
        let b = seed_for_group_event(GroupId(123), EventId(456), 789);
        assert_eq!(a, b);
    }

    #[test]
    fn event_seed_ignores_group_term() {
        let s = seed_for_event(EventId(42), 0);
        assert_eq!(s.value(), 13_068_854);
        assert_eq!(seed_for_event(EventId(42), 5).value(), 13_068_859);
    }

    #[test]
    fn base_seed_wraps_modulo_two_pow_31() {
        let s = seed_for_event(EventId(0), HASH_MOD_CODE + 3);
        assert_eq!(s.value(), 3);
    }

    #[test]
    fn correlation_vector_follows_input_order() {
        let groups = [PerilCorrelationGroup(1), PerilCorrelationGroup(2), PerilCorrelationGroup(1)];
        let seeds = seed_vector_for_correlation_groups(&groups, EventId(10), 0);
        assert_eq!(seeds.len(), 3);
        assert_eq!(seeds[0], seeds[2]);
        assert_ne!(seeds[0], seeds[1]);

        let expected = ((PERIL_CORRELATION_GROUP_HASH % HASH_MOD_CODE)
            + (10 * EVENT_ID_HASH_CODE) % HASH_MOD_CODE)
            % HASH_MOD_CODE;
        assert_eq!(i64::from(seeds[0].value()), expected);
    }

    #[test]
    fn correlation_hash_differs_from_group_hash() {
        let corr = seed_vector_for_correlation_groups(&[PerilCorrelationGroup(3)], EventId(9), 0);
        let group = seed_for_group_event(GroupId(3), EventId(9), 0);
        assert_ne!(corr[0], group);
    }

    #[test]
    fn empty_group_list_yields_no_seeds() {
        assert!(seed_vector_for_correlation_groups(&[], EventId(1), 0).is_empty());
    }

    proptest! {
        #[test]
        fn seeds_always_below_modulus(group in any::<i32>(), event in any::<i32>(), base in any::<i64>()) {
            let s = seed_for_group_event(GroupId(group), EventId(event), base);
            prop_assert!(i64::from(s.value()) < HASH_MOD_CODE);
            let e = seed_for_event(EventId(event), base);
            prop_assert!(i64::from(e.value()) < HASH_MOD_CODE);
        }

        #[test]
        fn small_keys_match_plain_i64_formula(group in 0i32..1_000_000, event in 0i32..1_000_000, base in 0i64..1_000_000) {
            let expected = (base
                + (i64::from(group) * GROUP_ID_HASH_CODE) % HASH_MOD_CODE
                + (i64::from(event) * EVENT_ID_HASH_CODE) % HASH_MOD_CODE)
                % HASH_MOD_CODE;
            let s = seed_for_group_event(GroupId(group), EventId(event), base);
            prop_assert_eq!(i64::from(s.value()), expected);
        }
    }
}
