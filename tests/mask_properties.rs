//! Property-based tests for run bounds and gap bridging

use genowin::core::mask::{bridge_array, fivenum, region_bounds};
use proptest::prelude::*;

fn arb_mask() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 0..120)
}

fn from_bits(bits: &[u8]) -> Vec<bool> {
    bits.iter().map(|&b| b == 1).collect()
}

#[test]
fn test_bridge_example() {
    let mask = from_bits(&[1, 1, 0, 0, 1, 1, 1, 0, 0, 0, 1, 1]);
    assert_eq!(
        bridge_array(&mask, 2, 2),
        from_bits(&[1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 1, 1])
    );
}

#[test]
fn test_bridge_clears_short_runs() {
    let mask = from_bits(&[1, 0, 0, 0, 1, 0, 1, 1, 1]);
    assert_eq!(
        bridge_array(&mask, 3, 0),
        from_bits(&[0, 0, 0, 0, 0, 0, 1, 1, 1])
    );
    assert_eq!(
        bridge_array(&mask, 3, 1),
        from_bits(&[0, 0, 0, 0, 1, 1, 1, 1, 1])
    );
}

proptest! {
    /// Exclusive bounds cover exactly the matching elements, in order
    #[test]
    fn prop_bounds_cover_runs(mask in arb_mask(), value in any::<bool>()) {
        let bounds = region_bounds(&mask, value, false);
        let mut rebuilt = vec![!value; mask.len()];
        let mut last_end = None;
        for &(s, e) in &bounds {
            prop_assert!(s < e);
            if let Some(prev) = last_end {
                // Separate runs never touch
                prop_assert!(s > prev);
            }
            rebuilt[s..e].fill(value);
            last_end = Some(e);
        }
        prop_assert_eq!(rebuilt, mask);
    }

    /// Inclusive bounds end one element earlier
    #[test]
    fn prop_inclusive_bounds(mask in arb_mask()) {
        let exclusive = region_bounds(&mask, true, false);
        let inclusive = region_bounds(&mask, true, true);
        prop_assert_eq!(exclusive.len(), inclusive.len());
        for ((s1, e1), (s2, e2)) in exclusive.into_iter().zip(inclusive) {
            prop_assert_eq!(s1, s2);
            prop_assert_eq!(e1 - 1, e2);
        }
    }

    /// Without parameters the mask is unchanged
    #[test]
    fn prop_bridge_identity(mask in arb_mask()) {
        prop_assert_eq!(bridge_array(&mask, 0, 0), mask);
    }

    /// Bridged runs respect the minimum size and never grow past the ends
    #[test]
    fn prop_bridge_bounds(mask in arb_mask(), min_size in 0usize..6, max_gap in 0usize..6) {
        let out = bridge_array(&mask, min_size, max_gap);
        prop_assert_eq!(out.len(), mask.len());
        for (s, e) in region_bounds(&out, true, false) {
            prop_assert!(e - s >= min_size.max(1));
        }
        if let (Some(first), Some(last)) = (mask.iter().position(|&m| m), mask.iter().rposition(|&m| m)) {
            for i in (0..first).chain(last + 1..mask.len()) {
                prop_assert!(!out[i]);
            }
        } else {
            prop_assert!(out.iter().all(|&m| !m));
        }
    }

    /// Filling gaps never removes a base when no size filter applies
    #[test]
    fn prop_fill_is_monotone(mask in arb_mask(), max_gap in 0usize..6) {
        let out = bridge_array(&mask, 0, max_gap);
        for (m, o) in mask.iter().zip(&out) {
            prop_assert!(!m || *o);
        }
    }

    /// Five-number summaries are ordered and bounded by the data
    #[test]
    fn prop_fivenum_ordered(values in prop::collection::vec(-1e6f64..1e6, 1..50)) {
        let five = fivenum(&values).unwrap();
        for pair in five.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        prop_assert_eq!(five[0], min);
        prop_assert_eq!(five[4], max);
    }
}
