//! Boolean run utilities used by reconstruction
//!
//! Runs are reported as `(start, end)` pairs. Exclusive bounds are
//! half-open, inclusive bounds point at the last element of the run.

/// Bounds of every run of `value` in `mask`
///
/// # Examples
/// ```
/// use genowin::core::mask::region_bounds;
/// let mask = [true, true, false, false, true, true, true, false, false, true, true];
/// assert_eq!(region_bounds(&mask, true, true), vec![(0, 1), (4, 6), (9, 10)]);
/// assert_eq!(region_bounds(&mask, true, false), vec![(0, 2), (4, 7), (9, 11)]);
/// assert_eq!(region_bounds(&mask, false, false), vec![(2, 4), (7, 9)]);
/// ```
pub fn region_bounds(mask: &[bool], value: bool, inclusive: bool) -> Vec<(usize, usize)> {
    let mut bounds = Vec::new();
    let mut run_start = None;
    for (i, &m) in mask.iter().enumerate() {
        match (m == value, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(s)) => {
                bounds.push((s, i));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = run_start {
        bounds.push((s, mask.len()));
    }
    if inclusive {
        for bound in bounds.iter_mut() {
            bound.1 -= 1;
        }
    }
    bounds
}

/// Fill short gaps, then drop short runs
///
/// False gaps of at most `max_gap` bases that sit between two true runs
/// are filled first. True runs shorter than `min_size` are then cleared.
/// Leading and trailing gaps are never filled.
pub fn bridge_array(mask: &[bool], min_size: usize, max_gap: usize) -> Vec<bool> {
    let mut out = mask.to_vec();
    if max_gap > 0 {
        for (s, e) in region_bounds(mask, false, false) {
            if s > 0 && e < mask.len() && e - s <= max_gap {
                out[s..e].fill(true);
            }
        }
    }
    if min_size > 1 {
        for (s, e) in region_bounds(&out, true, false) {
            if e - s < min_size {
                out[s..e].fill(false);
            }
        }
    }
    out
}

/// Minimum, lower quartile, median, upper quartile and maximum
///
/// Quantiles interpolate linearly between order statistics. Returns
/// `None` for an empty slice.
pub fn fivenum(values: &[f64]) -> Option<[f64; 5]> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some([
        quantile(&sorted, 0.0),
        quantile(&sorted, 0.25),
        quantile(&sorted, 0.5),
        quantile(&sorted, 0.75),
        quantile(&sorted, 1.0),
    ])
}

/// Median of an unsorted slice
pub fn median(values: &[f64]) -> Option<f64> {
    fivenum(values).map(|f| f[2])
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIG: [u8; 12] = [1, 1, 0, 0, 1, 1, 1, 0, 0, 0, 1, 1];

    fn bools(values: &[u8]) -> Vec<bool> {
        values.iter().map(|&v| v == 1).collect()
    }

    #[test]
    fn test_bridge_identity() {
        assert_eq!(bridge_array(&bools(&ORIG), 1, 1), bools(&ORIG));
    }

    #[test]
    fn test_bridge_fills_short_gap() {
        assert_eq!(
            bridge_array(&bools(&ORIG), 2, 2),
            bools(&[1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 1, 1])
        );
    }

    #[test]
    fn test_bridge_drops_short_run() {
        assert_eq!(
            bridge_array(&bools(&ORIG), 3, 2),
            bools(&[1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0])
        );
    }

    #[test]
    fn test_bridge_fills_everything() {
        assert_eq!(bridge_array(&bools(&ORIG), 4, 3), vec![true; 12]);
    }

    #[test]
    fn test_bridge_keeps_edges() {
        let mask = bools(&[0, 1, 1, 0]);
        assert_eq!(bridge_array(&mask, 1, 5), mask);
    }

    #[test]
    fn test_region_bounds_empty() {
        assert!(region_bounds(&[], true, true).is_empty());
        assert!(region_bounds(&[false, false], true, false).is_empty());
        assert_eq!(region_bounds(&[true], true, true), vec![(0, 0)]);
    }

    #[test]
    fn test_fivenum() {
        let f = fivenum(&[5.0, 1.0, 3.0, 2.0, 4.0]).unwrap();
        assert_eq!(f, [1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), Some(2.5));
        assert_eq!(fivenum(&[]), None);
    }
}
