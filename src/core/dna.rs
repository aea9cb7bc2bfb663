//! Base encoding and strand reversal
//!
//! Bases are stored in input rows as small integer codes. Reversing a
//! window flips the position axis and complements the base column while
//! every other column keeps its values.

use crate::core::batch::{BASE_COLUMN, POSITION_COLUMN};
use crate::core::coords::Strand;
use crate::core::vocab::Vocabulary;
use ndarray::{s, Array2, ArrayView2, ArrayViewMut2, Axis};

pub const CODE_A: u8 = 0;
pub const CODE_G: u8 = 1;
pub const CODE_T: u8 = 2;
pub const CODE_C: u8 = 3;
/// Any base that is not A, C, G or T
pub const CODE_N: u8 = 4;

/// Encode a sequence byte, case-insensitive
#[inline]
pub fn base_code(base: u8) -> u8 {
    match base {
        b'A' | b'a' => CODE_A,
        b'G' | b'g' => CODE_G,
        b'T' | b't' => CODE_T,
        b'C' | b'c' => CODE_C,
        _ => CODE_N,
    }
}

/// Decode a base code back to an uppercase byte
#[inline]
pub fn code_base(code: u8) -> u8 {
    match code {
        CODE_A => b'A',
        CODE_G => b'G',
        CODE_T => b'T',
        CODE_C => b'C',
        _ => b'N',
    }
}

/// Complement a base code (A<->T, G<->C, N fixed)
///
/// # Examples
/// ```
/// use genowin::core::dna::{base_code, complement_code};
/// assert_eq!(complement_code(base_code(b'A')), base_code(b'T'));
/// assert_eq!(complement_code(base_code(b'N')), base_code(b'N'));
/// ```
#[inline]
pub fn complement_code(code: u8) -> u8 {
    match code {
        CODE_A => CODE_T,
        CODE_T => CODE_A,
        CODE_G => CODE_C,
        CODE_C => CODE_G,
        _ => CODE_N,
    }
}

/// Reverse complement one window of input rows
pub fn rev_comp(inputs: ArrayView2<f32>) -> Array2<f32> {
    let mut out = inputs.slice(s![..;-1, ..]).to_owned();
    out.column_mut(BASE_COLUMN)
        .mapv_inplace(|code| complement_code(code as u8) as f32);
    out
}

/// Reverse complement one window in place
pub fn rev_comp_inplace(mut inputs: ArrayViewMut2<f32>) {
    let reversed = rev_comp(inputs.view());
    inputs.assign(&reversed);
}

/// Flip a per-base array along the position axis
pub fn reverse_rows<T: Clone>(rows: ArrayView2<T>) -> Array2<T> {
    rows.slice(s![..;-1, ..]).to_owned()
}

/// Whether a window was produced by reversing the strand
///
/// Position fractions increase along a forward window, so a decrease
/// marks a reversed one. Single-base windows read as forward.
pub fn is_reverse(inputs: ArrayView2<f32>) -> bool {
    let n = inputs.len_of(Axis(0));
    n > 1 && inputs[[0, POSITION_COLUMN]] > inputs[[n - 1, POSITION_COLUMN]]
}

/// Clear the label columns of `dropped` strand features
///
/// When TE metadata is present, the order and superfamily columns are
/// cleared at every base that no longer carries a TE feature.
pub fn mask_strand(mut labels: ArrayViewMut2<u8>, vocab: &Vocabulary, dropped: Strand) {
    let half = vocab.half();
    let (dropped_cols, kept_cols) = match dropped {
        Strand::Plus => (0..half, half..2 * half),
        Strand::Minus => (half..2 * half, 0..half),
    };
    labels.slice_mut(s![.., dropped_cols]).fill(0);

    if let (Some(order), Some(superfamily)) = (vocab.order_column(), vocab.superfamily_column()) {
        let te_cols: Vec<usize> = kept_cols.filter(|&id| vocab.is_te_feature(id)).collect();
        for mut row in labels.rows_mut() {
            if te_cols.iter().all(|&c| row[c] == 0) {
                row[order] = 0;
                row[superfamily] = 0;
            }
        }
    }
}
