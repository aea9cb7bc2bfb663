//! Property-based tests for base encoding and strand reversal

use genowin::core::batch::{BASE_COLUMN, INPUT_FEATURES, POSITION_COLUMN};
use genowin::core::dna::{
    base_code, code_base, complement_code, is_reverse, mask_strand, rev_comp, reverse_rows,
};
use genowin::core::{Strand, Vocabulary};
use ndarray::Array2;
use proptest::prelude::*;

/// Generate a random sequence including ambiguous bases
fn arb_sequence() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        prop::sample::select(vec![b'A', b'C', b'G', b'T', b'N', b'a', b'c', b'g', b't', b'R']),
        1..80,
    )
}

/// Input rows of a forward window with arbitrary side columns
fn arb_window() -> impl Strategy<Value = Array2<f32>> {
    arb_sequence().prop_flat_map(|seq| {
        let n = seq.len();
        prop::collection::vec(0.0f32..10.0, n * INPUT_FEATURES).prop_map(move |values| {
            let mut rows = Array2::from_shape_vec((n, INPUT_FEATURES), values).unwrap();
            for (i, b) in seq.iter().enumerate() {
                rows[[i, BASE_COLUMN]] = base_code(*b) as f32;
                rows[[i, POSITION_COLUMN]] = (i + 1) as f32 / n as f32;
            }
            rows
        })
    })
}

proptest! {
    /// Complementing twice restores every base code
    #[test]
    fn prop_complement_involution(seq in arb_sequence()) {
        for b in seq {
            let code = base_code(b);
            prop_assert_eq!(complement_code(complement_code(code)), code);
            prop_assert!(code <= 4);
        }
    }

    /// Encoding then decoding gives the uppercase base or N
    #[test]
    fn prop_code_round_trip(seq in arb_sequence()) {
        for b in seq {
            let decoded = code_base(base_code(b));
            let upper = b.to_ascii_uppercase();
            if b"ACGT".contains(&upper) {
                prop_assert_eq!(decoded, upper);
            } else {
                prop_assert_eq!(decoded, b'N');
            }
        }
    }

    /// Reverse complement is self-inverse on whole windows
    #[test]
    fn prop_rev_comp_involution(window in arb_window()) {
        let twice = rev_comp(rev_comp(window.view()).view());
        prop_assert_eq!(twice, window);
    }

    /// Side columns are reversed but keep their values
    #[test]
    fn prop_rev_comp_keeps_side_columns(window in arb_window()) {
        let reversed = rev_comp(window.view());
        let n = window.nrows();
        for i in 0..n {
            for j in 0..INPUT_FEATURES {
                let original = window[[n - 1 - i, j]];
                if j == BASE_COLUMN {
                    prop_assert_eq!(reversed[[i, j]], complement_code(original as u8) as f32);
                } else {
                    prop_assert_eq!(reversed[[i, j]], original);
                }
            }
        }
        prop_assert_eq!(is_reverse(reversed.view()), n > 1);
        prop_assert!(!is_reverse(window.view()));
    }

    /// Masking one strand leaves only the other strand's columns
    #[test]
    fn prop_mask_strand_symmetry(
        bits in prop::collection::vec(any::<bool>(), 20 * 10),
        dropped in prop_oneof![Just(Strand::Plus), Just(Strand::Minus)],
    ) {
        let vocab = Vocabulary::reduced();
        let width = vocab.label_width();
        let mut labels = Array2::<u8>::zeros((10, width));
        for i in 0..10 {
            for j in 0..vocab.len() {
                labels[[i, j]] = bits[i * vocab.len() + j] as u8;
            }
            labels[[i, width - 2]] = 3;
            labels[[i, width - 1]] = 7;
        }
        let original = labels.clone();
        mask_strand(labels.view_mut(), &vocab, dropped);

        let half = vocab.half();
        for i in 0..10 {
            for j in 0..vocab.len() {
                let (strand, _) = vocab.feature(j).unwrap();
                if strand == dropped {
                    prop_assert_eq!(labels[[i, j]], 0);
                } else {
                    prop_assert_eq!(labels[[i, j]], original[[i, j]]);
                }
            }
            let kept_te = vocab
                .te_feature_ids()
                .into_iter()
                .filter(|&id| (id < half) == (dropped == Strand::Minus))
                .any(|id| labels[[i, id]] == 1);
            prop_assert_eq!(labels[[i, width - 2]] != 0, kept_te);
        }

        let flipped = reverse_rows(reverse_rows(labels.view()).view());
        prop_assert_eq!(flipped, labels);
    }
}
