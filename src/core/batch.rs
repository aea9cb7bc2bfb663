//! Region rows and window batches
//!
//! A [`Region`] holds the per-base rows fetched for one traversal step.
//! A [`WindowBatch`] exposes the windows of a region as views into those
//! rows, so overlapping windows share storage until a tensor is
//! materialized at the model boundary.

use crate::core::coords::{GenomeCoord, Geometry};
use crate::core::source::Context;
use ndarray::{s, Array2, Array3, ArrayView2};

/// Encoded base
pub const BASE_COLUMN: usize = 0;
/// 1-based position divided by chromosome length
pub const POSITION_COLUMN: usize = 1;
/// First of three (fraction, total) methylation pairs
pub const METHYLATION_COLUMN: usize = 2;
pub const PLOIDY_COLUMN: usize = 8;
pub const QUALITY_COLUMN: usize = 9;
/// Columns of an input row
pub const INPUT_FEATURES: usize = 10;

/// Fraction and total columns of a methylation context
///
/// # Examples
/// ```
/// use genowin::core::batch::methylation_columns;
/// use genowin::core::source::Context;
/// assert_eq!(methylation_columns(Context::CG), (2, 3));
/// assert_eq!(methylation_columns(Context::CHH), (6, 7));
/// ```
pub fn methylation_columns(context: Context) -> (usize, usize) {
    let fraction = METHYLATION_COLUMN + 2 * context.index();
    (fraction, fraction + 1)
}

/// Per-base rows of one fetched span
#[derive(Debug, Clone)]
pub struct Region {
    pub coord: GenomeCoord,
    /// Shape `(len, INPUT_FEATURES)`
    pub inputs: Array2<f32>,
    /// Shape `(len, label_width)` when an index is attached
    pub labels: Option<Array2<u8>>,
    /// Re-emitted to keep shards in lock step
    pub padding: bool,
}

impl Region {
    pub fn len(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.nrows() == 0
    }
}

/// A batch of fixed-length windows with their coordinates
#[derive(Debug, Clone)]
pub struct WindowBatch {
    pub coords: Vec<GenomeCoord>,
    inputs: Array2<f32>,
    labels: Option<Array2<u8>>,
    seq_len: usize,
    // Row distance between consecutive window starts
    stride: usize,
    /// Windows were reverse complemented
    pub reverse: bool,
    pub padding: bool,
}

impl WindowBatch {
    /// Overlapping windows of a region, `None` when it is shorter than `seq_len`
    ///
    /// A clipped region at a chromosome end yields fewer windows.
    pub fn from_region(region: Region, geometry: &Geometry) -> Option<Self> {
        let n = geometry.n_windows(region.len() as u64);
        if n == 0 {
            return None;
        }
        let coords = geometry.window_coords(
            &region.coord.chrom,
            region.coord.start,
            region.len() as u64,
        );
        Some(Self {
            coords,
            inputs: region.inputs,
            labels: region.labels,
            seq_len: geometry.seq_len,
            stride: geometry.offset,
            reverse: false,
            padding: region.padding,
        })
    }

    /// Stack independent windows of `seq_len` rows each
    pub fn stack(
        coords: Vec<GenomeCoord>,
        inputs: &[Array2<f32>],
        labels: Option<&[Array2<u8>]>,
        seq_len: usize,
    ) -> Self {
        let n = inputs.len();
        let width = inputs.first().map(|w| w.ncols()).unwrap_or(INPUT_FEATURES);
        let mut stacked = Array2::<f32>::zeros((n * seq_len, width));
        for (i, window) in inputs.iter().enumerate() {
            stacked
                .slice_mut(s![i * seq_len..(i + 1) * seq_len, ..])
                .assign(window);
        }
        let labels = labels.map(|windows| {
            let width = windows.first().map(|w| w.ncols()).unwrap_or(0);
            let mut stacked = Array2::<u8>::zeros((n * seq_len, width));
            for (i, window) in windows.iter().enumerate() {
                stacked
                    .slice_mut(s![i * seq_len..(i + 1) * seq_len, ..])
                    .assign(window);
            }
            stacked
        });
        Self {
            coords,
            inputs: stacked,
            labels,
            seq_len,
            stride: seq_len,
            reverse: false,
            padding: false,
        }
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn has_labels(&self) -> bool {
        self.labels.is_some()
    }

    /// Input rows of window `i`
    pub fn window(&self, i: usize) -> ArrayView2<'_, f32> {
        let start = i * self.stride;
        self.inputs.slice(s![start..start + self.seq_len, ..])
    }

    /// Label rows of window `i`
    pub fn label_window(&self, i: usize) -> Option<ArrayView2<'_, u8>> {
        let start = i * self.stride;
        self.labels
            .as_ref()
            .map(|labels| labels.slice(s![start..start + self.seq_len, ..]))
    }

    pub fn windows(&self) -> impl Iterator<Item = ArrayView2<'_, f32>> + '_ {
        (0..self.len()).map(move |i| self.window(i))
    }

    /// Materialize `(batch, seq_len, INPUT_FEATURES)`
    pub fn inputs_tensor(&self) -> Array3<f32> {
        let mut out = Array3::<f32>::zeros((self.len(), self.seq_len, self.inputs.ncols()));
        for (i, mut slot) in out.outer_iter_mut().enumerate() {
            slot.assign(&self.window(i));
        }
        out
    }

    /// Materialize `(batch, seq_len, label_width)`
    pub fn labels_tensor(&self) -> Option<Array3<u8>> {
        let width = self.labels.as_ref()?.ncols();
        let mut out = Array3::<u8>::zeros((self.len(), self.seq_len, width));
        for (i, mut slot) in out.outer_iter_mut().enumerate() {
            if let Some(window) = self.label_window(i) {
                slot.assign(&window);
            }
        }
        Some(out)
    }
}
