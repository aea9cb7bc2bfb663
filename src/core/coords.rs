//! Coordinates, strands and traversal geometry
//!
//! All coordinates in this crate are 0-based and half-open unless a
//! function says otherwise. Annotation files are converted at the
//! format boundary.

use crate::core::error::{ShapeError, ShapeResult};
use std::fmt;
use std::iter::StepBy;
use std::ops::Range;

/// Strand orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Strand {
    #[default]
    Plus,
    Minus,
}

impl Strand {
    /// Get the complement strand
    ///
    /// # Examples
    /// ```
    /// use genowin::core::Strand;
    /// assert_eq!(Strand::Plus.complement(), Strand::Minus);
    /// assert_eq!(Strand::Minus.complement(), Strand::Plus);
    /// ```
    pub fn complement(&self) -> Self {
        match self {
            Strand::Plus => Strand::Minus,
            Strand::Minus => Strand::Plus,
        }
    }

    /// Parse strand from char
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Strand::Plus),
            '-' => Some(Strand::Minus),
            _ => None,
        }
    }

    /// Convert to char
    pub fn to_char(&self) -> char {
        match self {
            Strand::Plus => '+',
            Strand::Minus => '-',
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// A half-open range on one chromosome
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenomeCoord {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

impl GenomeCoord {
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
        }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl fmt::Display for GenomeCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chrom, self.start, self.end)
    }
}

/// One of `count` cooperating workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    pub rank: usize,
    pub count: usize,
}

impl Shard {
    pub fn new(rank: usize, count: usize) -> ShapeResult<Self> {
        if count == 0 || rank >= count {
            return Err(ShapeError::InvalidShard { rank, count });
        }
        Ok(Self { rank, count })
    }

    /// The only shard of an unsharded run
    pub fn single() -> Self {
        Self { rank: 0, count: 1 }
    }

    /// Rank 0 computes summaries and writes shared output
    pub fn is_lead(&self) -> bool {
        self.rank == 0
    }
}

impl Default for Shard {
    fn default() -> Self {
        Self::single()
    }
}

/// Window geometry shared by every traversal mode
///
/// A region fetched for one batch spans `seq_len + (batch_size - 1) * offset`
/// bases, and window `i` of that region starts `i * offset` bases in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub seq_len: usize,
    pub offset: usize,
    pub batch_size: usize,
}

impl Geometry {
    pub fn new(seq_len: usize, offset: usize, batch_size: usize) -> ShapeResult<Self> {
        if seq_len == 0 || offset == 0 || batch_size == 0 {
            return Err(ShapeError::InvalidGeometry(format!(
                "seq_len={}, offset={}, batch_size={} (all must be at least 1)",
                seq_len, offset, batch_size
            )));
        }
        Ok(Self {
            seq_len,
            offset,
            batch_size,
        })
    }

    /// Bases fetched for one full batch
    pub fn region_len(&self) -> u64 {
        (self.seq_len + (self.batch_size - 1) * self.offset) as u64
    }

    /// Number of windows that fit in a region of `len` bases
    pub fn n_windows(&self, len: u64) -> usize {
        let seq_len = self.seq_len as u64;
        if len < seq_len {
            0
        } else {
            ((len - seq_len) / self.offset as u64 + 1) as usize
        }
    }

    /// Coordinates of every window in the region starting at `start`
    ///
    /// # Examples
    /// ```
    /// use genowin::core::{GenomeCoord, Geometry};
    /// let geometry = Geometry::new(5, 2, 3).unwrap();
    /// let coords = geometry.window_coords("Chr1", 0, 9);
    /// assert_eq!(coords, vec![
    ///     GenomeCoord::new("Chr1", 0, 5),
    ///     GenomeCoord::new("Chr1", 2, 7),
    ///     GenomeCoord::new("Chr1", 4, 9),
    /// ]);
    /// ```
    pub fn window_coords(&self, chrom: &str, start: u64, len: u64) -> Vec<GenomeCoord> {
        (0..self.n_windows(len))
            .map(|i| {
                let s = start + (i * self.offset) as u64;
                GenomeCoord::new(chrom, s, s + self.seq_len as u64)
            })
            .collect()
    }

    /// Region start coordinates visited by `shard` on a chromosome
    pub fn region_starts(&self, chrom_len: u64, shard: Shard) -> StepBy<Range<u64>> {
        let first = (self.offset * self.batch_size * shard.rank) as u64;
        let step = self.offset * self.batch_size * shard.count;
        (first..self.stop(chrom_len)).step_by(step)
    }

    /// Number of regions `shard` visits on a chromosome
    pub fn region_count(&self, chrom_len: u64, shard: Shard) -> usize {
        let first = (self.offset * self.batch_size * shard.rank) as u64;
        let step = (self.offset * self.batch_size * shard.count) as u64;
        let stop = self.stop(chrom_len);
        if first >= stop {
            0
        } else {
            ((stop - first - 1) / step + 1) as usize
        }
    }

    /// Length of the region fetched at `start`, clipped at the chromosome end
    pub fn clipped_len(&self, chrom_len: u64, start: u64) -> u64 {
        self.region_len().min(chrom_len.saturating_sub(start))
    }

    // First start that leaves fewer than seq_len bases
    fn stop(&self, chrom_len: u64) -> u64 {
        (chrom_len + 1).saturating_sub(self.seq_len as u64)
    }
}
