//! Chunked sequence cache
//!
//! Each chromosome may have several independent cache lanes, one per
//! contiguous scan. A lane holds one window of bases and refills it on a
//! miss. Forward lanes only move towards the chromosome end, reverse
//! lanes only towards its start.

use crate::core::error::{SequenceError, SequenceResult};
use crate::core::source::SequenceSource;
use log::debug;
use std::collections::HashMap;

/// Bases held per lane unless configured otherwise
pub const DEFAULT_CACHE_SIZE: u64 = 5_000_000;

/// Header descriptors recognised by [`quality_from_header`]
const QUALITY_DESCRIPTORS: &[(&str, u8)] = &[
    ("dna:chromosome", 3),
    ("dna:scaffold", 2),
    ("dna:contig", 1),
    ("dna:supercontig", 1),
];

/// Scan direction of a cache lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanDirection {
    Forward,
    Reverse,
}

#[derive(Debug)]
struct Lane {
    start: u64,
    bases: Vec<u8>,
    // Highest start seen for forward lanes, lowest end for reverse lanes
    mark: u64,
}

impl Lane {
    fn new(direction: ScanDirection) -> Self {
        let mark = match direction {
            ScanDirection::Forward => 0,
            ScanDirection::Reverse => u64::MAX,
        };
        Self {
            start: 0,
            bases: Vec::new(),
            mark,
        }
    }

    fn covers(&self, start: u64, end: u64) -> bool {
        start >= self.start && end <= self.start + self.bases.len() as u64
    }
}

type LaneKey = (String, usize, ScanDirection);

/// Caching front end for a [`SequenceSource`]
pub struct SequenceCache<S> {
    source: S,
    cache_size: u64,
    lanes: HashMap<LaneKey, Lane>,
    quality: HashMap<String, u8>,
}

impl<S: SequenceSource> SequenceCache<S> {
    pub fn new(source: S) -> Self {
        Self::with_cache_size(source, DEFAULT_CACHE_SIZE)
    }

    pub fn with_cache_size(source: S, cache_size: u64) -> Self {
        Self {
            source,
            cache_size: cache_size.max(1),
            lanes: HashMap::new(),
            quality: HashMap::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn chrom_names(&self) -> Vec<String> {
        self.source.chrom_names()
    }

    pub fn chrom_len(&self, chrom: &str) -> SequenceResult<u64> {
        self.source
            .chrom_len(chrom)
            .ok_or_else(|| SequenceError::UnknownChromosome(chrom.to_string()))
    }

    /// Fetch `[start, end)` through the default forward lane
    pub fn fetch(&mut self, chrom: &str, start: u64, end: u64) -> SequenceResult<&[u8]> {
        self.fetch_lane(chrom, 0, ScanDirection::Forward, start, end)
    }

    /// Fetch `[start, end)` through a numbered lane
    ///
    /// A forward lane rejects a start below the highest start it has
    /// served; a reverse lane rejects an end above the lowest end it has
    /// served. Call [`SequenceCache::rewind`] before scanning again.
    pub fn fetch_lane(
        &mut self,
        chrom: &str,
        lane: usize,
        direction: ScanDirection,
        start: u64,
        end: u64,
    ) -> SequenceResult<&[u8]> {
        let len = self.chrom_len(chrom)?;
        if start > end || end > len {
            return Err(SequenceError::OutOfRange {
                chrom: chrom.to_string(),
                start,
                end,
                len,
            });
        }

        let cache_size = self.cache_size;
        let key = (chrom.to_string(), lane, direction);
        let entry = self.lanes.entry(key).or_insert_with(|| Lane::new(direction));

        match direction {
            ScanDirection::Forward => {
                if start < entry.mark {
                    return Err(SequenceError::BackwardSeek {
                        chrom: chrom.to_string(),
                        start,
                        mark: entry.mark,
                    });
                }
                entry.mark = start;
            }
            ScanDirection::Reverse => {
                if end > entry.mark {
                    return Err(SequenceError::ForwardSeek {
                        chrom: chrom.to_string(),
                        end,
                        mark: entry.mark,
                    });
                }
                entry.mark = end;
            }
        }

        if !entry.covers(start, end) {
            let (fill_start, fill_end) = match direction {
                ScanDirection::Forward => (start, start.saturating_add(cache_size).max(end).min(len)),
                ScanDirection::Reverse => (end.saturating_sub(cache_size).min(start), end),
            };
            debug!(
                "Refilling {} lane {} ({:?}) with {}-{}",
                chrom, lane, direction, fill_start, fill_end
            );
            entry.bases = self.source.fetch(chrom, fill_start, fill_end)?;
            entry.start = fill_start;
        }

        let offset = (start - entry.start) as usize;
        Ok(&entry.bases[offset..offset + (end - start) as usize])
    }

    /// Reset every lane of a chromosome before a fresh pass
    pub fn rewind(&mut self, chrom: &str) {
        self.lanes.retain(|(name, _, _), _| name != chrom);
    }

    /// Quality class of a chromosome, computed once from its header
    pub fn quality(&mut self, chrom: &str) -> u8 {
        if let Some(q) = self.quality.get(chrom) {
            return *q;
        }
        let q = self
            .source
            .header(chrom)
            .map(|h| quality_from_header(&h))
            .unwrap_or(0);
        self.quality.insert(chrom.to_string(), q);
        q
    }
}

/// Classify a header by its second whitespace-separated token
///
/// # Examples
/// ```
/// use genowin::core::cache::quality_from_header;
/// assert_eq!(quality_from_header("Chr1 dna:chromosome chromosome:TAIR10:1"), 3);
/// assert_eq!(quality_from_header("scaf_12 dna:scaffold"), 2);
/// assert_eq!(quality_from_header("ctg7"), 0);
/// ```
pub fn quality_from_header(header: &str) -> u8 {
    let descriptor = match header.split_whitespace().nth(1) {
        Some(d) => d.to_lowercase(),
        None => return 0,
    };
    QUALITY_DESCRIPTORS
        .iter()
        .find(|(name, _)| *name == descriptor)
        .map(|(_, q)| *q)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::source::MemoryGenome;

    fn genome() -> MemoryGenome {
        let mut g = MemoryGenome::new();
        g.insert("Chr1", "Chr1 dna:chromosome", b"AATTTTATACCCCCATGCAA");
        g.insert("Chr2", "Chr2 dna:contig", b"GGGGAAAACCCCTTTTACGT");
        g
    }

    #[test]
    fn test_fetch_and_refill() {
        let mut cache = SequenceCache::with_cache_size(genome(), 6);
        assert_eq!(cache.fetch("Chr1", 0, 5).unwrap(), b"AATTT");
        assert_eq!(cache.fetch("Chr1", 4, 10).unwrap(), b"TTATAC");
        assert_eq!(cache.fetch("Chr1", 15, 20).unwrap(), b"TGCAA");
    }

    #[test]
    fn test_backward_seek_rejected() {
        let mut cache = SequenceCache::with_cache_size(genome(), 6);
        cache.fetch("Chr1", 8, 10).unwrap();
        assert!(matches!(
            cache.fetch("Chr1", 2, 4),
            Err(SequenceError::BackwardSeek { mark: 8, .. })
        ));
        cache.rewind("Chr1");
        assert_eq!(cache.fetch("Chr1", 2, 4).unwrap(), b"TT");
    }

    #[test]
    fn test_lanes_are_independent() {
        let mut cache = SequenceCache::with_cache_size(genome(), 4);
        cache.fetch_lane("Chr1", 1, ScanDirection::Forward, 10, 15).unwrap();
        assert_eq!(
            cache.fetch_lane("Chr1", 0, ScanDirection::Forward, 0, 5).unwrap(),
            b"AATTT"
        );
    }

    #[test]
    fn test_reverse_lane() {
        let mut cache = SequenceCache::with_cache_size(genome(), 8);
        let dir = ScanDirection::Reverse;
        assert_eq!(cache.fetch_lane("Chr2", 0, dir, 15, 20).unwrap(), b"TACGT");
        assert_eq!(cache.fetch_lane("Chr2", 0, dir, 10, 15).unwrap(), b"CCTTT");
        assert!(matches!(
            cache.fetch_lane("Chr2", 0, dir, 12, 18),
            Err(SequenceError::ForwardSeek { .. })
        ));
    }

    #[test]
    fn test_out_of_range() {
        let mut cache = SequenceCache::new(genome());
        assert!(matches!(
            cache.fetch("Chr1", 15, 25),
            Err(SequenceError::OutOfRange { len: 20, .. })
        ));
        assert!(matches!(
            cache.fetch("Chr3", 0, 1),
            Err(SequenceError::UnknownChromosome(_))
        ));
    }

    #[test]
    fn test_quality() {
        let mut cache = SequenceCache::new(genome());
        assert_eq!(cache.quality("Chr1"), 3);
        assert_eq!(cache.quality("Chr2"), 1);
        assert_eq!(cache.quality("Chr9"), 0);
    }
}
