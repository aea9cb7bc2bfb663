//! Data source traits consumed by the windowing engine
//!
//! File readers in [`crate::formats`] implement these; the in-memory
//! versions here back tests and small synthetic inputs.

use crate::core::coords::Strand;
use crate::core::error::{SequenceError, SequenceResult};
use std::collections::HashMap;

/// Random-access sequence provider keyed by chromosome
pub trait SequenceSource {
    /// Chromosome names in source order
    fn chrom_names(&self) -> Vec<String>;

    /// Authoritative chromosome length
    fn chrom_len(&self, chrom: &str) -> Option<u64>;

    /// Bases of `[start, end)`
    fn fetch(&self, chrom: &str, start: u64, end: u64) -> SequenceResult<Vec<u8>>;

    /// Text of the chromosome's header line without the leading `>`
    fn header(&self, chrom: &str) -> Option<String>;
}

/// Cytosine methylation context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    CG,
    CHG,
    CHH,
}

impl Context {
    /// Position of this context's pair of input columns
    pub fn index(&self) -> usize {
        match self {
            Context::CG => 0,
            Context::CHG => 1,
            Context::CHH => 2,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CG" | "CpG" => Some(Context::CG),
            "CHG" => Some(Context::CHG),
            "CHH" => Some(Context::CHH),
            _ => None,
        }
    }
}

/// Methylation evidence at one base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MethylCall {
    /// None when the base has no call
    pub context: Option<Context>,
    pub strand: Strand,
    pub methylated: u32,
    pub total: u32,
}

impl MethylCall {
    /// Methylated fraction, 0 without coverage
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.methylated as f32 / self.total as f32
        }
    }
}

/// Per-base methylation provider keyed like [`SequenceSource`]
pub trait MethylationSource {
    /// Exactly `end - start` calls for `[start, end)`
    fn fetch(&self, chrom: &str, start: u64, end: u64) -> Vec<MethylCall>;
}

/// A source without any methylation calls
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMethylation;

impl MethylationSource for NoMethylation {
    fn fetch(&self, _chrom: &str, start: u64, end: u64) -> Vec<MethylCall> {
        vec![MethylCall::default(); end.saturating_sub(start) as usize]
    }
}

/// Chromosomes held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryGenome {
    order: Vec<String>,
    sequences: HashMap<String, (String, Vec<u8>)>,
}

impl MemoryGenome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chromosome with its header text
    pub fn insert(&mut self, name: &str, header: &str, sequence: &[u8]) {
        if !self.sequences.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.sequences
            .insert(name.to_string(), (header.to_string(), sequence.to_vec()));
    }
}

impl SequenceSource for MemoryGenome {
    fn chrom_names(&self) -> Vec<String> {
        self.order.clone()
    }

    fn chrom_len(&self, chrom: &str) -> Option<u64> {
        self.sequences.get(chrom).map(|(_, s)| s.len() as u64)
    }

    fn fetch(&self, chrom: &str, start: u64, end: u64) -> SequenceResult<Vec<u8>> {
        let (_, seq) = self
            .sequences
            .get(chrom)
            .ok_or_else(|| SequenceError::UnknownChromosome(chrom.to_string()))?;
        let len = seq.len() as u64;
        if start > end || end > len {
            return Err(SequenceError::OutOfRange {
                chrom: chrom.to_string(),
                start,
                end,
                len,
            });
        }
        Ok(seq[start as usize..end as usize].to_vec())
    }

    fn header(&self, chrom: &str) -> Option<String> {
        self.sequences.get(chrom).map(|(h, _)| h.clone())
    }
}
