//! Cytosine methylation report reader
//!
//! Loads Bismark-style cytosine reports:
//! `chrom  pos(1-based)  strand  methylated  unmethylated  context  trinucleotide`
//! into sorted per-chromosome tables answering half-open range queries.

use crate::core::coords::Strand;
use crate::core::error::{AnnotationError, AnnotationResult};
use crate::core::io::{open_text, LineIterator};
use crate::core::source::{Context, MethylCall, MethylationSource};
use log::debug;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Default)]
struct ChromCalls {
    positions: Vec<u64>,
    calls: Vec<MethylCall>,
}

/// In-memory cytosine report
#[derive(Debug, Default)]
pub struct MethylationReport {
    chroms: HashMap<String, ChromCalls>,
}

impl MethylationReport {
    /// Load a report, accepting gzip or bzip2 input
    pub fn load<P: AsRef<Path>>(path: P) -> AnnotationResult<Self> {
        let mut lines = LineIterator::new(open_text(path.as_ref())?);
        let mut report = Self::default();
        let mut line_number = 0;
        while let Some(line) = lines.next_line() {
            let line = line?;
            line_number += 1;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (chrom, pos, call) = parse_line(line, line_number)?;
            report.push(chrom, pos, call);
        }
        report.finish();
        debug!(
            "Loaded methylation calls for {} chromosomes",
            report.chroms.len()
        );
        Ok(report)
    }

    /// Add one call at a 0-based position
    pub fn push(&mut self, chrom: &str, pos: u64, call: MethylCall) {
        let entry = self.chroms.entry(chrom.to_string()).or_default();
        entry.positions.push(pos);
        entry.calls.push(call);
    }

    /// Sort every chromosome table by position
    pub fn finish(&mut self) {
        for table in self.chroms.values_mut() {
            if table.positions.windows(2).all(|w| w[0] <= w[1]) {
                continue;
            }
            let mut pairs: Vec<(u64, MethylCall)> = table
                .positions
                .drain(..)
                .zip(table.calls.drain(..))
                .collect();
            pairs.sort_by_key(|(pos, _)| *pos);
            let (positions, calls) = pairs.into_iter().unzip();
            table.positions = positions;
            table.calls = calls;
        }
    }

    /// Number of calls on a chromosome
    pub fn call_count(&self, chrom: &str) -> usize {
        self.chroms.get(chrom).map(|t| t.calls.len()).unwrap_or(0)
    }
}

fn parse_line(line: &str, line_number: usize) -> AnnotationResult<(&str, u64, MethylCall)> {
    let invalid = |message: String| AnnotationError::InvalidMethylation {
        line: line_number,
        message,
    };
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 6 {
        return Err(invalid(format!("expected at least 6 fields, found {}", fields.len())));
    }
    let number = |idx: usize| -> AnnotationResult<u64> {
        fields[idx]
            .parse()
            .map_err(|_| invalid(format!("invalid number '{}'", fields[idx])))
    };
    let pos = number(1)?;
    if pos == 0 {
        return Err(invalid("positions are 1-based".to_string()));
    }
    let strand = fields[2]
        .chars()
        .next()
        .and_then(Strand::from_char)
        .ok_or_else(|| invalid(format!("invalid strand '{}'", fields[2])))?;
    let count = |idx: usize| -> AnnotationResult<u32> {
        u32::try_from(number(idx)?)
            .map_err(|_| invalid(format!("count '{}' out of range", fields[idx])))
    };
    let methylated = count(3)?;
    let total = methylated
        .checked_add(count(4)?)
        .ok_or_else(|| invalid("coverage out of range".to_string()))?;
    Ok((
        fields[0],
        pos - 1,
        MethylCall {
            context: Context::parse(fields[5]),
            strand,
            methylated,
            total,
        },
    ))
}

impl MethylationSource for MethylationReport {
    fn fetch(&self, chrom: &str, start: u64, end: u64) -> Vec<MethylCall> {
        let mut out = vec![MethylCall::default(); end.saturating_sub(start) as usize];
        if let Some(table) = self.chroms.get(chrom) {
            let lo = table.positions.partition_point(|&p| p < start);
            let hi = table.positions.partition_point(|&p| p < end);
            for (pos, call) in table.positions[lo..hi].iter().zip(&table.calls[lo..hi]) {
                out[(pos - start) as usize] = *call;
            }
        }
        out
    }
}
