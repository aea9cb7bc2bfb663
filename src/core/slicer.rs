//! Windowing engine
//!
//! [`WindowSlicer`] joins a sequence cache, a methylation source and an
//! optional feature index into per-base rows, and walks chromosomes in
//! one of four traversal modes:
//!
//! - [`WindowSlicer::chrom_regions`]: strided regions of one chromosome
//! - [`WindowSlicer::genome_regions`]: every chromosome in name order,
//!   padded so that all shards emit the same number of regions
//! - [`WindowSlicer::flat_batches`]: offset-1 windows packed into uniform
//!   batches across chromosome boundaries
//! - [`WindowSlicer::stateful_genome_batches`]: contiguous runs, one
//!   window per run per step, for models that carry state between calls
//!
//! Within a shard, regions come out in increasing coordinate order per
//! chromosome.

use crate::core::batch::{
    methylation_columns, Region, WindowBatch, BASE_COLUMN, INPUT_FEATURES, PLOIDY_COLUMN,
    POSITION_COLUMN, QUALITY_COLUMN,
};
use crate::core::cache::{ScanDirection, SequenceCache, DEFAULT_CACHE_SIZE};
use crate::core::coords::{GenomeCoord, Geometry, Shard, Strand};
use crate::core::dna::{base_code, mask_strand, reverse_rows, rev_comp_inplace};
use crate::core::error::{Result, ShapeError};
use crate::core::index::FeatureIndex;
use crate::core::source::{MethylationSource, SequenceSource};
use crate::core::vocab::Vocabulary;
use log::{debug, warn};
use ndarray::Array2;
use std::collections::VecDeque;
use std::iter::StepBy;
use std::ops::Range;
use std::sync::Arc;

/// Slicer settings
#[derive(Debug, Clone, Copy)]
pub struct SlicerConfig {
    /// Bases held per cache lane
    pub cache_size: u64,
    pub ploidy: u8,
    /// Fixed quality class, `None` to derive it from FASTA headers
    pub quality: Option<u8>,
}

impl Default for SlicerConfig {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            ploidy: 2,
            quality: None,
        }
    }
}

/// Windowing engine over a sequence source
pub struct WindowSlicer<S, M> {
    cache: SequenceCache<S>,
    methylation: M,
    index: Option<FeatureIndex>,
    config: SlicerConfig,
}

impl<S: SequenceSource, M: MethylationSource> WindowSlicer<S, M> {
    pub fn new(source: S, methylation: M, config: SlicerConfig) -> Self {
        Self {
            cache: SequenceCache::with_cache_size(source, config.cache_size),
            methylation,
            index: None,
            config,
        }
    }

    /// Attach a feature index so that regions carry labels
    pub fn with_index(mut self, index: FeatureIndex) -> Self {
        self.index = Some(index);
        self
    }

    pub fn index(&self) -> Option<&FeatureIndex> {
        self.index.as_ref()
    }

    pub fn vocabulary(&self) -> Option<&Arc<Vocabulary>> {
        self.index.as_ref().map(|index| index.vocabulary())
    }

    pub fn config(&self) -> &SlicerConfig {
        &self.config
    }

    /// Chromosome names in traversal order
    pub fn chrom_names(&self) -> Vec<String> {
        let mut names = self.cache.chrom_names();
        names.sort();
        names
    }

    pub fn chrom_len(&self, chrom: &str) -> Result<u64> {
        Ok(self.cache.chrom_len(chrom)?)
    }

    /// Name and length of every chromosome in traversal order
    pub fn chrom_lens(&self) -> Result<Vec<(String, u64)>> {
        self.chrom_names()
            .into_iter()
            .map(|name| {
                let len = self.chrom_len(&name)?;
                Ok((name, len))
            })
            .collect()
    }

    /// Per-base rows of `[start, end)`, clipped at the chromosome end
    pub fn get_region(&mut self, chrom: &str, start: u64, end: u64) -> Result<Region> {
        self.get_region_lane(chrom, 0, ScanDirection::Forward, start, end)
    }

    fn get_region_lane(
        &mut self,
        chrom: &str,
        lane: usize,
        direction: ScanDirection,
        start: u64,
        end: u64,
    ) -> Result<Region> {
        let chrom_len = self.cache.chrom_len(chrom)?;
        let end = end.min(chrom_len);
        let quality = match self.config.quality {
            Some(q) => q,
            None => self.cache.quality(chrom),
        };
        let ploidy = self.config.ploidy as f32;

        let bases = self.cache.fetch_lane(chrom, lane, direction, start, end)?;
        let calls = self.methylation.fetch(chrom, start, end);
        if bases.len() != calls.len() {
            return Err(ShapeError::RowMismatch {
                sequence: bases.len(),
                methylation: calls.len(),
            }
            .into());
        }

        let mut inputs = Array2::<f32>::zeros((bases.len(), INPUT_FEATURES));
        for (i, (mut row, (base, call))) in inputs
            .rows_mut()
            .into_iter()
            .zip(bases.iter().zip(&calls))
            .enumerate()
        {
            row[BASE_COLUMN] = base_code(*base) as f32;
            row[POSITION_COLUMN] = (start + i as u64 + 1) as f32 / chrom_len as f32;
            if let Some(context) = call.context {
                let (fraction, total) = methylation_columns(context);
                row[fraction] = call.fraction();
                row[total] = call.total as f32;
            }
            row[PLOIDY_COLUMN] = ploidy;
            row[QUALITY_COLUMN] = quality as f32;
        }

        let labels = self.index.as_ref().map(|index| index.fetch(chrom, start, end));
        Ok(Region {
            coord: GenomeCoord::new(chrom, start, end),
            inputs,
            labels,
            padding: false,
        })
    }

    /// Number of regions `shard` visits on a chromosome
    pub fn region_count(&self, chrom: &str, geometry: &Geometry, shard: Shard) -> Result<usize> {
        Ok(geometry.region_count(self.chrom_len(chrom)?, shard))
    }

    /// Strided regions of one chromosome for one shard
    pub fn chrom_regions(
        &mut self,
        chrom: &str,
        geometry: Geometry,
        shard: Shard,
    ) -> Result<Regions<'_, S, M>> {
        let chrom_len = self.chrom_len(chrom)?;
        let mut segments = VecDeque::new();
        segments.push_back(Segment::new(chrom, &geometry, chrom_len, shard, false));
        Ok(Regions {
            slicer: self,
            geometry,
            segments,
        })
    }

    /// Strided regions of every chromosome, in name order
    ///
    /// With several shards, a shard that visits fewer regions of a
    /// chromosome than the busiest shard re-emits its own first regions
    /// (or rank 0's when it has none) marked as padding.
    pub fn genome_regions(&mut self, geometry: Geometry, shard: Shard) -> Result<Regions<'_, S, M>> {
        let mut segments = VecDeque::new();
        for (chrom, chrom_len) in self.chrom_lens()? {
            let own = Segment::new(&chrom, &geometry, chrom_len, shard, false);
            let own_count = own.remaining;
            segments.push_back(own);

            if shard.count > 1 {
                let most = (0..shard.count)
                    .map(|rank| geometry.region_count(chrom_len, Shard { rank, count: shard.count }))
                    .max()
                    .unwrap_or(0);
                if most > own_count {
                    let source = if own_count > 0 {
                        shard
                    } else {
                        Shard { rank: 0, count: shard.count }
                    };
                    let mut padding = Segment::new(&chrom, &geometry, chrom_len, source, true);
                    padding.remaining = most - own_count;
                    debug!(
                        "Rank {} pads {} with {} regions",
                        shard.rank, chrom, padding.remaining
                    );
                    segments.push_back(padding);
                }
            }
        }
        Ok(Regions {
            slicer: self,
            geometry,
            segments,
        })
    }

    /// Offset-1 windows of every chromosome packed into batches
    ///
    /// Windows flow across chromosome boundaries and the final batch may
    /// be smaller than `batch_size`.
    pub fn flat_batches(&mut self, seq_len: usize, batch_size: usize) -> Result<FlatBatches<'_, S, M>> {
        let geometry = Geometry::new(seq_len, 1, batch_size)?;
        let chroms = self.chrom_lens()?.into();
        Ok(FlatBatches {
            slicer: self,
            geometry,
            chroms,
            next_start: 0,
        })
    }

    fn stateful_plan(
        &self,
        chrom: &str,
        geometry: &Geometry,
        shard: Shard,
        stranded: bool,
    ) -> Result<StatefulPlan> {
        let chrom_len = self.chrom_len(chrom)?;
        let batch_size = geometry.batch_size;
        let mut rows_per_rank = batch_size / shard.count;
        let mut shard = shard;
        if rows_per_rank == 0 {
            warn!(
                "{} contiguous runs cannot be shared by {} shards, every shard will read all of {}",
                batch_size, shard.count, chrom
            );
            shard = Shard::single();
            rows_per_rank = batch_size;
        }
        let run_len = chrom_len / batch_size as u64;
        let n_steps = (run_len / geometry.seq_len as u64) as usize;
        let first = shard.rank * rows_per_rank;
        Ok(StatefulPlan {
            chrom: chrom.to_string(),
            run_len,
            n_steps,
            runs: (first..first + rows_per_rank).collect(),
            stranded,
        })
    }

    /// Contiguous stateful batches of one chromosome
    pub fn stateful_chrom_batches(
        &mut self,
        chrom: &str,
        geometry: Geometry,
        shard: Shard,
        stranded: bool,
    ) -> Result<StatefulBatches<'_, S, M>> {
        let plan = self.stateful_plan(chrom, &geometry, shard, stranded)?;
        Ok(StatefulBatches::new(self, geometry, vec![plan]))
    }

    /// Contiguous stateful batches of every chromosome in name order
    ///
    /// Chromosome `c` is cut into `batch_size` runs of
    /// `chrom_len / batch_size` bases. Step `k` reads bases
    /// `[k * seq_len, (k + 1) * seq_len)` of every run owned by the shard,
    /// so row `r` of consecutive batches continues the same run. With
    /// `stranded`, the steps are replayed last to first on the reverse
    /// strand.
    pub fn stateful_genome_batches(
        &mut self,
        geometry: Geometry,
        shard: Shard,
        stranded: bool,
    ) -> Result<StatefulBatches<'_, S, M>> {
        let plans = self
            .chrom_names()
            .iter()
            .map(|chrom| self.stateful_plan(chrom, &geometry, shard, stranded))
            .collect::<Result<Vec<_>>>()?;
        Ok(StatefulBatches::new(self, geometry, plans))
    }
}

/// Start coordinates still to visit on one chromosome
#[derive(Debug)]
struct Segment {
    chrom: String,
    starts: StepBy<Range<u64>>,
    remaining: usize,
    padding: bool,
    fresh: bool,
}

impl Segment {
    fn new(chrom: &str, geometry: &Geometry, chrom_len: u64, shard: Shard, padding: bool) -> Self {
        Self {
            chrom: chrom.to_string(),
            starts: geometry.region_starts(chrom_len, shard),
            remaining: geometry.region_count(chrom_len, shard),
            padding,
            fresh: true,
        }
    }
}

/// Iterator over fetched regions
pub struct Regions<'a, S, M> {
    slicer: &'a mut WindowSlicer<S, M>,
    geometry: Geometry,
    segments: VecDeque<Segment>,
}

impl<'a, S: SequenceSource, M: MethylationSource> Regions<'a, S, M> {
    /// Turn each region into a batch of overlapping windows
    pub fn batches(self) -> Batches<'a, S, M> {
        Batches { regions: self }
    }

    /// Regions left to emit, padding included
    pub fn remaining(&self) -> usize {
        self.segments.iter().map(|s| s.remaining).sum()
    }
}

impl<S: SequenceSource, M: MethylationSource> Iterator for Regions<'_, S, M> {
    type Item = Result<Region>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let segment = self.segments.front_mut()?;
            if segment.fresh {
                self.slicer.cache.rewind(&segment.chrom);
                segment.fresh = false;
            }
            let start = match segment.starts.next() {
                Some(start) if segment.remaining > 0 => start,
                _ => {
                    self.segments.pop_front();
                    continue;
                }
            };
            segment.remaining -= 1;
            let padding = segment.padding;
            let chrom = segment.chrom.clone();
            let end = start + self.geometry.region_len();
            return Some(self.slicer.get_region(&chrom, start, end).map(|mut region| {
                region.padding = padding;
                region
            }));
        }
    }
}

/// Iterator over window batches built from [`Regions`]
pub struct Batches<'a, S, M> {
    regions: Regions<'a, S, M>,
}

impl<S: SequenceSource, M: MethylationSource> Iterator for Batches<'_, S, M> {
    type Item = Result<WindowBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let geometry = self.regions.geometry;
        loop {
            match self.regions.next()? {
                Ok(region) => {
                    if let Some(batch) = WindowBatch::from_region(region, &geometry) {
                        return Some(Ok(batch));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Iterator over offset-1 batches spanning chromosomes
pub struct FlatBatches<'a, S, M> {
    slicer: &'a mut WindowSlicer<S, M>,
    geometry: Geometry,
    chroms: VecDeque<(String, u64)>,
    next_start: u64,
}

impl<S: SequenceSource, M: MethylationSource> FlatBatches<'_, S, M> {
    fn fill(&mut self) -> Result<Option<WindowBatch>> {
        let seq_len = self.geometry.seq_len as u64;
        let mut coords = Vec::with_capacity(self.geometry.batch_size);
        let mut inputs = Vec::with_capacity(self.geometry.batch_size);
        let mut labels = Vec::with_capacity(self.geometry.batch_size);

        while coords.len() < self.geometry.batch_size {
            let (chrom, chrom_len) = match self.chroms.front() {
                Some((chrom, len)) => (chrom.clone(), *len),
                None => break,
            };
            let start = self.next_start;
            if start + seq_len > chrom_len {
                self.chroms.pop_front();
                self.next_start = 0;
                continue;
            }
            if start == 0 {
                self.slicer.cache.rewind(&chrom);
            }
            let region = self.slicer.get_region(&chrom, start, start + seq_len)?;
            coords.push(region.coord);
            inputs.push(region.inputs);
            if let Some(l) = region.labels {
                labels.push(l);
            }
            self.next_start += 1;
        }

        if coords.is_empty() {
            return Ok(None);
        }
        let labels = (!labels.is_empty()).then_some(labels.as_slice());
        Ok(Some(WindowBatch::stack(
            coords,
            &inputs,
            labels,
            self.geometry.seq_len,
        )))
    }
}

impl<S: SequenceSource, M: MethylationSource> Iterator for FlatBatches<'_, S, M> {
    type Item = Result<WindowBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fill().transpose()
    }
}

#[derive(Debug, Clone)]
struct StatefulPlan {
    chrom: String,
    run_len: u64,
    n_steps: usize,
    runs: Vec<usize>,
    stranded: bool,
}

impl StatefulPlan {
    fn total_steps(&self) -> usize {
        if self.stranded {
            2 * self.n_steps
        } else {
            self.n_steps
        }
    }
}

/// Iterator over stateful batches
pub struct StatefulBatches<'a, S, M> {
    slicer: &'a mut WindowSlicer<S, M>,
    geometry: Geometry,
    plans: VecDeque<StatefulPlan>,
    step: usize,
}

impl<'a, S: SequenceSource, M: MethylationSource> StatefulBatches<'a, S, M> {
    fn new(slicer: &'a mut WindowSlicer<S, M>, geometry: Geometry, plans: Vec<StatefulPlan>) -> Self {
        let plans: VecDeque<StatefulPlan> = plans
            .into_iter()
            .filter(|plan| {
                if plan.n_steps == 0 {
                    debug!("{} is too short for stateful batches, skipping", plan.chrom);
                }
                plan.n_steps > 0
            })
            .collect();
        Self {
            slicer,
            geometry,
            plans,
            step: 0,
        }
    }

    /// Batches left to emit
    pub fn remaining(&self) -> usize {
        self.plans.iter().map(|p| p.total_steps()).sum::<usize>() - self.step
    }

    fn emit(&mut self, plan: &StatefulPlan, step: usize, reverse: bool) -> Result<WindowBatch> {
        let seq_len = self.geometry.seq_len;
        let direction = if reverse {
            ScanDirection::Reverse
        } else {
            ScanDirection::Forward
        };
        let vocab = self.slicer.vocabulary().cloned();

        let mut coords = Vec::with_capacity(plan.runs.len());
        let mut inputs = Vec::with_capacity(plan.runs.len());
        let mut labels = Vec::with_capacity(plan.runs.len());
        for &run in &plan.runs {
            let start = run as u64 * plan.run_len + (step * seq_len) as u64;
            let mut region = self.slicer.get_region_lane(
                &plan.chrom,
                run,
                direction,
                start,
                start + seq_len as u64,
            )?;
            if reverse {
                rev_comp_inplace(region.inputs.view_mut());
            }
            if let Some(mut l) = region.labels {
                if reverse {
                    l = reverse_rows(l.view());
                }
                if let (true, Some(vocab)) = (plan.stranded, vocab.as_ref()) {
                    let dropped = if reverse { Strand::Plus } else { Strand::Minus };
                    mask_strand(l.view_mut(), vocab, dropped);
                }
                labels.push(l);
            }
            coords.push(region.coord);
            inputs.push(region.inputs);
        }

        let labels = (!labels.is_empty()).then_some(labels.as_slice());
        let mut batch = WindowBatch::stack(coords, &inputs, labels, seq_len);
        batch.reverse = reverse;
        Ok(batch)
    }
}

impl<S: SequenceSource, M: MethylationSource> Iterator for StatefulBatches<'_, S, M> {
    type Item = Result<WindowBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let plan = self.plans.front()?.clone();
        if self.step == 0 {
            self.slicer.cache.rewind(&plan.chrom);
        }
        let (step, reverse) = if self.step < plan.n_steps {
            (self.step, false)
        } else {
            (plan.total_steps() - 1 - self.step, true)
        };
        let batch = self.emit(&plan, step, reverse);

        self.step += 1;
        if self.step == plan.total_steps() {
            self.plans.pop_front();
            self.step = 0;
        }
        Some(batch)
    }
}
