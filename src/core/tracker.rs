//! Per-base error tracking across shards
//!
//! An [`ErrorTracker`] accumulates scalar errors over genome ranges,
//! either as sparse `(start, end, value)` records answered through an
//! interval index, or as dense per-base sum and count arrays. Shards
//! exchange their state through dump files and a [`Barrier`]; each shard
//! keeps its own records apart from those loaded from other shards so a
//! reload never counts anything twice.

use crate::core::coords::{GenomeCoord, Shard};
use crate::core::error::{PersistError, Result, SequenceError, ShapeError};
use crate::core::mask::{fivenum, median};
use crate::core::sync::Barrier;
use log::{debug, info, warn};
use ndarray::{ArrayView3, Axis, Zip};
use rust_lapper::{Interval, Lapper};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const DUMP_PREFIX: &str = "mse__";
const SPARSE_EXT: &str = "ivl";
const DENSE_EXT: &str = "arr";

/// How values are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerMode {
    /// One record per added range
    Sparse,
    /// Running per-base sums and counts
    Dense,
}

/// Summary statistic over a range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregator {
    Mean,
    Median,
    Sum,
}

/// X coordinates reported for each summary window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordMode {
    /// One point at the window midpoint
    Midpoint,
    /// Two points at the window start and end
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Span {
    start: u64,
    end: u64,
    value: f64,
}

#[derive(Default)]
struct SparseTrack {
    spans: Vec<Span>,
    // Built on first query after a change
    index: OnceCell<Lapper<u64, u32>>,
}

impl std::fmt::Debug for SparseTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseTrack")
            .field("spans", &self.spans.len())
            .field("indexed", &self.index.get().is_some())
            .finish()
    }
}

impl SparseTrack {
    fn push(&mut self, span: Span) {
        self.spans.push(span);
        self.index = OnceCell::new();
    }

    fn extend(&mut self, spans: Vec<Span>) {
        self.spans.extend(spans);
        self.index = OnceCell::new();
    }

    /// `(value, overlap)` of every record overlapping `[start, end)`
    fn overlaps(&self, start: u64, end: u64) -> impl Iterator<Item = (f64, u64)> + '_ {
        let index = self.index.get_or_init(|| {
            Lapper::new(
                self.spans
                    .iter()
                    .enumerate()
                    .map(|(i, s)| Interval {
                        start: s.start,
                        stop: s.end,
                        val: i as u32,
                    })
                    .collect(),
            )
        });
        index.find(start, end).map(move |iv| {
            let overlap = iv.stop.min(end).saturating_sub(iv.start.max(start));
            (self.spans[iv.val as usize].value, overlap)
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DenseTrack {
    sums: Vec<f64>,
    counts: Vec<u32>,
}

impl DenseTrack {
    fn new(len: u64) -> Self {
        Self {
            sums: vec![0.0; len as usize],
            counts: vec![0; len as usize],
        }
    }

    fn add(&mut self, start: u64, end: u64, value: f64) {
        let (s, e) = (start as usize, end as usize);
        self.sums[s..e].iter_mut().for_each(|x| *x += value);
        self.counts[s..e].iter_mut().for_each(|c| *c += 1);
    }

    fn merge(&mut self, other: &DenseTrack) {
        for (x, y) in self.sums.iter_mut().zip(&other.sums) {
            *x += y;
        }
        for (c, d) in self.counts.iter_mut().zip(&other.counts) {
            *c += d;
        }
    }
}

#[derive(Debug, Default)]
struct Tracks {
    sparse: HashMap<String, SparseTrack>,
    dense: HashMap<String, DenseTrack>,
}

impl Tracks {
    fn clear(&mut self) {
        self.sparse.clear();
        self.dense.clear();
    }
}

/// Error accumulator shared by cooperating shards
#[derive(Debug)]
pub struct ErrorTracker {
    mode: TrackerMode,
    shard: Shard,
    dir: PathBuf,
    chroms: BTreeMap<String, u64>,
    local: Tracks,
    // Contributions loaded from other shards
    remote: Tracks,
}

impl ErrorTracker {
    /// `dir` holds the dump files and summary tables of every shard
    pub fn new<I, P>(chrom_lens: I, dir: P, shard: Shard, mode: TrackerMode) -> Self
    where
        I: IntoIterator<Item = (String, u64)>,
        P: AsRef<Path>,
    {
        Self {
            mode,
            shard,
            dir: dir.as_ref().to_path_buf(),
            chroms: chrom_lens.into_iter().collect(),
            local: Tracks::default(),
            remote: Tracks::default(),
        }
    }

    pub fn mode(&self) -> TrackerMode {
        self.mode
    }

    pub fn shard(&self) -> Shard {
        self.shard
    }

    fn check_coord(&self, coord: &GenomeCoord) -> Result<u64> {
        let len = *self
            .chroms
            .get(&coord.chrom)
            .ok_or_else(|| SequenceError::UnknownChromosome(coord.chrom.clone()))?;
        if coord.start > coord.end || coord.end > len {
            return Err(SequenceError::OutOfRange {
                chrom: coord.chrom.clone(),
                start: coord.start,
                end: coord.end,
                len,
            }
            .into());
        }
        Ok(len)
    }

    fn add_value(&mut self, coord: &GenomeCoord, value: f64) -> Result<()> {
        let len = self.check_coord(coord)?;
        match self.mode {
            TrackerMode::Sparse => self
                .local
                .sparse
                .entry(coord.chrom.clone())
                .or_default()
                .push(Span {
                    start: coord.start,
                    end: coord.end,
                    value,
                }),
            TrackerMode::Dense => self
                .local
                .dense
                .entry(coord.chrom.clone())
                .or_insert_with(|| DenseTrack::new(len))
                .add(coord.start, coord.end, value),
        }
        Ok(())
    }

    /// Record `value` over every window of a batch
    pub fn add_batch(&mut self, coords: &[GenomeCoord], value: f64) -> Result<()> {
        for coord in coords {
            self.add_value(coord, value)?;
        }
        Ok(())
    }

    /// Record the mean squared error of each predicted window
    ///
    /// `truth` and `prediction` are `(batch, seq_len, width)`. Returns the
    /// per-window errors in batch order.
    pub fn add_predict_batch(
        &mut self,
        coords: &[GenomeCoord],
        truth: ArrayView3<f32>,
        prediction: ArrayView3<f32>,
    ) -> Result<Vec<f64>> {
        if truth.dim() != prediction.dim() {
            return Err(ShapeError::Mismatch {
                left: truth.shape().to_vec(),
                right: prediction.shape().to_vec(),
            }
            .into());
        }
        if truth.len_of(Axis(0)) != coords.len() {
            return Err(ShapeError::Mismatch {
                left: vec![coords.len()],
                right: truth.shape().to_vec(),
            }
            .into());
        }

        let mut errors = Vec::with_capacity(coords.len());
        for ((coord, y), yp) in coords
            .iter()
            .zip(truth.outer_iter())
            .zip(prediction.outer_iter())
        {
            let mut total = 0.0f64;
            Zip::from(&y).and(&yp).for_each(|&a, &b| {
                let d = (a - b) as f64;
                total += d * d;
            });
            let mse = if y.is_empty() { 0.0 } else { total / y.len() as f64 };
            self.add_value(coord, mse)?;
            errors.push(mse);
        }
        if let Some(five) = fivenum(&errors) {
            debug!("Batch error distribution {:?}", five);
        }
        Ok(errors)
    }

    /// Aggregate of every recorded value over `[start, end)`, -1 without evidence
    ///
    /// Sparse records contribute their value once per overlapped base.
    /// Dense tracks report `sum / count` for the mean, the plain sum, or
    /// the median of per-base means.
    pub fn region_value(&self, chrom: &str, start: u64, end: u64, aggregator: Aggregator) -> f64 {
        if start >= end {
            return -1.0;
        }
        match self.mode {
            TrackerMode::Sparse => {
                let mut weighted: Vec<(f64, u64)> = [&self.local, &self.remote]
                    .into_iter()
                    .filter_map(|tracks| tracks.sparse.get(chrom))
                    .flat_map(|track| track.overlaps(start, end))
                    .filter(|&(_, n)| n > 0)
                    .collect();
                let bases: u64 = weighted.iter().map(|&(_, n)| n).sum();
                if bases == 0 {
                    return -1.0;
                }
                match aggregator {
                    Aggregator::Sum => weighted.iter().map(|&(v, n)| v * n as f64).sum(),
                    Aggregator::Mean => {
                        weighted.iter().map(|&(v, n)| v * n as f64).sum::<f64>() / bases as f64
                    }
                    Aggregator::Median => weighted_median(&mut weighted, bases),
                }
            }
            TrackerMode::Dense => {
                let tracks: Vec<&DenseTrack> = [&self.local, &self.remote]
                    .into_iter()
                    .filter_map(|tracks| tracks.dense.get(chrom))
                    .collect();
                let (s, e) = (start as usize, end as usize);
                let mut sum = 0.0;
                let mut count = 0u64;
                let mut means = Vec::new();
                for i in s..e {
                    let (x, c) = tracks
                        .iter()
                        .filter(|t| i < t.sums.len())
                        .fold((0.0, 0u64), |(x, c), t| (x + t.sums[i], c + t.counts[i] as u64));
                    sum += x;
                    count += c;
                    if c > 0 && aggregator == Aggregator::Median {
                        means.push(x / c as f64);
                    }
                }
                if count == 0 {
                    return -1.0;
                }
                match aggregator {
                    Aggregator::Sum => sum,
                    Aggregator::Mean => sum / count as f64,
                    Aggregator::Median => median(&means).unwrap_or(-1.0),
                }
            }
        }
    }

    /// Windowed summary of a chromosome, only on the lead shard
    pub fn to_array(
        &self,
        chrom: &str,
        width: u64,
        aggregator: Aggregator,
        coords: CoordMode,
    ) -> Result<Option<(Vec<f64>, Vec<f64>)>> {
        if !self.shard.is_lead() {
            return Ok(None);
        }
        let len = *self
            .chroms
            .get(chrom)
            .ok_or_else(|| SequenceError::UnknownChromosome(chrom.to_string()))?;
        let width = width.max(1);
        let (mut x, mut y) = (Vec::new(), Vec::new());
        for start in (0..len).step_by(width as usize) {
            let end = (start + width).min(len);
            let value = self.region_value(chrom, start, end, aggregator);
            match coords {
                CoordMode::Midpoint => {
                    x.push(start as f64 + (end - start) as f64 / 2.0);
                    y.push(value);
                }
                CoordMode::Range => {
                    x.extend([start as f64, end as f64]);
                    y.extend([value, value]);
                }
            }
        }
        Ok(Some((x, y)))
    }

    fn dump_path(&self, chrom: &str, rank: usize, ext: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}__{}.{}", DUMP_PREFIX, chrom, rank, ext))
    }

    /// Write this shard's records to its dump files
    pub fn dump(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        for (chrom, track) in &self.local.sparse {
            let path = self.dump_path(chrom, self.shard.rank, SPARSE_EXT);
            let mut writer = BufWriter::new(File::create(&path)?);
            bincode::serialize_into(&mut writer, &track.spans).map_err(PersistError::from)?;
            writer.flush()?;
        }
        for (chrom, track) in &self.local.dense {
            let path = self.dump_path(chrom, self.shard.rank, DENSE_EXT);
            let mut writer = BufWriter::new(File::create(&path)?);
            bincode::serialize_into(&mut writer, track).map_err(PersistError::from)?;
            writer.flush()?;
        }
        Ok(())
    }

    /// Replace remote state with every other shard's dumps
    pub fn load_all(&mut self) -> Result<()> {
        self.remote.clear();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let (chrom, rank, ext) = match parse_dump_name(&path) {
                Some(parsed) => parsed,
                None => continue,
            };
            if rank == self.shard.rank {
                debug!("Skipping own dump {:?}", path);
                continue;
            }
            let len = match self.chroms.get(&chrom) {
                Some(&len) => len,
                None => {
                    warn!("Ignoring dump {:?} for unknown chromosome {}", path, chrom);
                    continue;
                }
            };
            debug!("Loading {:?}", path);
            let reader = BufReader::new(File::open(&path)?);
            match ext.as_str() {
                SPARSE_EXT => {
                    let spans: Vec<Span> =
                        bincode::deserialize_from(reader).map_err(PersistError::from)?;
                    self.remote.sparse.entry(chrom).or_default().extend(spans);
                }
                DENSE_EXT => {
                    let track: DenseTrack =
                        bincode::deserialize_from(reader).map_err(PersistError::from)?;
                    self.remote
                        .dense
                        .entry(chrom)
                        .or_insert_with(|| DenseTrack::new(len))
                        .merge(&track);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Merge all shards and let the lead shard write one table per chromosome
    ///
    /// Every shard must call this with the same barrier checkpoints.
    /// Returns the tables written, empty on non-lead shards.
    pub fn write<B: Barrier>(
        &mut self,
        barrier: &B,
        name: &str,
        epoch: usize,
        width: u64,
        aggregator: Aggregator,
        coords: CoordMode,
    ) -> Result<Vec<PathBuf>> {
        self.dump()?;
        barrier.wait("error-dump")?;
        self.load_all()?;
        barrier.wait("error-load")?;

        let mut written = Vec::new();
        if !self.shard.is_lead() {
            return Ok(written);
        }
        let chroms: Vec<String> = self.chroms.keys().cloned().collect();
        for chrom in chroms {
            let (x, y) = match self.to_array(&chrom, width, aggregator, coords)? {
                Some(xy) => xy,
                None => continue,
            };
            if let Some([min, q1, med, q3, max]) = fivenum(&y) {
                info!(
                    "{} - Epoch {:3} - Chrom {} error summary [{}, {}, {}, {}, {}]",
                    name,
                    epoch + 1,
                    chrom,
                    min,
                    q1,
                    med,
                    q3,
                    max
                );
            }
            let path = self
                .dir
                .join(format!("{}_e{}_{}.tsv", name.to_lowercase(), epoch, chrom));
            let mut writer = BufWriter::new(File::create(&path)?);
            writeln!(writer, "x\ty")?;
            for (a, b) in x.iter().zip(&y) {
                writeln!(writer, "{}\t{}", a, b)?;
            }
            writer.flush()?;
            debug!("Wrote {:?}", path);
            written.push(path);
        }
        Ok(written)
    }

    /// Delete this shard's dump files
    pub fn close(&self) -> std::io::Result<()> {
        if !self.dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if let Some((_, rank, _)) = parse_dump_name(&path) {
                if rank == self.shard.rank {
                    debug!("Deleting {:?}", path);
                    fs::remove_file(&path)?;
                }
            }
        }
        Ok(())
    }
}

impl Drop for ErrorTracker {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Could not remove error dumps in {:?}: {}", self.dir, e);
        }
    }
}

/// Split `mse__<chrom>__<rank>.<ext>` into its parts
fn parse_dump_name(path: &Path) -> Option<(String, usize, String)> {
    let name = path.file_name()?.to_str()?;
    let rest = name.strip_prefix(DUMP_PREFIX)?;
    let (stem, ext) = rest.rsplit_once('.')?;
    if ext != SPARSE_EXT && ext != DENSE_EXT {
        return None;
    }
    let (chrom, rank) = stem.rsplit_once("__")?;
    Some((chrom.to_string(), rank.parse().ok()?, ext.to_string()))
}

/// Median of values repeated by their weights
fn weighted_median(pairs: &mut [(f64, u64)], total: u64) -> f64 {
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let nth = |k: u64| -> f64 {
        let mut seen = 0;
        for &(v, n) in pairs.iter() {
            seen += n;
            if k < seen {
                return v;
            }
        }
        pairs.last().map(|p| p.0).unwrap_or(-1.0)
    };
    if total % 2 == 1 {
        nth(total / 2)
    } else {
        (nth(total / 2 - 1) + nth(total / 2)) / 2.0
    }
}
