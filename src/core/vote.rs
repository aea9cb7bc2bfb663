//! Vote aggregation and annotation reconstruction
//!
//! Predicted label windows are voted into per-chromosome arrays kept on
//! disk. Only a bounded number of chromosomes is decoded in memory at a
//! time; switching to another chromosome flushes the oldest resident one
//! first. [`VoteAggregator::write_gff3`] turns the accumulated votes into
//! sorted GFF3 feature calls and releases the backing files.

use crate::core::error::{PersistError, Result, SequenceError, ShapeError};
use crate::core::mask::{bridge_array, region_bounds};
use crate::core::store::{ArrayFile, Backing, LruCache};
use crate::core::vocab::Vocabulary;
use crate::formats::gff::{GffCall, GFF3_HEADER};
use log::{debug, info};
use ndarray::{s, Array2, ArrayView2, Axis};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Aggregator settings
#[derive(Debug, Clone)]
pub struct VoteOptions {
    /// Forward calls vote `+` columns and reverse calls vote `-` columns
    pub stranded: bool,
    /// Chromosomes decoded in memory at once
    pub resident: usize,
    /// Parent of the private storage directory, system temp when `None`
    pub dir: Option<PathBuf>,
}

impl Default for VoteOptions {
    fn default() -> Self {
        Self {
            stranded: false,
            resident: 1,
            dir: None,
        }
    }
}

/// Decoded arrays of one chromosome
#[derive(Debug)]
struct ChromVotes {
    votes: Array2<u32>,
    totals: Array2<u32>,
    order: Option<Array2<u32>>,
    superfamily: Option<Array2<u32>>,
}

#[derive(Debug)]
struct ChromFiles {
    len: u64,
    votes: ArrayFile,
    totals: ArrayFile,
    order: Option<ArrayFile>,
    superfamily: Option<ArrayFile>,
}

#[derive(Debug, Default)]
struct VoteFiles {
    chroms: HashMap<String, ChromFiles>,
}

impl Backing<String, ChromVotes> for VoteFiles {
    type Error = PersistError;

    fn load(&mut self, chrom: &String) -> std::result::Result<ChromVotes, PersistError> {
        let files = self.files(chrom)?;
        debug!("Loading vote arrays of {}", chrom);
        let read = |file: &ArrayFile| file.read_rows(0, files.len);
        Ok(ChromVotes {
            votes: read(&files.votes)?,
            totals: read(&files.totals)?,
            order: files.order.as_ref().map(read).transpose()?,
            superfamily: files.superfamily.as_ref().map(read).transpose()?,
        })
    }

    fn flush(&mut self, chrom: &String, arrays: &ChromVotes) -> std::result::Result<(), PersistError> {
        let files = self.files(chrom)?;
        debug!("Flushing vote arrays of {}", chrom);
        files.votes.write_rows(0, arrays.votes.view())?;
        files.totals.write_rows(0, arrays.totals.view())?;
        if let (Some(file), Some(array)) = (&files.order, &arrays.order) {
            file.write_rows(0, array.view())?;
        }
        if let (Some(file), Some(array)) = (&files.superfamily, &arrays.superfamily) {
            file.write_rows(0, array.view())?;
        }
        Ok(())
    }
}

impl VoteFiles {
    fn files(&self, chrom: &str) -> std::result::Result<&ChromFiles, PersistError> {
        self.chroms.get(chrom).ok_or_else(|| {
            PersistError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no vote arrays for {}", chrom),
            ))
        })
    }
}

/// Per-class true/false positive and false negative counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Confusion {
    pub true_pos: Vec<u64>,
    pub false_pos: Vec<u64>,
    pub false_neg: Vec<u64>,
}

impl Confusion {
    fn new(n: usize) -> Self {
        Self {
            true_pos: vec![0; n],
            false_pos: vec![0; n],
            false_neg: vec![0; n],
        }
    }

    /// `None` when class `i` was never predicted
    pub fn precision(&self, i: usize) -> Option<f64> {
        let predicted = self.true_pos[i] + self.false_pos[i];
        (predicted > 0).then(|| self.true_pos[i] as f64 / predicted as f64)
    }

    /// `None` when class `i` never occurs in the truth
    pub fn recall(&self, i: usize) -> Option<f64> {
        let actual = self.true_pos[i] + self.false_neg[i];
        (actual > 0).then(|| self.true_pos[i] as f64 / actual as f64)
    }
}

/// Running comparison against known labels
#[derive(Debug, Clone, Default)]
pub struct Accuracy {
    pub features: Confusion,
    pub orders: Confusion,
    pub superfamilies: Confusion,
}

/// Per-feature precision and recall
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureAccuracy {
    pub feature: String,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
}

/// Accumulates window votes and reconstructs feature calls
pub struct VoteAggregator {
    vocab: Arc<Vocabulary>,
    stranded: bool,
    chroms: BTreeMap<String, u64>,
    files: VoteFiles,
    cache: LruCache<String, ChromVotes>,
    accuracy: Accuracy,
    // Removed together with every array file on drop
    dir: TempDir,
}

impl VoteAggregator {
    /// Allocate empty vote arrays for every chromosome
    pub fn new<I>(chrom_lens: I, vocab: Arc<Vocabulary>, options: VoteOptions) -> Result<Self>
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        let mut builder = tempfile::Builder::new();
        builder.prefix("genowin-votes-");
        let dir = match &options.dir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };

        let mut files = VoteFiles::default();
        let mut chroms = BTreeMap::new();
        for (i, (chrom, len)) in chrom_lens.into_iter().enumerate() {
            let path = |kind: &str| dir.path().join(format!("{}.{}.u32", i, kind));
            let order = vocab
                .te_metadata()
                .then(|| ArrayFile::create(path("order"), len, vocab.n_orders()))
                .transpose()?;
            let superfamily = vocab
                .te_metadata()
                .then(|| ArrayFile::create(path("superfamily"), len, vocab.n_superfamilies()))
                .transpose()?;
            files.chroms.insert(
                chrom.clone(),
                ChromFiles {
                    len,
                    votes: ArrayFile::create(path("votes"), len, vocab.len())?,
                    totals: ArrayFile::create(path("totals"), len, 1)?,
                    order,
                    superfamily,
                },
            );
            chroms.insert(chrom, len);
        }
        debug!("Allocated vote arrays for {} chromosomes in {:?}", chroms.len(), dir.path());

        let accuracy = Accuracy {
            features: Confusion::new(vocab.len()),
            orders: Confusion::new(vocab.n_orders()),
            superfamilies: Confusion::new(vocab.n_superfamilies()),
        };
        Ok(Self {
            stranded: options.stranded,
            cache: LruCache::new(options.resident),
            chroms,
            files,
            accuracy,
            vocab,
            dir,
        })
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocab
    }

    pub fn is_stranded(&self) -> bool {
        self.stranded
    }

    pub fn chrom_len(&self, chrom: &str) -> Option<u64> {
        self.chroms.get(chrom).copied()
    }

    fn check_range(&self, chrom: &str, start: u64, end: u64, rows: usize) -> Result<()> {
        let len = self
            .chrom_len(chrom)
            .ok_or_else(|| SequenceError::UnknownChromosome(chrom.to_string()))?;
        if start > end || end > len {
            return Err(SequenceError::OutOfRange {
                chrom: chrom.to_string(),
                start,
                end,
                len,
            }
            .into());
        }
        if rows as u64 != end - start {
            return Err(ShapeError::Rows {
                chrom: chrom.to_string(),
                start,
                end,
                expected: (end - start) as usize,
                found: rows,
            }
            .into());
        }
        Ok(())
    }

    fn feature_columns(&self, reverse: bool) -> Range<usize> {
        let half = self.vocab.half();
        match (self.stranded, reverse) {
            (false, _) => 0..self.vocab.len(),
            (true, false) => 0..half,
            (true, true) => half..2 * half,
        }
    }

    /// Add (or with `overwrite`, assign) one label window over `[start, end)`
    ///
    /// `array` has shape `(end - start, label_width)`. With strand-separated
    /// voting a `reverse` window is flipped along the position axis and
    /// only votes the `-` half; otherwise `reverse` is ignored. The total of
    /// every covered base is bumped even when no feature is set.
    pub fn vote(
        &mut self,
        chrom: &str,
        start: u64,
        end: u64,
        array: ArrayView2<u8>,
        overwrite: bool,
        reverse: bool,
    ) -> Result<()> {
        self.check_range(chrom, start, end, array.nrows())?;
        if array.ncols() != self.vocab.label_width() {
            return Err(ShapeError::Columns {
                expected: self.vocab.label_width(),
                found: array.ncols(),
            }
            .into());
        }
        let reverse = reverse && self.stranded;
        let array = if reverse {
            array.slice_move(s![..;-1, ..])
        } else {
            array
        };
        let columns = self.feature_columns(reverse);
        let order_column = self.vocab.order_column();
        let superfamily_column = self.vocab.superfamily_column();
        let (s, e) = (start as usize, end as usize);

        let arrays = self.cache.get_mut(&chrom.to_string(), &mut self.files)?;

        let mut totals = arrays.totals.slice_mut(s![s..e, ..]);
        if overwrite {
            totals.fill(1);
        } else {
            totals += 1;
        }

        let features = array.slice(s![.., columns.clone()]);
        if features.iter().any(|&v| v > 0) {
            let mut target = arrays.votes.slice_mut(s![s..e, columns]);
            if overwrite {
                target.zip_mut_with(&features, |t, &v| *t = v as u32);
            } else {
                target.zip_mut_with(&features, |t, &v| *t += v as u32);
            }
        }

        for (column, histogram) in [
            (order_column, arrays.order.as_mut()),
            (superfamily_column, arrays.superfamily.as_mut()),
        ] {
            if let (Some(column), Some(histogram)) = (column, histogram) {
                vote_histogram(histogram, s, array.column(column).iter().copied(), overwrite);
            }
        }
        Ok(())
    }

    /// Accumulate per-base confusion counts of a prediction against the truth
    pub fn compare(&mut self, pred: ArrayView2<u8>, truth: ArrayView2<u8>) -> Result<()> {
        if pred.dim() != truth.dim() {
            return Err(ShapeError::Mismatch {
                left: pred.shape().to_vec(),
                right: truth.shape().to_vec(),
            }
            .into());
        }
        if pred.ncols() != self.vocab.label_width() {
            return Err(ShapeError::Columns {
                expected: self.vocab.label_width(),
                found: pred.ncols(),
            }
            .into());
        }

        let te_columns = self.vocab.order_column().zip(self.vocab.superfamily_column());
        let n_features = self.vocab.len();
        for (p, t) in pred.outer_iter().zip(truth.outer_iter()) {
            for j in 0..n_features {
                match (p[j] != 0, t[j] != 0) {
                    (true, false) => self.accuracy.features.false_pos[j] += 1,
                    (false, true) => self.accuracy.features.false_neg[j] += 1,
                    (false, false) => {}
                    (true, true) => {
                        self.accuracy.features.true_pos[j] += 1;
                        if let Some((order, superfamily)) = te_columns {
                            if self.vocab.is_te_feature(j) {
                                tally_class(&mut self.accuracy.orders, p[order], t[order]);
                                tally_class(
                                    &mut self.accuracy.superfamilies,
                                    p[superfamily],
                                    t[superfamily],
                                );
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn accuracy(&self) -> &Accuracy {
        &self.accuracy
    }

    /// Precision and recall of every strand-qualified feature
    pub fn feature_accuracy(&self) -> Vec<FeatureAccuracy> {
        (0..self.vocab.len())
            .map(|j| FeatureAccuracy {
                feature: self.vocab.qualified_name(j).unwrap_or_default(),
                precision: self.accuracy.features.precision(j),
                recall: self.accuracy.features.recall(j),
            })
            .collect()
    }

    /// Current evidence totals of a chromosome
    pub fn totals(&mut self, chrom: &str) -> Result<Vec<u32>> {
        self.check_range(chrom, 0, 0, 0)?;
        let arrays = self.cache.get_mut(&chrom.to_string(), &mut self.files)?;
        Ok(arrays.totals.column(0).to_vec())
    }

    /// Current votes of one feature column
    pub fn votes(&mut self, chrom: &str, feature: usize) -> Result<Vec<u32>> {
        self.check_range(chrom, 0, 0, 0)?;
        let arrays = self.cache.get_mut(&chrom.to_string(), &mut self.files)?;
        Ok(arrays.votes.column(feature).to_vec())
    }

    /// Reconstruct the annotation as GFF3 lines, header first
    ///
    /// A base belongs to a feature when its votes are positive and at
    /// least `threshold` times its total (half the total when stranded).
    /// Gaps up to `max_fill` are bridged before runs shorter than
    /// `min_size` are dropped.
    pub fn gff3_lines(mut self, threshold: f64, min_size: usize, max_fill: usize) -> Result<Vec<String>> {
        if min_size > 0 || max_fill > 0 {
            info!(
                "Filling gaps <= {} and removing features < {}",
                max_fill, min_size
            );
        }
        let mut lines = vec![GFF3_HEADER.to_string()];

        let chroms: Vec<String> = self.chroms.keys().cloned().collect();
        let mut next_id = 0;
        for chrom in chroms {
            let arrays = self.cache.get_mut(&chrom, &mut self.files)?;
            let mut calls = call_features(arrays, &self.vocab, self.stranded, threshold, min_size, max_fill);
            calls.sort_unstable();

            for (start, end, feature) in calls {
                let (strand, name) = match self.vocab.feature(feature) {
                    Some(f) => f,
                    None => continue,
                };
                let te = match (&arrays.order, &arrays.superfamily) {
                    (Some(order), Some(superfamily)) if self.vocab.is_te_feature(feature) => {
                        let rows = (start - 1) as usize..end as usize;
                        Some((
                            self.vocab.order_name(argmax_sum(order, rows.clone())).to_string(),
                            self.vocab.superfamily_name(argmax_sum(superfamily, rows)).to_string(),
                        ))
                    }
                    _ => None,
                };
                let call = GffCall {
                    chrom: chrom.clone(),
                    feature: name.to_string(),
                    start,
                    end,
                    strand,
                    te,
                };
                lines.push(call.to_line(next_id));
                next_id += 1;
            }
            info!("Finished writing {}", chrom);
        }
        debug!("Releasing vote storage {:?}", self.dir.path());
        Ok(lines)
    }

    /// Write the reconstructed annotation and return the number of features
    pub fn write_gff3<W: Write>(
        self,
        writer: &mut W,
        threshold: f64,
        min_size: usize,
        max_fill: usize,
    ) -> Result<usize> {
        let lines = self.gff3_lines(threshold, min_size, max_fill)?;
        for line in &lines {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
        Ok(lines.len() - 1)
    }
}

fn vote_histogram<I>(histogram: &mut Array2<u32>, start: usize, ids: I, overwrite: bool)
where
    I: Iterator<Item = u8>,
{
    let width = histogram.ncols();
    for (i, id) in ids.enumerate() {
        let id = id as usize;
        // Id 0 carries no class evidence
        if id == 0 || id >= width {
            continue;
        }
        let cell = &mut histogram[[start + i, id]];
        if overwrite {
            *cell = 1;
        } else {
            *cell += 1;
        }
    }
}

fn tally_class(counts: &mut Confusion, predicted: u8, truth: u8) {
    let (p, t) = (predicted as usize, truth as usize);
    if p >= counts.true_pos.len() || t >= counts.true_pos.len() {
        return;
    }
    if t == 0 {
        if p != 0 {
            counts.false_pos[p] += 1;
        }
    } else if p == t {
        counts.true_pos[p] += 1;
    } else {
        counts.false_neg[t] += 1;
        if p != 0 {
            counts.false_pos[p] += 1;
        }
    }
}

/// Closed 1-based runs of every feature column
fn call_features(
    arrays: &ChromVotes,
    vocab: &Vocabulary,
    stranded: bool,
    threshold: f64,
    min_size: usize,
    max_fill: usize,
) -> Vec<(u64, u64, usize)> {
    let totals = arrays.totals.column(0);
    let scale = if stranded { threshold / 2.0 } else { threshold };
    (0..vocab.len())
        .into_par_iter()
        .flat_map_iter(|feature| {
            let mask: Vec<bool> = arrays
                .votes
                .column(feature)
                .iter()
                .zip(totals.iter())
                .map(|(&v, &t)| v > 0 && v as f64 >= scale * t as f64)
                .collect();
            let mask = if min_size > 0 || max_fill > 0 {
                bridge_array(&mask, min_size, max_fill)
            } else {
                mask
            };
            region_bounds(&mask, true, true)
                .into_iter()
                .map(move |(s, e)| (s as u64 + 1, e as u64 + 1, feature))
        })
        .collect()
}

/// Column with the largest sum over `rows`, the first one on ties
fn argmax_sum(histogram: &Array2<u32>, rows: Range<usize>) -> usize {
    let sums = histogram.slice(s![rows, ..]).sum_axis(Axis(0));
    let mut best = 0;
    for (i, &v) in sums.iter().enumerate() {
        if v > sums[best] {
            best = i;
        }
    }
    best
}

impl std::fmt::Debug for VoteAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoteAggregator")
            .field("chroms", &self.chroms.len())
            .field("stranded", &self.stranded)
            .field("dir", &self.dir.path())
            .finish()
    }
}
