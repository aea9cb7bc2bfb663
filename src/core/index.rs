//! Feature interval index built from an annotation file
//!
//! Uses rust-lapper for O(log n + k) interval queries. Built indexes are
//! persisted next to the annotation as one bincode file per chromosome
//! plus a JSON manifest. The manifest records the SHA-256 of the
//! annotation, the format version and the vocabulary fingerprint, and a
//! reload only happens when all three still match.

use crate::core::coords::Strand;
use crate::core::error::{AnnotationError, PersistError, Result};
use crate::core::io::{open_text, LineIterator};
use crate::core::vocab::Vocabulary;
use crate::formats::gff::GffRecordView;
use log::{debug, info, warn};
use ndarray::{s, Array2};
use rust_lapper::{Interval, Lapper};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Bumped whenever the on-disk layout changes
pub const INDEX_FORMAT_VERSION: u32 = 2;

/// Value stored in each interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureTag {
    /// Strand-qualified feature id
    pub feature: u16,
    /// TE order id, 0 when absent
    pub order: u8,
    /// TE superfamily id, 0 when absent
    pub superfamily: u8,
    /// Ordinal of the record in the annotation file
    pub rank: u32,
}

/// Type alias for feature intervals
pub type FeatureInterval = Interval<u64, FeatureTag>;

#[derive(Debug, Serialize, Deserialize)]
struct StoredInterval {
    start: u64,
    stop: u64,
    tag: FeatureTag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    source_sha256: String,
    vocabulary: String,
    include_chrom: bool,
    chroms: BTreeMap<String, PathBuf>,
}

/// Build options
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    /// Rebuild even when a matching persisted index exists
    pub force: bool,
    /// Keep chromosome, contig and supercontig records
    pub include_chrom: bool,
}

/// How the index was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    Built,
    Reloaded,
}

/// Interval index organized by chromosome
pub struct FeatureIndex {
    vocab: Arc<Vocabulary>,
    maps: HashMap<String, Lapper<u64, FeatureTag>>,
    origin: IndexOrigin,
}

impl FeatureIndex {
    /// Reload a persisted index for `annotation` or build and persist one
    ///
    /// # Example
    /// ```ignore
    /// let vocab = Arc::new(Vocabulary::full());
    /// let index = FeatureIndex::open("TAIR10_GFF3_genes.gff", vocab, IndexOptions::default())?;
    /// let labels = index.fetch("Chr1", 0, 1000);
    /// ```
    pub fn open<P: AsRef<Path>>(
        annotation: P,
        vocab: Arc<Vocabulary>,
        options: IndexOptions,
    ) -> Result<Self> {
        let annotation = annotation.as_ref();
        let manifest_path = Self::manifest_path(annotation);
        let digest = sha256_file(annotation)?;
        let expected = Manifest {
            format_version: INDEX_FORMAT_VERSION,
            source_sha256: digest,
            vocabulary: vocab.fingerprint(),
            include_chrom: options.include_chrom,
            chroms: BTreeMap::new(),
        };

        if options.force {
            debug!("Rebuild of {:?} forced", annotation);
        } else if manifest_path.exists() {
            match read_manifest(&manifest_path) {
                Ok(manifest) => match stale_reason(&manifest, &expected) {
                    None => {
                        let index = Self::reload(&manifest, vocab.clone())?;
                        info!(
                            "Reloaded interval index for {:?} ({} intervals)",
                            annotation,
                            index.total_intervals()
                        );
                        return Ok(index);
                    }
                    Some(reason) => warn!("Rebuilding index for {:?}: {}", annotation, reason),
                },
                Err(e) => warn!("Rebuilding index for {:?}: unreadable manifest ({})", annotation, e),
            }
        }

        let index = Self::from_reader(open_text(annotation)?, vocab, options.include_chrom)?;
        index.persist(annotation, expected)?;
        info!(
            "Built interval index for {:?} ({} intervals)",
            annotation,
            index.total_intervals()
        );
        Ok(index)
    }

    /// Build an in-memory index from annotation text
    ///
    /// Only transposable-element records carry order and superfamily ids,
    /// and only as a pair: when either attribute is missing or unknown to
    /// the vocabulary both ids are 0.
    pub fn from_reader<R: BufRead>(
        reader: R,
        vocab: Arc<Vocabulary>,
        include_chrom: bool,
    ) -> std::result::Result<Self, AnnotationError> {
        let mut by_chrom: HashMap<String, Vec<FeatureInterval>> = HashMap::new();
        let mut lines = LineIterator::new(reader);
        let mut line_number = 0;
        let mut rank = 0u32;

        while let Some(line) = lines.next_line() {
            let line = line?;
            line_number += 1;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let view = GffRecordView::parse(line.as_bytes()).map_err(|e| {
                AnnotationError::InvalidLine {
                    line: line_number,
                    message: e.to_string(),
                }
            })?;
            rank += 1;

            if !include_chrom && Vocabulary::is_chromosome_level(view.feature) {
                continue;
            }
            let strand = match view.strand {
                Some(strand) => strand,
                None => continue,
            };
            let feature = match vocab.feature_id(strand, view.feature) {
                Some(id) => id as u16,
                None => continue,
            };
            let te_ids = view
                .order()
                .zip(view.superfamily())
                .map(|(o, s)| (vocab.order_id(o), vocab.superfamily_id(s)));
            let (order, superfamily) = match te_ids {
                Some((o, s)) if o > 0 && s > 0 && vocab.is_te_name(view.feature) => (o, s),
                _ => (0, 0),
            };

            by_chrom
                .entry(view.seqname.to_string())
                .or_default()
                .push(Interval {
                    start: view.start0(),
                    stop: view.end,
                    val: FeatureTag {
                        feature,
                        order,
                        superfamily,
                        rank,
                    },
                });
        }

        let maps = by_chrom
            .into_iter()
            .map(|(chrom, intervals)| (chrom, Lapper::new(intervals)))
            .collect();

        Ok(Self {
            vocab,
            maps,
            origin: IndexOrigin::Built,
        })
    }

    /// Path of the manifest persisted for an annotation file
    pub fn manifest_path(annotation: &Path) -> PathBuf {
        suffixed(annotation, ".idx.json")
    }

    fn chrom_path(annotation: &Path, chrom: &str) -> PathBuf {
        let safe: String = chrom
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' { c } else { '_' })
            .collect();
        suffixed(annotation, &format!(".{}.idx", safe))
    }

    fn persist(&self, annotation: &Path, mut manifest: Manifest) -> Result<()> {
        for (chrom, lapper) in &self.maps {
            let path = Self::chrom_path(annotation, chrom);
            let stored: Vec<StoredInterval> = lapper
                .iter()
                .map(|iv| StoredInterval {
                    start: iv.start,
                    stop: iv.stop,
                    tag: iv.val,
                })
                .collect();
            let mut writer = BufWriter::new(File::create(&path)?);
            bincode::serialize_into(&mut writer, &stored).map_err(PersistError::from)?;
            writer.flush()?;
            manifest.chroms.insert(chrom.clone(), path);
        }

        let mut writer = BufWriter::new(File::create(Self::manifest_path(annotation))?);
        serde_json::to_writer_pretty(&mut writer, &manifest).map_err(PersistError::from)?;
        writer.flush()?;
        Ok(())
    }

    fn reload(manifest: &Manifest, vocab: Arc<Vocabulary>) -> Result<Self> {
        let mut maps = HashMap::new();
        for (chrom, path) in &manifest.chroms {
            let reader = BufReader::new(File::open(path)?);
            let stored: Vec<StoredInterval> =
                bincode::deserialize_from(reader).map_err(PersistError::from)?;
            let intervals = stored
                .into_iter()
                .map(|s| Interval {
                    start: s.start,
                    stop: s.stop,
                    val: s.tag,
                })
                .collect();
            maps.insert(chrom.clone(), Lapper::new(intervals));
        }
        Ok(Self {
            vocab,
            maps,
            origin: IndexOrigin::Reloaded,
        })
    }

    /// Dense per-base labels for `[start, end)`
    ///
    /// Returns shape `(end - start, label_width)`. Every overlapping
    /// interval sets its feature column over the overlap. TE intervals
    /// also write their order and superfamily ids; where TE intervals
    /// overlap, the one appearing last in the annotation file wins.
    pub fn fetch(&self, chrom: &str, start: u64, end: u64) -> Array2<u8> {
        let len = end.saturating_sub(start) as usize;
        let mut out = Array2::<u8>::zeros((len, self.vocab.label_width()));
        if len == 0 {
            return out;
        }
        let lapper = match self.maps.get(chrom) {
            Some(l) => l,
            None => return out,
        };

        let mut hits: Vec<&FeatureInterval> = lapper.find(start, end).collect();
        hits.sort_by_key(|iv| iv.val.rank);

        let te_columns = self.vocab.order_column().zip(self.vocab.superfamily_column());
        for iv in hits {
            let s = (iv.start.max(start) - start) as usize;
            let e = (iv.stop.min(end) - start) as usize;
            let feature = iv.val.feature as usize;
            out.slice_mut(s![s..e, feature]).fill(1);
            if let Some((order_col, superfamily_col)) = te_columns {
                if self.vocab.is_te_feature(feature) {
                    out.slice_mut(s![s..e, order_col]).fill(iv.val.order);
                    out.slice_mut(s![s..e, superfamily_col]).fill(iv.val.superfamily);
                }
            }
        }
        out
    }

    /// Intervals overlapping `[start, end)` in start order
    pub fn query(&self, chrom: &str, start: u64, end: u64) -> Vec<&FeatureInterval> {
        match self.maps.get(chrom) {
            Some(l) => l.find(start, end).collect(),
            None => vec![],
        }
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocab
    }

    pub fn origin(&self) -> IndexOrigin {
        self.origin
    }

    /// Indexed chromosome names, sorted
    pub fn chroms(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.maps.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn has_chrom(&self, chrom: &str) -> bool {
        self.maps.contains_key(chrom)
    }

    /// Get the number of intervals for a chromosome
    pub fn interval_count(&self, chrom: &str) -> usize {
        self.maps.get(chrom).map(|l| l.len()).unwrap_or(0)
    }

    /// Get total number of intervals across all chromosomes
    pub fn total_intervals(&self) -> usize {
        self.maps.values().map(|l| l.len()).sum()
    }

    /// Feature strand of an interval tag
    pub fn strand_of(&self, tag: &FeatureTag) -> Option<Strand> {
        self.vocab.feature(tag.feature as usize).map(|(strand, _)| strand)
    }
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path)?;
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn read_manifest(path: &Path) -> std::result::Result<Manifest, PersistError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn stale_reason(found: &Manifest, expected: &Manifest) -> Option<String> {
    if found.format_version != expected.format_version {
        return Some(format!(
            "format version {} != {}",
            found.format_version, expected.format_version
        ));
    }
    if found.source_sha256 != expected.source_sha256 {
        return Some("annotation content changed".to_string());
    }
    if found.vocabulary != expected.vocabulary {
        return Some(format!(
            "vocabulary {} != {}",
            found.vocabulary, expected.vocabulary
        ));
    }
    if found.include_chrom != expected.include_chrom {
        return Some("chromosome-level records setting changed".to_string());
    }
    found
        .chroms
        .values()
        .find(|p| !p.exists())
        .map(|p| format!("missing {:?}", p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vocab::VocabularyKind;
    use tempfile::TempDir;

    const GFF3: &str = "##gff-version 3
Chr1\tTAIR10\tchromosome\t1\t20\t.\t.\t.\tID=Chr1
Chr1\tTAIR10\tgene\t3\t10\t.\t+\t.\tID=g1
Chr1\tTAIR10\tCDS\t3\t10\t.\t+\t.\tParent=g1
Chr1\tTAIR10\texon\t4\t7\t.\t+\t.\tParent=g1
Chr1\tTAIR10\ttransposable_element\t10\t15\t.\t-\t.\tID=te1;Order=LTR;Superfamily=Gypsy
Chr2\tTAIR10\tgene\t2\t15\t.\t-\t.\tID=g2
Chr2\tTAIR10\tenhancer\t2\t15\t.\t-\t.\tID=x
";

    fn vocab() -> Arc<Vocabulary> {
        Arc::new(Vocabulary::full())
    }

    fn index() -> FeatureIndex {
        FeatureIndex::from_reader(GFF3.as_bytes(), vocab(), false).unwrap()
    }

    #[test]
    fn test_index_creation() {
        let index = index();
        assert_eq!(index.chroms(), vec!["Chr1", "Chr2"]);
        assert_eq!(index.interval_count("Chr1"), 4);
        assert_eq!(index.interval_count("Chr2"), 1);
        assert_eq!(index.origin(), IndexOrigin::Built);
    }

    #[test]
    fn test_include_chrom() {
        let index = FeatureIndex::from_reader(GFF3.as_bytes(), vocab(), true).unwrap();
        assert_eq!(index.interval_count("Chr1"), 4);
        let index = FeatureIndex::from_reader(
            "Chr1\t.\tchromosome\t1\t20\t.\t+\t.\t.\n".as_bytes(),
            vocab(),
            true,
        )
        .unwrap();
        assert_eq!(index.interval_count("Chr1"), 1);
    }

    #[test]
    fn test_fetch_stamps_features() {
        let index = index();
        let v = index.vocabulary().clone();
        let labels = index.fetch("Chr1", 0, 20);
        assert_eq!(labels.dim(), (20, v.label_width()));

        let gene = v.feature_id(Strand::Plus, "gene").unwrap();
        let exon = v.feature_id(Strand::Plus, "exon").unwrap();
        let te = v.feature_id(Strand::Minus, "transposable_element").unwrap();
        let order = v.order_column().unwrap();
        let superfamily = v.superfamily_column().unwrap();

        assert_eq!(labels.column(gene).iter().filter(|&&x| x == 1).count(), 8);
        assert_eq!(labels[[1, gene]], 0);
        assert_eq!(labels[[2, gene]], 1);
        assert_eq!(labels[[9, gene]], 1);
        assert_eq!(labels[[3, exon]], 1);
        assert_eq!(labels[[7, exon]], 0);
        assert_eq!(labels[[9, te]], 1);
        assert_eq!(labels[[14, te]], 1);
        assert_eq!(labels[[15, te]], 0);
        assert_eq!(labels[[9, order]], 3);
        assert_eq!(labels[[9, superfamily]], 7);
        assert_eq!(labels[[8, order]], 0);
    }

    #[test]
    fn test_fetch_partial_range() {
        let index = index();
        let v = index.vocabulary().clone();
        let gene = v.feature_id(Strand::Plus, "gene").unwrap();
        let labels = index.fetch("Chr1", 8, 12);
        assert_eq!(labels.nrows(), 4);
        assert_eq!(labels.column(gene).to_vec(), vec![1, 1, 0, 0]);
        assert_eq!(index.fetch("Chr9", 0, 5).sum(), 0);
    }

    #[test]
    fn test_last_te_in_file_wins() {
        let gff = "Chr1\t.\ttransposable_element\t1\t10\t.\t+\t.\tOrder=LTR;Superfamily=Copia
Chr1\t.\ttransposable_element\t5\t8\t.\t+\t.\tOrder=DNA;Superfamily=hAT
Chr1\t.\tgene\t1\t10\t.\t+\t.\tID=g
";
        let index = FeatureIndex::from_reader(gff.as_bytes(), vocab(), false).unwrap();
        let v = index.vocabulary().clone();
        let labels = index.fetch("Chr1", 0, 10);
        let order = v.order_column().unwrap();
        assert_eq!(
            labels.column(order).to_vec(),
            vec![3, 3, 3, 3, 1, 1, 1, 1, 3, 3]
        );
    }

    #[test]
    fn test_te_ids_kept_only_as_pair() {
        let gff = "Chr1\t.\ttransposable_element\t1\t3\t.\t+\t.\tOrder=LTR;Superfamily=Gypsy
Chr1\t.\ttransposable_element\t4\t6\t.\t+\t.\tOrder=LTR
Chr1\t.\ttransposable_element\t7\t9\t.\t+\t.\tOrder=LTR;Superfamily=Nonesuch
Chr1\t.\ttransposable_element\t10\t12\t.\t+\t.\tSuperfamily=Gypsy
";
        let index = FeatureIndex::from_reader(gff.as_bytes(), vocab(), false).unwrap();
        let v = index.vocabulary().clone();
        let labels = index.fetch("Chr1", 0, 12);
        let order = v.order_column().unwrap();
        let superfamily = v.superfamily_column().unwrap();
        assert_eq!(
            labels.column(order).to_vec(),
            vec![3, 3, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            labels.column(superfamily).to_vec(),
            vec![7, 7, 7, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_fetch_without_te_metadata() {
        let vocab = Arc::new(Vocabulary::new(VocabularyKind::Full, false));
        let index = FeatureIndex::from_reader(GFF3.as_bytes(), vocab.clone(), false).unwrap();
        assert_eq!(index.fetch("Chr1", 0, 20).ncols(), vocab.len());
    }

    #[test]
    fn test_invalid_line_reports_number() {
        let gff = "##gff-version 3\nChr1\t.\tgene\tx\t10\t.\t+\t.\t.\n";
        let err = FeatureIndex::from_reader(gff.as_bytes(), vocab(), false);
        assert!(matches!(err, Err(AnnotationError::InvalidLine { line: 2, .. })));
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("genes.gff3");
        std::fs::write(&path, GFF3).unwrap();

        let built = FeatureIndex::open(&path, vocab(), IndexOptions::default()).unwrap();
        assert_eq!(built.origin(), IndexOrigin::Built);
        assert!(FeatureIndex::manifest_path(&path).exists());

        let reloaded = FeatureIndex::open(&path, vocab(), IndexOptions::default()).unwrap();
        assert_eq!(reloaded.origin(), IndexOrigin::Reloaded);
        assert_eq!(reloaded.fetch("Chr1", 0, 20), built.fetch("Chr1", 0, 20));

        let forced = FeatureIndex::open(
            &path,
            vocab(),
            IndexOptions {
                force: true,
                include_chrom: false,
            },
        )
        .unwrap();
        assert_eq!(forced.origin(), IndexOrigin::Built);
    }

    #[test]
    fn test_changed_annotation_rebuilds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("genes.gff3");
        std::fs::write(&path, GFF3).unwrap();
        FeatureIndex::open(&path, vocab(), IndexOptions::default()).unwrap();

        std::fs::write(&path, format!("{}Chr3\t.\tgene\t1\t5\t.\t+\t.\t.\n", GFF3)).unwrap();
        let index = FeatureIndex::open(&path, vocab(), IndexOptions::default()).unwrap();
        assert_eq!(index.origin(), IndexOrigin::Built);
        assert!(index.has_chrom("Chr3"));

        let other = Arc::new(Vocabulary::reduced());
        let index = FeatureIndex::open(&path, other, IndexOptions::default()).unwrap();
        assert_eq!(index.origin(), IndexOrigin::Built);
    }
}
